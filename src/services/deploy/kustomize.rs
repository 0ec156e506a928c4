//! kustomization.yaml 编辑
//!
//! 只修改 `images` 的第一项，其余内容按解析结果原样写回。

use serde_yaml::{Mapping, Value};
use thiserror::Error;

/// manifest 错误
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("invalid YAML: {0}")]
    InvalidYaml(#[from] serde_yaml::Error),

    #[error("images.0 is not a mapping")]
    MissingImage,
}

/// 设置 `images[0].newTag` 并返回重新序列化后的 manifest
pub fn set_image_tag(raw: &[u8], image_tag: &str) -> Result<Vec<u8>, ManifestError> {
    let mut manifest: Value = serde_yaml::from_slice(raw)?;

    let image: &mut Mapping = manifest
        .get_mut("images")
        .and_then(|images| images.get_mut(0))
        .and_then(Value::as_mapping_mut)
        .ok_or(ManifestError::MissingImage)?;
    image.insert(
        Value::String("newTag".to_string()),
        Value::String(image_tag.to_string()),
    );

    Ok(serde_yaml::to_string(&manifest)?.into_bytes())
}

/// 读取 `images[0].newTag`（可能不存在）
pub fn image_tag(raw: &[u8]) -> Result<Option<String>, ManifestError> {
    let manifest: Value = serde_yaml::from_slice(raw)?;
    Ok(manifest
        .get("images")
        .and_then(|images| images.get(0))
        .and_then(|image| image.get("newTag"))
        .and_then(|tag| match tag {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }))
}
