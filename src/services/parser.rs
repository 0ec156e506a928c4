//! 命令参数解析
//!
//! 把 `<repo> key=value ...` 形式的 token 列表解析为 `DeployIntent`。
//! 纯函数，不触碰仓库。

use crate::config::codebase::PROD_STAGE;
use crate::config::BotConfig;
use crate::domain::{DeployIntent, OperationKind};
use crate::error::ValidationError;

pub const ENV_KEY: &str = "env";
pub const PROJECT_KEY: &str = "project";
pub const IMAGE_TAG_KEY: &str = "image-tag";

/// 解析 `deploy <repo> env=<stage> image-tag=<tag>`
pub fn parse_deploy(
    config: &BotConfig,
    tokens: &[&str],
    caller: &str,
) -> Result<DeployIntent, ValidationError> {
    let (repo, mut rest) = split_repo(tokens)?;
    let codebase = config
        .find_codebase(repo)
        .ok_or_else(|| ValidationError::UnknownRepository(repo.to_string()))?;

    let stage = take_value(&mut rest, ENV_KEY)?;
    if stage == PROD_STAGE {
        return Err(ValidationError::ProdNotAllowedViaDeploy);
    }
    let image_tag = take_value(&mut rest, IMAGE_TAG_KEY)?;
    ensure_consumed(rest)?;

    Ok(DeployIntent {
        codebase: codebase.clone(),
        stage,
        project: None,
        image_tag,
        caller: caller.to_string(),
        kind: OperationKind::Deploy,
        command_text: None,
    })
}

/// 解析 `release <repo> project=<project> image-tag=<tag>`，stage 固定为 prod
pub fn parse_release(
    config: &BotConfig,
    tokens: &[&str],
    caller: &str,
    command_text: Option<&str>,
) -> Result<DeployIntent, ValidationError> {
    let (repo, mut rest) = split_repo(tokens)?;
    let codebase = config
        .find_codebase(repo)
        .ok_or_else(|| ValidationError::UnknownRepository(repo.to_string()))?;

    let project = take_value(&mut rest, PROJECT_KEY)?;
    let image_tag = take_value(&mut rest, IMAGE_TAG_KEY)?;
    ensure_consumed(rest)?;

    Ok(DeployIntent {
        codebase: codebase.clone(),
        stage: PROD_STAGE.to_string(),
        project: Some(project),
        image_tag,
        caller: caller.to_string(),
        kind: OperationKind::Release,
        command_text: command_text.map(str::to_string),
    })
}

fn split_repo<'a>(tokens: &[&'a str]) -> Result<(&'a str, Vec<&'a str>), ValidationError> {
    match tokens.split_first() {
        Some((repo, rest)) => Ok((repo, rest.to_vec())),
        None => Err(ValidationError::EmptyCommand),
    }
}

/// 取出第一个 `key=value` 并从列表中移除；空值视为缺失
fn take_value(tokens: &mut Vec<&str>, key: &str) -> Result<String, ValidationError> {
    let position = tokens
        .iter()
        .position(|token| matches!(token.split_once('='), Some((k, _)) if k == key));

    let value = position
        .map(|i| tokens.remove(i))
        .and_then(|token| token.split_once('=').map(|(_, v)| v))
        .filter(|v| !v.is_empty());

    value
        .map(str::to_string)
        .ok_or_else(|| ValidationError::MissingArgument(key.to_string()))
}

fn ensure_consumed(rest: Vec<&str>) -> Result<(), ValidationError> {
    if rest.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::UnsupportedArguments(
            rest.into_iter().map(str::to_string).collect(),
        ))
    }
}
