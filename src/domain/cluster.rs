//! 集群查询结果（只读）

use serde::Serialize;

/// Helm release 摘要
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReleaseInfo {
    pub name: String,
    pub namespace: String,
    pub status: String,
}

/// Deployment 状态
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DeploymentInfo {
    pub image_tag: String,
    pub available_replicas: i32,
    pub ready_replicas: i32,
    pub updated_replicas: i32,
}

impl DeploymentInfo {
    /// 聊天回复格式
    pub fn describe(&self, name: &str) -> String {
        format!(
            "{}\n\tImageTag: {}\n\tAvailable pods: {}\n\tReady pods: {}\n\tUpdated pods: {}",
            name, self.image_tag, self.available_replicas, self.ready_replicas, self.updated_replicas
        )
    }
}
