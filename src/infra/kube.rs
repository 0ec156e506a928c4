//! 集群只读查询
//!
//! 通过 helm / kubectl CLI 查询 release 与 deployment 状态，不做任何修改

use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::env::constants::KUBE_QUERY_TIMEOUT_SECS;
use crate::domain::{DeploymentInfo, ReleaseInfo};
use crate::infra::command::{failure_output, CommandError, CommandRunner};

/// 查询使用的命名空间
const NAMESPACE: &str = "default";

/// 集群查询错误
#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("{program} failed: {stderr}")]
    Failed { program: &'static str, stderr: String },

    #[error("unexpected output: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("deployment {0} has no containers")]
    NoContainer(String),
}

/// 只读集群查询接口
#[async_trait]
pub trait ClusterQuery: Send + Sync {
    /// 列出 release，按名称排序
    async fn list_releases(&self, kube_config: &Path) -> Result<Vec<ReleaseInfo>, QueryError>;

    /// 获取 deployment 的镜像 tag 和副本数
    async fn get_deployment_info(
        &self,
        kube_config: &Path,
        name: &str,
    ) -> Result<DeploymentInfo, QueryError>;
}

/// 基于 helm / kubectl CLI 的实现
pub struct KubectlClusterQuery {
    timeout: Duration,
}

impl Default for KubectlClusterQuery {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(KUBE_QUERY_TIMEOUT_SECS),
        }
    }
}

impl KubectlClusterQuery {
    pub fn new() -> Self {
        Self::default()
    }

    async fn run(&self, program: &'static str, args: &[&str]) -> Result<Vec<u8>, QueryError> {
        debug!(program, ?args, "Querying cluster");
        let output =
            CommandRunner::run_simple(program, args, &std::env::temp_dir(), self.timeout).await?;
        if !output.status.success() {
            return Err(QueryError::Failed {
                program,
                stderr: failure_output(&output),
            });
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl ClusterQuery for KubectlClusterQuery {
    async fn list_releases(&self, kube_config: &Path) -> Result<Vec<ReleaseInfo>, QueryError> {
        let kube_config = kube_config.to_string_lossy();
        let stdout = self
            .run(
                "helm",
                &["list", "--kubeconfig", &kube_config, "-n", NAMESPACE, "-o", "json"],
            )
            .await?;
        parse_releases(&stdout)
    }

    async fn get_deployment_info(
        &self,
        kube_config: &Path,
        name: &str,
    ) -> Result<DeploymentInfo, QueryError> {
        let kube_config = kube_config.to_string_lossy();
        let stdout = self
            .run(
                "kubectl",
                &[
                    "--kubeconfig",
                    &kube_config,
                    "-n",
                    NAMESPACE,
                    "get",
                    "deployment",
                    name,
                    "-o",
                    "json",
                ],
            )
            .await?;
        parse_deployment(name, &stdout)
    }
}

#[derive(Deserialize)]
struct HelmRelease {
    name: String,
    #[serde(default)]
    namespace: String,
    #[serde(default)]
    status: String,
}

/// 解析 `helm list -o json`
fn parse_releases(raw: &[u8]) -> Result<Vec<ReleaseInfo>, QueryError> {
    let mut releases: Vec<ReleaseInfo> = serde_json::from_slice::<Vec<HelmRelease>>(raw)?
        .into_iter()
        .map(|r| ReleaseInfo {
            name: r.name,
            namespace: r.namespace,
            status: r.status,
        })
        .collect();
    releases.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(releases)
}

#[derive(Deserialize)]
struct Deployment {
    spec: DeploymentSpec,
    #[serde(default)]
    status: DeploymentStatus,
}

#[derive(Deserialize)]
struct DeploymentSpec {
    template: PodTemplate,
}

#[derive(Deserialize)]
struct PodTemplate {
    spec: PodSpec,
}

#[derive(Deserialize)]
struct PodSpec {
    #[serde(default)]
    containers: Vec<Container>,
}

#[derive(Deserialize)]
struct Container {
    image: String,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeploymentStatus {
    #[serde(default)]
    available_replicas: i32,
    #[serde(default)]
    ready_replicas: i32,
    #[serde(default)]
    updated_replicas: i32,
}

/// 解析 `kubectl get deployment -o json`
fn parse_deployment(name: &str, raw: &[u8]) -> Result<DeploymentInfo, QueryError> {
    let deployment: Deployment = serde_json::from_slice(raw)?;
    let image = deployment
        .spec
        .template
        .spec
        .containers
        .first()
        .map(|c| c.image.as_str())
        .ok_or_else(|| QueryError::NoContainer(name.to_string()))?;

    Ok(DeploymentInfo {
        image_tag: image_tag(image).to_string(),
        available_replicas: deployment.status.available_replicas,
        ready_replicas: deployment.status.ready_replicas,
        updated_replicas: deployment.status.updated_replicas,
    })
}

/// 镜像引用最后一个 `:` 之后的部分；带 `/` 的是 registry 端口，视为未打 tag
fn image_tag(image: &str) -> &str {
    match image.rsplit_once(':') {
        Some((_, tag)) if !tag.contains('/') => tag,
        _ => "latest",
    }
}
