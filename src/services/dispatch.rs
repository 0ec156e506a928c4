//! 聊天命令分发
//!
//! `submit(text, caller)` 是聊天传输层唯一的入口：按第一个词路由到
//! deploy / release worker、配置列表或只读的集群查询。

use std::sync::Arc;
use tracing::info;

use crate::config::BotConfig;
use crate::domain::Response;
use crate::error::{DeployError, ValidationError};
use crate::infra::kube::ClusterQuery;
use crate::services::deploy::DeployWorker;

const HELP: [&str; 9] = [
    "deploy <repo> env=<stage> image-tag=<tag>",
    "release <repo> project=<project> image-tag=<tag>",
    "list",
    "list <repo>",
    "clusters",
    "clusters <project>",
    "releases <project> <stage>",
    "info <project> <stage> <deployment>",
    "help",
];

/// 命令分发器
pub struct CommandDispatcher {
    config: Arc<BotConfig>,
    worker: Arc<DeployWorker>,
    cluster: Arc<dyn ClusterQuery>,
}

impl CommandDispatcher {
    pub fn new(
        config: Arc<BotConfig>,
        worker: Arc<DeployWorker>,
        cluster: Arc<dyn ClusterQuery>,
    ) -> Self {
        Self {
            config,
            worker,
            cluster,
        }
    }

    /// 执行一条命令，回复至少包含一行
    pub async fn submit(&self, text: &str, caller: &str) -> Response {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        let Some((command, args)) = tokens.split_first() else {
            return Response::failure(ValidationError::EmptyCommand);
        };

        info!(command = %command, caller = %caller, "Received command");

        match *command {
            "deploy" => self.worker.deploy(&self.config, args, caller).await,
            "release" => {
                self.worker
                    .release(&self.config, args, caller, Some(text.trim()))
                    .await
            }
            "list" => self.list(args),
            "clusters" => self.clusters(args),
            "releases" => self.releases(args).await,
            "info" => self.info(args).await,
            "help" => Response::success(HELP.iter().map(|l| l.to_string()).collect()),
            other => Response::failure(ValidationError::UnknownCommand(other.to_string())),
        }
    }

    fn list(&self, args: &[&str]) -> Response {
        match args {
            [] => {
                let mut names = self.config.codebase_names();
                names.sort_unstable();
                Response::success(vec![format!(
                    "The following codebases are available: {}",
                    names.join(", ")
                )])
            }
            [repo] => {
                let Some(codebase) = self.config.find_codebase(repo) else {
                    return Response::failure(ValidationError::UnknownRepository(
                        repo.to_string(),
                    ));
                };
                let services: Vec<String> =
                    codebase.services().into_iter().map(|s| s.name).collect();
                Response::success(vec![
                    format!(
                        "The following stages are available for {}: {}",
                        codebase.repo,
                        codebase.stages.join(", ")
                    ),
                    format!(
                        "The following services are available for {}: {}",
                        codebase.repo,
                        services.join(", ")
                    ),
                ])
            }
            _ => Response::failure(ValidationError::Usage("list [<repo>]")),
        }
    }

    /// `releases` 与 `info` 可用的 project/stage
    fn clusters(&self, args: &[&str]) -> Response {
        let clusters = &self.config.clusters;
        match args {
            [] => Response::success(vec![format!(
                "The following projects are available: {}",
                clusters.projects().join(", ")
            )]),
            [project] => match clusters.stages(project) {
                Some(stages) => Response::success(vec![format!(
                    "The following stages are available for {}: {}",
                    project,
                    stages.join(", ")
                )]),
                None => Response::failure(ValidationError::UnknownCluster {
                    project: project.to_string(),
                    stage: "*".to_string(),
                }),
            },
            _ => Response::failure(ValidationError::Usage("clusters [<project>]")),
        }
    }

    async fn releases(&self, args: &[&str]) -> Response {
        let [project, stage] = args else {
            return Response::failure(ValidationError::Usage("releases <project> <stage>"));
        };
        let kube_config = match self.config.clusters.kube_config(project, stage) {
            Ok(path) => path,
            Err(e) => return Response::failure(e),
        };

        match self.cluster.list_releases(kube_config).await {
            Ok(releases) if releases.is_empty() => Response::success(vec![format!(
                "no release is found in {}/{}",
                project, stage
            )]),
            Ok(releases) => Response::success(
                releases
                    .iter()
                    .map(|r| format!("{}: {}", r.name, r.status))
                    .collect(),
            ),
            Err(e) => Response::failure(DeployError::Query(e)),
        }
    }

    async fn info(&self, args: &[&str]) -> Response {
        let [project, stage, name] = args else {
            return Response::failure(ValidationError::Usage(
                "info <project> <stage> <deployment>",
            ));
        };
        let kube_config = match self.config.clusters.kube_config(project, stage) {
            Ok(path) => path,
            Err(e) => return Response::failure(e),
        };

        match self.cluster.get_deployment_info(kube_config, name).await {
            Ok(info) => Response::success(info.describe(name).lines().map(str::to_string).collect()),
            Err(e) => Response::failure(DeployError::Query(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DeploymentInfo, ReleaseInfo};
    use crate::infra::kube::QueryError;
    use crate::test_support::{fixture_config, MemoryStore};
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    /// 记录 kubeconfig 路径的假集群
    #[derive(Default)]
    struct FakeCluster {
        seen: Mutex<Vec<PathBuf>>,
        releases: Vec<ReleaseInfo>,
    }

    #[async_trait]
    impl ClusterQuery for FakeCluster {
        async fn list_releases(&self, kube_config: &Path) -> Result<Vec<ReleaseInfo>, QueryError> {
            self.seen.lock().unwrap().push(kube_config.to_path_buf());
            Ok(self.releases.clone())
        }

        async fn get_deployment_info(
            &self,
            kube_config: &Path,
            name: &str,
        ) -> Result<DeploymentInfo, QueryError> {
            self.seen.lock().unwrap().push(kube_config.to_path_buf());
            if name == "missing" {
                return Err(QueryError::Failed {
                    program: "kubectl",
                    stderr: "deployments.apps \"missing\" not found".to_string(),
                });
            }
            Ok(DeploymentInfo {
                image_tag: "abc123".to_string(),
                available_replicas: 2,
                ready_replicas: 2,
                updated_replicas: 2,
            })
        }
    }

    fn dispatcher_with(cluster: Arc<FakeCluster>) -> (CommandDispatcher, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let worker = Arc::new(DeployWorker::default());
        worker.start(store.clone());
        let dispatcher = CommandDispatcher::new(Arc::new(fixture_config()), worker, cluster);
        (dispatcher, store)
    }

    fn dispatcher() -> (CommandDispatcher, Arc<MemoryStore>) {
        dispatcher_with(Arc::new(FakeCluster::default()))
    }

    #[tokio::test]
    async fn test_empty_and_unknown_commands() {
        let (dispatcher, store) = dispatcher();

        let response = dispatcher.submit("   ", "@tester").await;
        assert!(matches!(
            response.error,
            Some(DeployError::Validation(ValidationError::EmptyCommand))
        ));
        assert_eq!(response.render_lines().len(), 1);

        let response = dispatcher.submit("rollback openwarehouse", "@tester").await;
        assert!(matches!(
            response.error,
            Some(DeployError::Validation(ValidationError::UnknownCommand(ref c))) if c == "rollback"
        ));
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn test_deploy_is_routed_to_worker() {
        let (dispatcher, store) = dispatcher();

        let response = dispatcher
            .submit("deploy  openwarehouse env=dev   image-tag=abc123", "@tester")
            .await;

        assert!(response.is_success(), "{:?}", response.error);
        assert_eq!(response.messages[0], "deploy(openwarehouse/dev): deployed by @tester");
        assert_eq!(store.pushed_index(), 1);
    }

    #[tokio::test]
    async fn test_release_quotes_full_command() {
        let (dispatcher, store) = dispatcher();

        let response = dispatcher
            .submit("release openwarehouse project=tv image-tag=abc123", "@tester")
            .await;

        assert!(response.is_success(), "{:?}", response.error);
        assert_eq!(
            response.messages.last().unwrap(),
            "by \"release openwarehouse project=tv image-tag=abc123\""
        );
        assert!(store.head_commit().message.ends_with("image-tag=abc123\""));
    }

    #[tokio::test]
    async fn test_list() {
        let (dispatcher, _) = dispatcher();

        let response = dispatcher.submit("list", "@tester").await;
        assert_eq!(
            response.messages,
            vec!["The following codebases are available: mirror-tv-nuxt, openwarehouse"]
        );

        let response = dispatcher.submit("list openwarehouse", "@tester").await;
        assert_eq!(
            response.messages[0],
            "The following stages are available for openwarehouse: dev, staging, prod"
        );
        assert!(response.messages[1].contains("openwarehouse-tv-cms"));

        let response = dispatcher.submit("list unknown", "@tester").await;
        assert!(matches!(
            response.error,
            Some(DeployError::Validation(ValidationError::UnknownRepository(_)))
        ));

        let response = dispatcher.submit("list a b", "@tester").await;
        assert!(matches!(
            response.error,
            Some(DeployError::Validation(ValidationError::Usage(_)))
        ));
    }

    #[tokio::test]
    async fn test_clusters() {
        let (dispatcher, store) = dispatcher();

        let response = dispatcher.submit("clusters", "@tester").await;
        assert_eq!(
            response.messages,
            vec!["The following projects are available: tv"]
        );

        let response = dispatcher.submit("clusters tv", "@tester").await;
        assert_eq!(
            response.messages,
            vec!["The following stages are available for tv: dev, prod"]
        );

        let response = dispatcher.submit("clusters news", "@tester").await;
        assert!(matches!(
            response.error,
            Some(DeployError::Validation(ValidationError::UnknownCluster { ref project, .. })) if project == "news"
        ));

        let response = dispatcher.submit("clusters tv dev", "@tester").await;
        assert!(matches!(
            response.error,
            Some(DeployError::Validation(ValidationError::Usage(_)))
        ));
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn test_releases_uses_configured_kubeconfig() {
        let cluster = Arc::new(FakeCluster {
            releases: vec![ReleaseInfo {
                name: "openwarehouse-tv-cms".to_string(),
                namespace: "default".to_string(),
                status: "deployed".to_string(),
            }],
            ..Default::default()
        });
        let (dispatcher, _) = dispatcher_with(cluster.clone());

        let response = dispatcher.submit("releases tv prod", "@tester").await;

        assert_eq!(response.messages, vec!["openwarehouse-tv-cms: deployed"]);
        assert_eq!(
            cluster.seen.lock().unwrap().as_slice(),
            &[PathBuf::from("/etc/kube/tv-prod.yaml")]
        );
    }

    #[tokio::test]
    async fn test_releases_empty_and_unknown_cluster() {
        let (dispatcher, _) = dispatcher();

        let response = dispatcher.submit("releases tv dev", "@tester").await;
        assert_eq!(response.messages, vec!["no release is found in tv/dev"]);

        let response = dispatcher.submit("releases tv staging", "@tester").await;
        assert!(matches!(
            response.error,
            Some(DeployError::Validation(ValidationError::UnknownCluster { .. }))
        ));
    }

    #[tokio::test]
    async fn test_info() {
        let (dispatcher, _) = dispatcher();

        let response = dispatcher
            .submit("info tv prod openwarehouse-tv-cms", "@tester")
            .await;
        assert_eq!(
            response.messages,
            vec![
                "openwarehouse-tv-cms",
                "\tImageTag: abc123",
                "\tAvailable pods: 2",
                "\tReady pods: 2",
                "\tUpdated pods: 2",
            ]
        );

        let response = dispatcher.submit("info tv prod missing", "@tester").await;
        assert!(matches!(response.error, Some(DeployError::Query(_))));

        let response = dispatcher.submit("info tv prod", "@tester").await;
        assert!(matches!(
            response.error,
            Some(DeployError::Validation(ValidationError::Usage(_)))
        ));
    }

    #[tokio::test]
    async fn test_help() {
        let (dispatcher, _) = dispatcher();
        let response = dispatcher.submit("help", "@tester").await;
        assert_eq!(response.messages.len(), HELP.len());
    }
}
