//! 单个部署请求的执行流程
//!
//! pull → head → 路径解析 → 读取 → 修改 tag → 写回 → add → commit → push。
//! 从读取开始的任何失败都会硬重置到开始时的 HEAD。

use tracing::{error, info, warn};

use crate::domain::{DeployIntent, DeployStage, Response, StageStatus};
use crate::error::DeployError;
use crate::infra::store::{CommitHash, ConfigStore, PullOutcome};

use super::kustomize;

const FAILED_PREFIX: &str = "this operation failed";

const STAGE_NAMES: [&str; 9] = [
    "git_pull",
    "head_hash",
    "resolve_path",
    "read_manifest",
    "set_image_tag",
    "write_manifest",
    "git_add",
    "git_commit",
    "git_push",
];

/// 执行完整流程并返回唯一的回复
pub(crate) async fn run(store: &dyn ConfigStore, intent: &DeployIntent) -> Response {
    let mut pipeline = Pipeline {
        store,
        intent,
        stages: STAGE_NAMES.into_iter().map(DeployStage::new).collect(),
    };
    let response = pipeline.execute().await;
    pipeline.log_summary(response.is_success());
    response
}

struct Pipeline<'a> {
    store: &'a dyn ConfigStore,
    intent: &'a DeployIntent,
    stages: Vec<DeployStage>,
}

impl Pipeline<'_> {
    async fn execute(&mut self) -> Response {
        let target = self.intent.target();

        // Stage 0: 确保基于远端最新提交
        self.stages[0].start();
        match self.store.pull().await {
            Ok(PullOutcome::AlreadyUpToDate) => self.stages[0].finish(true, None),
            Ok(PullOutcome::Updated { from, to }) => self.stages[0].finish(
                true,
                Some(format!("{} -> {}", from.short(), to.short())),
            ),
            Err(e) => {
                self.fail(0, &e);
                return Response::failure(DeployError::repository(
                    format!("pulling kubernetes-configs before deploying {}", target),
                    e,
                ));
            }
        }

        // Stage 1: 回滚锚点
        self.stages[1].start();
        let anchor = match self.store.head_hash().await {
            Ok(hash) => {
                self.stages[1].finish(true, Some(hash.short().to_string()));
                hash
            }
            Err(e) => {
                self.fail(1, &e);
                return Response::failure(DeployError::repository(
                    "getting head hash of repo(kubernetes-configs)",
                    e,
                ));
            }
        };

        // Stage 2: 路径解析
        self.stages[2].start();
        let resolved = self
            .intent
            .codebase
            .image_kustomization_path(&self.intent.stage, self.intent.project.as_deref());
        if let Some(violation) = resolved.violation {
            warn!(path = %resolved.path, error = %violation, "Resolved path is not deployable");
            self.fail(2, &violation);
            return Response::failure(violation);
        }
        let path = resolved.path;
        self.stages[2].finish(true, Some(path.clone()));

        match self.mutate(&path).await {
            Ok(lines) => {
                info!(path = %path, image_tag = %self.intent.image_tag, "Deployed");
                Response::success(lines)
            }
            Err(response) => {
                self.rollback(&anchor).await;
                response
            }
        }
    }

    /// Stage 3..=8，失败时由调用方回滚
    async fn mutate(&mut self, path: &str) -> Result<Vec<String>, Response> {
        self.stages[3].start();
        let raw = match self.store.read_file(path).await {
            Ok(raw) => raw,
            Err(e) => {
                self.fail(3, &e);
                return Err(Response::failure(DeployError::repository(
                    format!("cannot get file({})", path),
                    e,
                )));
            }
        };
        if let Ok(Some(previous)) = kustomize::image_tag(&raw) {
            info!(path, previous_tag = %previous, "Current image tag");
        }
        self.stages[3].finish(true, None);

        self.stages[4].start();
        let updated = match kustomize::set_image_tag(&raw, &self.intent.image_tag) {
            Ok(updated) => updated,
            Err(e) => {
                self.fail(4, &e);
                return Err(Response::failure(DeployError::Manifest {
                    context: format!("fail to set newTag in {}", path),
                    source: e,
                }));
            }
        };
        self.stages[4].finish(true, None);

        let lines = self.intent.commit_message_lines();
        let failed = |error: DeployError, lines: &[String]| {
            let mut messages = Vec::with_capacity(lines.len() + 1);
            messages.push(FAILED_PREFIX.to_string());
            messages.extend(lines.iter().cloned());
            Response::failure_with(error, messages)
        };

        self.stages[5].start();
        if let Err(e) = self.store.write_file(path, &updated).await {
            self.fail(5, &e);
            return Err(failed(
                DeployError::repository(format!("writing to {} has error", path), e),
                &lines,
            ));
        }
        self.stages[5].finish(true, None);

        self.stages[6].start();
        if let Err(e) = self.store.stage(path).await {
            self.fail(6, &e);
            return Err(failed(
                DeployError::repository(
                    format!("adding {} to staging area has error", path),
                    e,
                ),
                &lines,
            ));
        }
        self.stages[6].finish(true, None);

        self.stages[7].start();
        let hash = match self
            .store
            .commit(path, &self.intent.caller, &lines.join("\n"))
            .await
        {
            Ok(hash) => hash,
            Err(e) => {
                self.fail(7, &e);
                return Err(failed(
                    DeployError::repository(
                        format!("commits for {} has error", self.intent.target()),
                        e,
                    ),
                    &lines,
                ));
            }
        };
        self.stages[7].finish(true, Some(hash.short().to_string()));

        self.stages[8].start();
        if let Err(e) = self.store.push().await {
            self.fail(8, &e);
            return Err(failed(
                DeployError::repository(
                    format!("push commits for {} has error", self.intent.target()),
                    e,
                ),
                &lines,
            ));
        }
        self.stages[8].finish(true, None);

        Ok(lines)
    }

    /// 尽力回滚，失败只记录日志
    async fn rollback(&self, anchor: &CommitHash) {
        match self.store.hard_reset(anchor).await {
            Ok(()) => warn!(hash = %anchor.short(), "Rolled back to the head before this operation"),
            Err(e) => error!(hash = %anchor.short(), error = %e, "Rolling back failed"),
        }
    }

    /// 标记失败并跳过后续阶段
    fn fail(&mut self, index: usize, error: &dyn std::fmt::Display) {
        self.stages[index].finish(false, Some(error.to_string()));
        for stage in self.stages.iter_mut().skip(index + 1) {
            stage.skip(None);
        }
    }

    fn log_summary(&self, success: bool) {
        let summary: Vec<String> = self
            .stages
            .iter()
            .filter(|s| s.status != StageStatus::Pending)
            .map(|s| match s.duration_ms {
                Some(ms) => format!("{} {} ({}ms)", s.status_icon(), s.name, ms),
                None => format!("{} {}", s.status_icon(), s.name),
            })
            .collect();

        if success {
            info!(target_path = %self.intent.target(), stages = %summary.join(", "), "Deploy pipeline finished");
        } else {
            warn!(target_path = %self.intent.target(), stages = %summary.join(", "), "Deploy pipeline failed");
        }
    }

    #[cfg(test)]
    fn stage(&self, name: &str) -> Option<&DeployStage> {
        self.stages.iter().find(|s| s.name == name)
    }
}
