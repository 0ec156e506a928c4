//! 部署服务模块
//!
//! 所有修改仓库的操作都经由唯一的 worker 串行执行：
//! - 调用方把请求放入有界队列，并在截止时间内等待私有的回复通道
//! - worker 按 FIFO 逐个执行 `pipeline::run`
//! - 已超时且调用方已离开的请求在执行前丢弃

pub mod kustomize;
mod pipeline;

use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::env::constants::{DEFAULT_QUEUE_CAPACITY, DEFAULT_REPLY_TIMEOUT_SECS};
use crate::config::BotConfig;
use crate::domain::{DeployIntent, Response};
use crate::error::DeployError;
use crate::infra::store::ConfigStore;
use crate::services::parser;

/// 队列中的部署请求
pub(crate) struct DeployRequest {
    /// 请求 ID（日志关联）
    pub id: Uuid,
    pub intent: DeployIntent,
    /// 单次回复通道
    pub reply: oneshot::Sender<Response>,
    /// 调用方等待的截止时间
    pub deadline: Instant,
}

/// 部署 worker
///
/// 未启动时所有入口都返回 `WorkerNotRunning`；`start` 只有第一次生效
pub struct DeployWorker {
    sender: OnceLock<mpsc::Sender<DeployRequest>>,
    queue_capacity: usize,
    reply_timeout: Duration,
}

impl Default for DeployWorker {
    fn default() -> Self {
        Self::new(
            DEFAULT_QUEUE_CAPACITY,
            Duration::from_secs(DEFAULT_REPLY_TIMEOUT_SECS),
        )
    }
}

impl DeployWorker {
    pub fn new(queue_capacity: usize, reply_timeout: Duration) -> Self {
        Self {
            sender: OnceLock::new(),
            queue_capacity: queue_capacity.max(1),
            reply_timeout,
        }
    }

    /// 启动 worker，重复调用不会产生第二个 worker
    pub fn start(&self, store: Arc<dyn ConfigStore>) -> bool {
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        if self.sender.set(tx).is_err() {
            debug!("Deploy worker is already running");
            return false;
        }

        tokio::spawn(run_worker(store, rx));
        info!(
            queue_capacity = self.queue_capacity,
            reply_timeout_secs = self.reply_timeout.as_secs(),
            "The deploy worker is running now"
        );
        true
    }

    pub fn is_running(&self) -> bool {
        self.sender.get().is_some_and(|tx| !tx.is_closed())
    }

    /// 排队中的请求数
    pub fn queued(&self) -> usize {
        self.sender
            .get()
            .map(|tx| tx.max_capacity() - tx.capacity())
            .unwrap_or(0)
    }

    /// `deploy <repo> env=<stage> image-tag=<tag>`
    pub async fn deploy(&self, config: &BotConfig, tokens: &[&str], caller: &str) -> Response {
        let Some(sender) = self.running_sender() else {
            return Response::failure(DeployError::WorkerNotRunning);
        };
        match parser::parse_deploy(config, tokens, caller) {
            Ok(intent) => {
                self.enqueue_and_wait(sender, intent, command_label("deploy", tokens))
                    .await
            }
            Err(e) => Response::failure(e),
        }
    }

    /// `release <repo> project=<project> image-tag=<tag>`
    pub async fn release(
        &self,
        config: &BotConfig,
        tokens: &[&str],
        caller: &str,
        command_text: Option<&str>,
    ) -> Response {
        let Some(sender) = self.running_sender() else {
            return Response::failure(DeployError::WorkerNotRunning);
        };
        match parser::parse_release(config, tokens, caller, command_text) {
            Ok(intent) => {
                self.enqueue_and_wait(sender, intent, command_label("release", tokens))
                    .await
            }
            Err(e) => Response::failure(e),
        }
    }

    fn running_sender(&self) -> Option<&mpsc::Sender<DeployRequest>> {
        self.sender.get().filter(|tx| !tx.is_closed())
    }

    /// 入队与等待回复共用同一个截止时间
    async fn enqueue_and_wait(
        &self,
        sender: &mpsc::Sender<DeployRequest>,
        intent: DeployIntent,
        command: String,
    ) -> Response {
        let deadline = Instant::now() + self.reply_timeout;
        let (reply_tx, reply_rx) = oneshot::channel();
        let id = Uuid::new_v4();
        let request = DeployRequest {
            id,
            intent,
            reply: reply_tx,
            deadline,
        };

        let wait = async {
            sender
                .send(request)
                .await
                .map_err(|_| DeployError::WorkerGone)?;
            debug!(request_id = %id, "Deploy request enqueued");
            reply_rx.await.map_err(|_| DeployError::WorkerGone)
        };

        match tokio::time::timeout_at(deadline, wait).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => Response::failure(e),
            Err(_) => {
                warn!(request_id = %id, command = %command, "Deploy request timed out");
                Response::failure(DeployError::Timeout {
                    command,
                    timeout: self.reply_timeout,
                })
            }
        }
    }
}

fn command_label(kind: &str, tokens: &[&str]) -> String {
    let mut label = kind.to_string();
    for token in tokens {
        label.push(' ');
        label.push_str(token);
    }
    label
}

/// worker 主循环，直到所有发送端被释放
async fn run_worker(store: Arc<dyn ConfigStore>, mut rx: mpsc::Receiver<DeployRequest>) {
    while let Some(request) = rx.recv().await {
        let target = request.intent.target();

        if Instant::now() >= request.deadline && request.reply.is_closed() {
            warn!(
                request_id = %request.id,
                target = %target,
                "Caller has gone away before the deploy started, dropping request"
            );
            continue;
        }

        let span = info_span!(
            "deploy",
            kind = request.intent.kind.as_str(),
            request_id = %request.id,
            repo = %request.intent.codebase.repo,
            stage = %request.intent.stage,
            caller = %request.intent.caller,
        );
        let response = pipeline::run(store.as_ref(), &request.intent)
            .instrument(span)
            .await;

        if let Err(response) = request.reply.send(response) {
            warn!(
                request_id = %request.id,
                target = %target,
                success = response.is_success(),
                "Caller has gone away, reply is dropped"
            );
        }
    }
    info!("Deploy worker stopped");
}
