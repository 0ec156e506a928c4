//! Major Tom - 聊天驱动的 GitOps 部署机器人
//!
//! 把聊天命令转换为 kubernetes-configs 仓库中 kustomize overlay 的修改，
//! 以调用者的名义提交并推送。

pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod infra;
pub mod middleware;
pub mod services;
pub mod state;

#[cfg(test)]
pub(crate) mod test_support;

use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

pub use config::RuntimeConfig;

use config::{BotConfig, EnvConfig};
use error::StartupError;
use infra::{GitRepository, KubectlClusterQuery};
use services::{CommandDispatcher, DeployWorker};
use state::{get_shutdown_token, trigger_shutdown, AppState};

/// 初始化日志（`RUST_LOG`，默认 info）
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // 重复初始化时忽略
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// 加载配置、启动 deploy worker 与 HTTP 服务，直到收到 Ctrl-C
pub async fn init_and_run_agent_with_config(runtime: RuntimeConfig) -> Result<(), StartupError> {
    init_tracing();

    let env = EnvConfig::from_env().with_runtime(&runtime);
    let bot = Arc::new(BotConfig::load(&env.config_path)?);

    let repository = Arc::new(GitRepository::new(bot.git.clone()));
    // 提前 clone；失败时 worker 在第一次部署时重试
    if let Err(e) = repository.initialize().await {
        tracing::warn!(error = %e, "Initial clone failed, will retry on first deploy");
    }

    let worker = Arc::new(DeployWorker::new(env.queue_capacity, env.reply_timeout));
    worker.start(repository.clone());

    let dispatcher =
        CommandDispatcher::new(bot.clone(), worker.clone(), Arc::new(KubectlClusterQuery::new()));

    let port = env.port;
    let state = Arc::new(AppState::new(env, bot, repository, worker, dispatcher));
    let app = api::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| StartupError::Bind {
            addr: addr.to_string(),
            source,
        })?;
    tracing::info!(%addr, version = config::env::constants::VERSION, "Major Tom is listening");

    tokio::spawn(async {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl-C, shutting down");
            trigger_shutdown();
        }
    });

    let shutdown = get_shutdown_token();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(StartupError::Serve)?;

    tracing::info!("Major Tom stopped");
    Ok(())
}
