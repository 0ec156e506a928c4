//! 应用状态

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::{env::EnvConfig, BotConfig};
use crate::infra::GitRepository;
use crate::services::{CommandDispatcher, DeployWorker};

/// 全局 shutdown token，用于优雅关闭 HTTP 服务
static GLOBAL_SHUTDOWN: std::sync::OnceLock<CancellationToken> = std::sync::OnceLock::new();

/// 获取全局 shutdown token
pub fn get_shutdown_token() -> CancellationToken {
    GLOBAL_SHUTDOWN.get_or_init(CancellationToken::new).clone()
}

/// 触发全局 shutdown
pub fn trigger_shutdown() {
    if let Some(token) = GLOBAL_SHUTDOWN.get() {
        token.cancel();
    }
}

/// 应用状态
pub struct AppState {
    // ========== 核心配置 ==========
    /// API 密钥（用于验证请求）
    pub api_key: String,
    /// 环境配置
    pub config: EnvConfig,
    /// 部署配置（codebase / cluster）
    pub bot: Arc<BotConfig>,
    /// 服务启动时间
    pub started_at: DateTime<Utc>,

    // ========== 部署 ==========
    /// kubernetes-configs 仓库
    pub repository: Arc<GitRepository>,
    /// 串行执行部署的 worker
    pub worker: Arc<DeployWorker>,
    /// 命令分发器
    pub dispatcher: CommandDispatcher,
}

impl AppState {
    pub fn new(
        config: EnvConfig,
        bot: Arc<BotConfig>,
        repository: Arc<GitRepository>,
        worker: Arc<DeployWorker>,
        dispatcher: CommandDispatcher,
    ) -> Self {
        tracing::info!(
            api_key_len = config.api_key.len(),
            port = config.port,
            config_path = %config.config_path.display(),
            codebase_count = bot.codebases.len(),
            "Loaded configuration"
        );

        for codebase in &bot.codebases {
            tracing::info!(
                repo = %codebase.repo,
                structure = codebase.structure.as_str(),
                stages = %codebase.stages.join(","),
                "Registered codebase"
            );
        }

        Self {
            api_key: config.api_key.clone(),
            config,
            bot,
            started_at: Utc::now(),
            repository,
            worker,
            dispatcher,
        }
    }

    /// 运行时长（秒）
    pub fn uptime_secs(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}
