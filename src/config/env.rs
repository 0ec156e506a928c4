//! 环境变量配置加载

use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

use self::constants::{DEFAULT_QUEUE_CAPACITY, DEFAULT_REPLY_TIMEOUT_SECS};

/// 命令行参数覆盖
#[derive(Clone, Debug, Default)]
pub struct RuntimeConfig {
    /// 覆盖监听端口
    pub port_override: Option<u16>,
    /// 覆盖配置文件路径
    pub config_path_override: Option<PathBuf>,
}

/// 环境配置
#[derive(Clone, Debug)]
pub struct EnvConfig {
    /// API 密钥
    pub api_key: String,
    /// 服务监听端口
    pub port: u16,
    /// 部署配置文件（YAML）
    pub config_path: PathBuf,
    /// 部署队列容量
    pub queue_capacity: usize,
    /// 调用方等待 worker 回复的超时
    pub reply_timeout: Duration,
}

impl EnvConfig {
    /// 从环境变量加载配置
    pub fn from_env() -> Self {
        // API Key - 支持旧名称兼容
        let api_key = load_with_fallback("MAJOR_TOM_API_KEY", "API_KEY")
            .unwrap_or_else(|| "change-me-in-production".to_string());
        if env::var("MAJOR_TOM_API_KEY").is_err() && env::var("API_KEY").is_ok() {
            warn!("Deprecated environment variable API_KEY detected. Please use MAJOR_TOM_API_KEY");
        }

        let port = env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(9876);

        let config_path = env::var("MAJOR_TOM_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("configs/major-tom.yaml"));

        let queue_capacity = env::var("DEPLOY_QUEUE_CAPACITY")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|v: &usize| *v > 0)
            .unwrap_or(DEFAULT_QUEUE_CAPACITY);

        let reply_timeout_secs = env::var("DEPLOY_REPLY_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_REPLY_TIMEOUT_SECS);

        Self {
            api_key,
            port,
            config_path,
            queue_capacity,
            reply_timeout: Duration::from_secs(reply_timeout_secs),
        }
    }

    /// 应用命令行覆盖
    pub fn with_runtime(mut self, runtime: &RuntimeConfig) -> Self {
        if let Some(port) = runtime.port_override {
            self.port = port;
        }
        if let Some(ref path) = runtime.config_path_override {
            self.config_path = path.clone();
        }
        self
    }
}

/// 加载环境变量，支持 fallback
fn load_with_fallback(primary: &str, fallback: &str) -> Option<String> {
    env::var(primary).ok().or_else(|| env::var(fallback).ok())
}

/// 常量
pub mod constants {
    /// 部署队列默认容量
    pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

    /// 调用方等待回复的默认超时（秒）
    pub const DEFAULT_REPLY_TIMEOUT_SECS: u64 = 300; // 5 分钟

    /// 单条 git 命令超时（秒）
    pub const GIT_TIMEOUT_SECS: u64 = 120;

    /// helm / kubectl 查询超时（秒）
    pub const KUBE_QUERY_TIMEOUT_SECS: u64 = 30;

    /// 版本号
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
}
