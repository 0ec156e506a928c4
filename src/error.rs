//! 统一错误处理
//!
//! 领域错误按层划分：
//! - `ValidationError`：命令或拓扑校验失败，从不修改仓库
//! - `RepositoryError`：git 工作区 / 远端操作失败
//! - `DeployError`：worker 返回给调用方的最终错误
//!
//! HTTP 层使用 `ApiError` 实现 `IntoResponse`

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use crate::infra::command::CommandError;

/// 命令 / 拓扑校验错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("command is empty, try `help`")]
    EmptyCommand,

    #[error("command({0}) is not supported")]
    UnknownCommand(String),

    #[error("invalid repo name: {0}")]
    UnknownRepository(String),

    #[error("argument({0}) is expected")]
    MissingArgument(String),

    #[error("{} are not supported", .0.join(", "))]
    UnsupportedArguments(Vec<String>),

    #[error("deploy command doesn't support prod env, use release instead")]
    ProdNotAllowedViaDeploy,

    #[error("stage({stage}) is not supported for {repo}")]
    UnsupportedStage { repo: String, stage: String },

    #[error("project({project}) is not supported for {repo}")]
    UnsupportedProject { repo: String, project: String },

    #[error("service({service}) is not supported for {repo}")]
    UnsupportedService { repo: String, service: String },

    #[error("project is required to resolve {stage} paths of {repo}")]
    MissingProject { repo: String, stage: String },

    #[error("no cluster is configured for {project}/{stage}")]
    UnknownCluster { project: String, stage: String },

    #[error("usage: {0}")]
    Usage(&'static str),
}

/// git 仓库操作错误
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("ssh credential {path} is not readable: {source}")]
    Credentials {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cloning {url} failed: {message}")]
    Clone { url: String, message: String },

    #[error("git {operation} failed: {message}")]
    Git {
        operation: &'static str,
        message: String,
    },

    #[error("file({0}) is not found in the work tree")]
    FileNotFound(String),

    #[error("path({0}) must be relative to the work tree")]
    InvalidPath(String),

    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Command(#[from] CommandError),
}

/// 部署请求的最终错误
#[derive(Debug, Error)]
pub enum DeployError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{context}: {source}")]
    Repository {
        context: String,
        #[source]
        source: RepositoryError,
    },

    #[error("{context}: {source}")]
    Manifest {
        context: String,
        #[source]
        source: crate::services::deploy::kustomize::ManifestError,
    },

    #[error("\"{command}\" command has timed out ({timeout:?})")]
    Timeout { command: String, timeout: Duration },

    #[error("deploy worker is not running")]
    WorkerNotRunning,

    #[error("deploy worker stopped before replying")]
    WorkerGone,

    #[error("cluster query failed: {0}")]
    Query(#[from] crate::infra::kube::QueryError),
}

impl DeployError {
    /// 为仓库错误附加上下文
    pub fn repository(context: impl Into<String>, source: RepositoryError) -> Self {
        Self::Repository {
            context: context.into(),
            source,
        }
    }

    /// 是否为校验错误（不会触发任何仓库操作）
    pub fn is_validation(&self) -> bool {
        matches!(self, DeployError::Validation(_))
    }
}

/// 配置加载错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config file {path} failed: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing config file {path} failed: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("codebase {0} is declared more than once")]
    DuplicateCodebase(String),
}

/// 启动错误
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("binding {addr} failed: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("http server stopped: {0}")]
    Serve(#[source] std::io::Error),
}

/// API 错误响应结构
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}

/// 统一 API 错误类型
#[derive(Debug)]
pub enum ApiError {
    /// 401 - 未授权（API Key 无效或缺失）
    Unauthorized,
    /// 400 - 请求无效
    BadRequest(String),
}

impl ApiError {
    /// 创建未授权错误
    pub fn unauthorized() -> Self {
        Self::Unauthorized
    }

    /// 创建请求无效错误
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "Invalid or missing API key".to_string(),
            ),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
        };

        let body = ErrorResponse::new(error_type, message);
        (status, Json(body)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Unauthorized => write!(f, "Unauthorized"),
            ApiError::BadRequest(m) => write!(f, "Bad request: {}", m),
        }
    }
}

impl std::error::Error for ApiError {}

/// 便捷类型别名
pub type ApiResult<T> = Result<T, ApiError>;
