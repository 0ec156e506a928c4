//! 健康检查 API

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;

use crate::config::env::constants::VERSION;
use crate::infra::RepoStatus;
use crate::state::AppState;

/// 健康检查响应
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
    timestamp: String,
    uptime_secs: i64,
    codebases: Vec<String>,
    worker_running: bool,
    queued_requests: usize,
    repository: RepoStatus,
}

/// 创建健康检查路由
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(health_check))
}

/// GET /health, GET /status
/// 无需认证
async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let worker_running = state.worker.is_running();

    Json(HealthResponse {
        status: if worker_running { "ok" } else { "degraded" },
        service: "major-tom",
        version: VERSION,
        timestamp: chrono::Utc::now().to_rfc3339(),
        uptime_secs: state.uptime_secs(),
        codebases: state
            .bot
            .codebase_names()
            .into_iter()
            .map(str::to_string)
            .collect(),
        worker_running,
        queued_requests: state.worker.queued(),
        repository: state.repository.status(),
    })
}
