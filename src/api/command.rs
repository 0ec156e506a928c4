//! 聊天命令 API
//!
//! 聊天传输层把命令文本转发到 `POST /command`

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::domain::Response;
use crate::error::{ApiError, ApiResult, DeployError};
use crate::middleware::RequireApiKey;
use crate::state::AppState;

/// 命令请求
#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    /// 去掉触发词后的命令文本
    pub text: String,
    /// 调用者标识（如 `@alice`）
    #[serde(default = "default_caller")]
    pub caller: String,
}

fn default_caller() -> String {
    "anonymous".to_string()
}

/// 命令回复
#[derive(Debug, Serialize)]
pub struct CommandResponse {
    pub ok: bool,
    pub messages: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&Response> for CommandResponse {
    fn from(response: &Response) -> Self {
        Self {
            ok: response.is_success(),
            messages: response.render_lines(),
            error: response.error.as_ref().map(ToString::to_string),
        }
    }
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/command", post(submit_command))
}

/// POST /command
/// 需要 API Key 认证
async fn submit_command(
    _auth: RequireApiKey,
    State(state): State<Arc<AppState>>,
    Json(request): Json<CommandRequest>,
) -> ApiResult<(StatusCode, Json<CommandResponse>)> {
    if request.text.trim().is_empty() {
        return Err(ApiError::bad_request("text is required"));
    }

    let response = state
        .dispatcher
        .submit(&request.text, &request.caller)
        .await;

    if let Some(ref error) = response.error {
        tracing::warn!(caller = %request.caller, error = %error, "Command failed");
    }

    Ok((status_for(&response), Json(CommandResponse::from(&response))))
}

/// 错误类型到 HTTP 状态码
fn status_for(response: &Response) -> StatusCode {
    match response.error {
        None => StatusCode::OK,
        Some(DeployError::Validation(_)) => StatusCode::BAD_REQUEST,
        Some(DeployError::WorkerNotRunning) | Some(DeployError::WorkerGone) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        Some(DeployError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
        Some(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
