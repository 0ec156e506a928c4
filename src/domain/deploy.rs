//! 部署相关领域模型

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::codebase::Codebase;
use crate::error::DeployError;

/// 操作类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// 非生产环境部署（env=...）
    Deploy,
    /// 生产环境发布（project=...，固定 prod）
    Release,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Deploy => "deploy",
            OperationKind::Release => "release",
        }
    }
}

/// 解析并校验后的部署意图
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeployIntent {
    pub codebase: Codebase,
    pub stage: String,
    pub project: Option<String>,
    pub image_tag: String,
    pub caller: String,
    pub kind: OperationKind,
    /// 原始命令文本（release 的提交信息会引用）
    pub command_text: Option<String>,
}

impl DeployIntent {
    /// `repo/stage[/project]`
    pub fn target(&self) -> String {
        match self.project {
            Some(ref project) => format!("{}/{}/{}", self.codebase.repo, self.stage, project),
            None => format!("{}/{}", self.codebase.repo, self.stage),
        }
    }

    /// 提交信息（同时作为成功回复），每行一个元素
    pub fn commit_message_lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("deploy({}): deployed by {}", self.target(), self.caller),
            String::new(),
            format!("Set image-tag(images.0.newTag) to {}", self.image_tag),
        ];
        if self.kind == OperationKind::Release {
            if let Some(ref text) = self.command_text {
                lines.push(format!("by \"{}\"", text));
            }
        }
        lines
    }
}

/// worker 对每个请求的唯一回复
#[derive(Debug, Default)]
pub struct Response {
    pub messages: Vec<String>,
    pub error: Option<DeployError>,
}

impl Response {
    pub fn success(messages: Vec<String>) -> Self {
        Self {
            messages,
            error: None,
        }
    }

    pub fn failure(error: impl Into<DeployError>) -> Self {
        Self {
            messages: Vec::new(),
            error: Some(error.into()),
        }
    }

    pub fn failure_with(error: impl Into<DeployError>, messages: Vec<String>) -> Self {
        Self {
            messages,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// 面向用户的输出：失败时错误信息放在第一行，保证至少一行
    pub fn render_lines(&self) -> Vec<String> {
        match self.error {
            Some(ref error) => {
                let mut lines = Vec::with_capacity(self.messages.len() + 1);
                lines.push(error.to_string());
                lines.extend(self.messages.iter().cloned());
                lines
            }
            None if self.messages.is_empty() => vec!["done".to_string()],
            None => self.messages.clone(),
        }
    }
}

/// 阶段状态
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
}

/// 部署阶段信息
#[derive(Clone, Debug, Serialize)]
pub struct DeployStage {
    /// 阶段标识 (e.g., "git_pull", "git_push")
    pub name: &'static str,
    /// 开始时间
    pub started_at: Option<DateTime<Utc>>,
    /// 结束时间
    pub finished_at: Option<DateTime<Utc>>,
    /// 持续时间（毫秒）
    pub duration_ms: Option<i64>,
    /// 阶段状态
    pub status: StageStatus,
    /// 附加信息
    pub message: Option<String>,
}

impl DeployStage {
    /// 创建新的待执行阶段
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            started_at: None,
            finished_at: None,
            duration_ms: None,
            status: StageStatus::Pending,
            message: None,
        }
    }

    /// 开始执行阶段
    pub fn start(&mut self) {
        self.started_at = Some(Utc::now());
        self.status = StageStatus::Running;
    }

    /// 完成阶段
    pub fn finish(&mut self, success: bool, message: Option<String>) {
        let now = Utc::now();
        self.finished_at = Some(now);
        self.status = if success {
            StageStatus::Success
        } else {
            StageStatus::Failed
        };
        self.message = message;
        if let Some(started) = self.started_at {
            self.duration_ms = Some((now - started).num_milliseconds());
        }
    }

    /// 跳过阶段
    pub fn skip(&mut self, reason: Option<String>) {
        self.status = StageStatus::Skipped;
        self.message = reason;
    }

    pub fn status_icon(&self) -> &'static str {
        match self.status {
            StageStatus::Success => "✓",
            StageStatus::Failed => "✗",
            StageStatus::Skipped => "⊘",
            StageStatus::Running => "⟳",
            StageStatus::Pending => "○",
        }
    }
}
