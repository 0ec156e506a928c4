//! 命令执行器
//!
//! 提供统一的外部命令执行接口（git / helm / kubectl），支持：
//! - 超时控制（超时后进程随句柄一起被终止）
//! - 额外环境变量
//! - stdout/stderr 分离

use std::path::Path;
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, error};

/// 命令执行器
pub struct CommandRunner;

/// 命令执行错误
#[derive(Debug)]
pub enum CommandError {
    /// 命令启动失败
    SpawnFailed {
        program: String,
        source: std::io::Error,
    },
    /// 命令超时
    Timeout { program: String, timeout: Duration },
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandError::SpawnFailed { program, source } => {
                write!(f, "Failed to spawn {}: {}", program, source)
            }
            CommandError::Timeout { program, timeout } => {
                write!(f, "{} timed out after {:?}", program, timeout)
            }
        }
    }
}

impl std::error::Error for CommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CommandError::SpawnFailed { source, .. } => Some(source),
            CommandError::Timeout { .. } => None,
        }
    }
}

impl CommandRunner {
    /// 执行简单命令（无流式输出）
    ///
    /// 用于不需要实时日志的场景（如 helm list）
    pub async fn run_simple(
        program: &str,
        args: &[&str],
        work_dir: &Path,
        timeout: Duration,
    ) -> Result<Output, CommandError> {
        Self::run_with_env(program, args, work_dir, &[], timeout).await
    }

    /// 执行命令并附加环境变量
    ///
    /// # Arguments
    /// * `program` - 要执行的程序
    /// * `args` - 命令行参数
    /// * `work_dir` - 工作目录
    /// * `envs` - 额外的环境变量（如 `GIT_SSH_COMMAND`）
    /// * `timeout` - 超时时间
    pub async fn run_with_env(
        program: &str,
        args: &[&str],
        work_dir: &Path,
        envs: &[(&str, String)],
        timeout: Duration,
    ) -> Result<Output, CommandError> {
        debug!(program, ?args, work_dir = %work_dir.display(), "Running command");

        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(work_dir)
            .kill_on_drop(true);
        for (key, value) in envs {
            command.env(key, value);
        }

        tokio::select! {
            result = command.output() => {
                result.map_err(|source| CommandError::SpawnFailed {
                    program: program.to_string(),
                    source,
                })
            }
            _ = tokio::time::sleep(timeout) => {
                error!(program, "Command timed out after {:?}", timeout);
                Err(CommandError::Timeout {
                    program: program.to_string(),
                    timeout,
                })
            }
        }
    }
}

/// 截取命令的 stderr（为空时回退到 stdout），用于错误信息
pub fn failure_output(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if !stderr.is_empty() {
        return stderr;
    }
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if stdout.is_empty() {
        format!("exited with {}", output.status)
    } else {
        stdout
    }
}
