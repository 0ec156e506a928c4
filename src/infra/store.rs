//! 配置存储抽象
//!
//! deploy worker 只依赖 `ConfigStore`，生产环境由 `GitRepository` 实现

use async_trait::async_trait;
use std::fmt;

use crate::error::RepositoryError;

/// 提交哈希
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CommitHash(pub String);

impl CommitHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 短哈希，用于日志
    pub fn short(&self) -> &str {
        let end = self.0.len().min(8);
        &self.0[..end]
    }
}

impl fmt::Display for CommitHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// pull 的结果
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PullOutcome {
    /// 本地已经是远端最新
    AlreadyUpToDate,
    /// 快进到了新的提交
    Updated { from: CommitHash, to: CommitHash },
}

/// 基于路径的事务式文件存储
///
/// 每个操作在内部独占锁中完成
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// 快进到远端最新
    async fn pull(&self) -> Result<PullOutcome, RepositoryError>;

    /// 当前 HEAD，作为回滚锚点
    async fn head_hash(&self) -> Result<CommitHash, RepositoryError>;

    /// 读取工作区中已存在的文件
    async fn read_file(&self, path: &str) -> Result<Vec<u8>, RepositoryError>;

    /// 截断并重写工作区中已存在的文件
    async fn write_file(&self, path: &str, content: &[u8]) -> Result<(), RepositoryError>;

    /// 加入暂存区
    async fn stage(&self, path: &str) -> Result<(), RepositoryError>;

    /// 以 `"<bot>(<caller>)"` 为作者提交，返回新的 HEAD
    async fn commit(
        &self,
        path: &str,
        caller: &str,
        message: &str,
    ) -> Result<CommitHash, RepositoryError>;

    /// 推送到远端分支
    async fn push(&self) -> Result<(), RepositoryError>;

    /// 丢弃所有未推送的修改，恢复到指定提交
    async fn hard_reset(&self, hash: &CommitHash) -> Result<(), RepositoryError>;
}
