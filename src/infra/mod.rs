//! 基础设施模块
//!
//! 封装外部依赖（git / helm / kubectl 命令执行）

pub mod command;
pub mod git;
pub mod kube;
pub mod store;

pub use command::CommandRunner;
pub use git::{GitRepository, RepoStatus};
pub use kube::{ClusterQuery, KubectlClusterQuery, QueryError};
pub use store::{CommitHash, ConfigStore, PullOutcome};
