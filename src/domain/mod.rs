//! 领域模型模块
//!
//! 纯数据结构，不依赖 axum/tokio

pub mod cluster;
pub mod deploy;

// Re-exports for convenience
pub use cluster::{DeploymentInfo, ReleaseInfo};
pub use deploy::{DeployIntent, DeployStage, OperationKind, Response, StageStatus};
