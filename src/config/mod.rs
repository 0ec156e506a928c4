//! 配置模块
//!
//! 环境变量、命令行覆盖与部署配置文件

pub mod codebase;
pub mod env;
pub mod repo;

pub use codebase::{Codebase, ResolvedPath, ServiceRef, StructureType};
pub use env::{EnvConfig, RuntimeConfig};
pub use repo::{BotConfig, ClusterConfigs, GitConfig};
