//! 服务层模块
//!
//! 包含核心业务逻辑

pub mod deploy;
pub mod dispatch;
pub mod parser;

pub use deploy::DeployWorker;
pub use dispatch::CommandDispatcher;
