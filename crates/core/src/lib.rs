//! 基础层：统一错误类型、配置加载与日志初始化

pub mod config;
pub mod errors;
pub mod logging;

pub use config::{AppConfig, EngineConfig, GpuConfig, RetryConfig, RunConfig};
pub use errors::{DockingError, Result};
pub use logging::init_logging;
