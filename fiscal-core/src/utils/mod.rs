//! 工具模块 - 通用工具函数和类型
//!
//! # 内容
//!
//! - [`FiscalError`] - 核心错误类型
//! - 日志初始化

pub mod error;
pub mod logger;

pub use error::{FiscalError, FiscalResult};
pub use logger::{INTEGRITY_TARGET, cleanup_old_logs, init_logger, init_logger_with_file};
