//! 核心模块 - 配置、组件装配和后台任务
//!
//! # 模块结构
//!
//! - [`Config`] - 环境变量配置
//! - [`FiscalCore`] - 组件装配
//! - [`BackgroundTasks`] - 后台任务注册与关闭

pub mod config;
pub mod state;
pub mod tasks;

pub use config::Config;
pub use state::FiscalCore;
pub use tasks::{BackgroundTasks, TaskKind};
