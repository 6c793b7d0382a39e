//! 备份模块
//!
//! - [`BackupCoordinator`] - 快照、恢复、保留策略
//! - [`BackupManifest`] - `manifest.json` 读写
//! - [`RetentionPolicy`] - 纯函数式的过期选择

mod coordinator;
mod manifest;
mod retention;

pub use coordinator::BackupCoordinator;
pub use manifest::{BackupManifest, MANIFEST_FILE};
pub use retention::RetentionPolicy;
