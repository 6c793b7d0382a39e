//! 统一错误处理
//!
//! [`FiscalError`] is the single error type returned by every public
//! operation of the fiscal core. Each variant maps to a stable
//! [`ErrorCode`] so the invoicing service can forward it unchanged.
//!
//! | 分类 | 变体 | 处理方式 |
//! |------|------|----------|
//! | 输入错误 | `Validation`, `InvalidCompany` | 立即返回调用方，不重试 |
//! | 编号冲突 | `DuplicateNumber`, `Concurrency` | 分配器内部有限重试 |
//! | 重试耗尽 | `ExhaustedRetries` | 阻止单据创建 |
//! | 完整性 | `Integrity` | 仅 restore 抛出，其余以结果值报告 |
//! | 存储错误 | `Storage`, `Io`, `Backup`, `Restore` | 致命，带上下文记录日志，调用方不得重试 |

use shared::error::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FiscalError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Company not found: {0}")]
    InvalidCompany(i64),

    #[error("Document number already issued: {0}")]
    DuplicateNumber(String),

    #[error("Concurrent write conflict: {0}")]
    Concurrency(String),

    #[error("Number allocation gave up after {attempts} attempts")]
    ExhaustedRetries { attempts: u32 },

    #[error("Integrity check failed: {0}")]
    Integrity(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Backup error: {0}")]
    Backup(String),

    #[error("Restore failed: {0}")]
    Restore(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl FiscalError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn integrity(msg: impl Into<String>) -> Self {
        Self::Integrity(msg.into())
    }

    pub fn backup(msg: impl Into<String>) -> Self {
        Self::Backup(msg.into())
    }

    /// Stable error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            FiscalError::Validation(_) => ErrorCode::ValidationFailed,
            FiscalError::InvalidCompany(_) => ErrorCode::InvalidCompany,
            FiscalError::DuplicateNumber(_) => ErrorCode::DuplicateNumber,
            FiscalError::Concurrency(_) => ErrorCode::ConcurrencyConflict,
            FiscalError::ExhaustedRetries { .. } => ErrorCode::ExhaustedRetries,
            FiscalError::Integrity(_) => ErrorCode::IntegrityMismatch,
            FiscalError::Storage(_) => ErrorCode::DatabaseError,
            FiscalError::Backup(_) => ErrorCode::BackupFailed,
            FiscalError::Restore(_) => ErrorCode::RestoreFailed,
            FiscalError::Io(_) => ErrorCode::IoError,
            FiscalError::Serialization(_) => ErrorCode::SerializationError,
        }
    }

    /// Conflicts the sequence allocator absorbs by retrying
    pub fn is_retryable_conflict(&self) -> bool {
        matches!(
            self,
            FiscalError::DuplicateNumber(_) | FiscalError::Concurrency(_)
        )
    }
}

impl From<sqlx::Error> for FiscalError {
    fn from(err: sqlx::Error) -> Self {
        FiscalError::Storage(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for FiscalError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        FiscalError::Storage(format!("Failed to apply migrations: {err}"))
    }
}

pub type FiscalResult<T> = Result<T, FiscalError>;
