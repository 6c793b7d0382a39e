//! Unified error codes for the fiscal core
//!
//! Error codes are organized by category:
//! - 0xxx: General errors
//! - 2xxx: Document numbering errors
//! - 3xxx: Integrity errors
//! - 4xxx: Backup errors
//! - 9xxx: System errors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error code enum
///
/// All error codes are represented as u16 values so the invoicing service can
/// forward them unchanged to its own clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Operation completed successfully
    Success = 0,
    /// Validation failed
    ValidationFailed = 2,

    // ==================== 2xxx: Numbering ====================
    /// Company does not exist or has no usable profile
    InvalidCompany = 2001,
    /// Number already issued for this company, kind and year
    DuplicateNumber = 2002,
    /// Allocation retried past its budget
    ExhaustedRetries = 2003,
    /// Write-write conflict on the counter row
    ConcurrencyConflict = 2004,

    // ==================== 3xxx: Integrity ====================
    /// Hash or checksum mismatch
    IntegrityMismatch = 3001,

    // ==================== 4xxx: Backup ====================
    /// Backup snapshot failed
    BackupFailed = 4001,
    /// Verified backup could not be copied into the live store
    RestoreFailed = 4003,

    // ==================== 9xxx: System ====================
    /// Database error (fatal to the triggering call)
    DatabaseError = 9002,
    /// File system error
    IoError = 9006,
    /// Serialization error
    SerializationError = 9007,
}

impl ErrorCode {
    /// Get the numeric code value
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    /// Check if this is a success code
    #[inline]
    pub const fn is_success(&self) -> bool {
        matches!(self, ErrorCode::Success)
    }

    /// Whether the caller may retry the same request unchanged
    ///
    /// Storage failures are fatal: a failed ledger append is never replayed.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, ErrorCode::ConcurrencyConflict)
    }

    /// Get the developer-facing English message for this error code
    pub const fn message(&self) -> &'static str {
        match self {
            // General
            ErrorCode::Success => "Operation completed successfully",
            ErrorCode::ValidationFailed => "Validation failed",

            // Numbering
            ErrorCode::InvalidCompany => "Company not found",
            ErrorCode::DuplicateNumber => "Document number already issued",
            ErrorCode::ExhaustedRetries => "Document number allocation retries exhausted",
            ErrorCode::ConcurrencyConflict => "Concurrent write conflict",

            // Integrity
            ErrorCode::IntegrityMismatch => "Integrity check failed",

            // Backup
            ErrorCode::BackupFailed => "Backup failed",
            ErrorCode::RestoreFailed => "Restore failed",

            // System
            ErrorCode::DatabaseError => "Database error",
            ErrorCode::IoError => "File system error",
            ErrorCode::SerializationError => "Serialization error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{:04}", self.code())
    }
}

impl From<ErrorCode> for u16 {
    #[inline]
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// Error when converting from an invalid u16 to ErrorCode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            // General
            0 => Ok(ErrorCode::Success),
            2 => Ok(ErrorCode::ValidationFailed),

            // Numbering
            2001 => Ok(ErrorCode::InvalidCompany),
            2002 => Ok(ErrorCode::DuplicateNumber),
            2003 => Ok(ErrorCode::ExhaustedRetries),
            2004 => Ok(ErrorCode::ConcurrencyConflict),

            // Integrity
            3001 => Ok(ErrorCode::IntegrityMismatch),

            // Backup
            4001 => Ok(ErrorCode::BackupFailed),
            4003 => Ok(ErrorCode::RestoreFailed),

            // System
            9002 => Ok(ErrorCode::DatabaseError),
            9006 => Ok(ErrorCode::IoError),
            9007 => Ok(ErrorCode::SerializationError),

            _ => Err(InvalidErrorCode(value)),
        }
    }
}
