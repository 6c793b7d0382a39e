//! Unified error codes for the fiscal core
//!
//! - [`ErrorCode`]: Standardized error codes
//! - [`ErrorCategory`]: Classification of errors by domain
//!
//! # Error Code Ranges
//!
//! - 0xxx: General errors
//! - 2xxx: Document numbering errors
//! - 3xxx: Integrity errors
//! - 4xxx: Backup errors
//! - 9xxx: System errors
//!
//! # Example
//!
//! ```
//! use shared::error::{ErrorCategory, ErrorCode};
//!
//! let code = ErrorCode::DuplicateNumber;
//! assert_eq!(code.code(), 2002);
//! assert_eq!(code.category(), ErrorCategory::Numbering);
//! ```

mod category;
mod codes;

pub use category::ErrorCategory;
pub use codes::{ErrorCode, InvalidErrorCode};
