//! Data models
//!
//! Shared between `fiscal-core` and the invoicing/proforma service.

pub mod backup;
pub mod document;
pub mod record_state;
pub mod seal;

// Re-exports
pub use backup::*;
pub use document::*;
pub use record_state::*;
pub use seal::*;
