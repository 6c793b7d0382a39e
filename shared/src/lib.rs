//! Shared types for the dealership fiscal core
//!
//! Types exchanged between the invoicing/proforma service and `fiscal-core`:
//! error codes, document kinds, ledger payloads, seals and backup manifests.

pub mod error;
pub mod models;
pub mod util;

// Re-exports
pub use serde::{Deserialize, Serialize};

pub use error::{ErrorCategory, ErrorCode};
pub use models::{
    CreditNoteState, DocumentKind, InvoiceState, ManifestEntry, OperationKind, ProformaState,
    RecordState, Seal,
};
