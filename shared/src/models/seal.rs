//! Timestamp seal

use serde::{Deserialize, Serialize};

/// Current seal format version
pub const SEAL_VERSION: &str = "1.0";

/// Binding of a document's content hash to the time it was sealed
///
/// Immutable once produced; may be re-verified any number of times.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Seal {
    /// UTC ISO-8601 timestamp
    pub timestamp: String,
    /// SHA-256 of the canonical document (lowercase hex)
    pub document_hash: String,
    /// SHA-256 of `{timestamp, documentHash, version}` (lowercase hex)
    pub seal_hash: String,
    pub version: String,
}
