//! Backup manifest model

use serde::{Deserialize, Serialize};

/// One completed backup, as listed in `manifest.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub file_name: String,
    /// UTC ISO-8601
    pub created_at: String,
    /// SHA-256 of the snapshot file (lowercase hex)
    pub checksum: String,
    pub size_bytes: u64,
}
