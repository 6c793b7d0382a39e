//! 时间戳封印
//!
//! A [`Seal`] binds the content hash of a document to the moment it was
//! sealed:
//!
//! ```text
//! documentHash = digest(document)
//! sealHash     = digest({timestamp, documentHash, version})
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use shared::models::{SEAL_VERSION, Seal};
use shared::util::to_iso8601;

use crate::hash;
use crate::utils::FiscalResult;

/// Time source for seals
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock (UTC)
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Clone)]
pub struct SealingService {
    clock: Arc<dyn Clock>,
}

impl Default for SealingService {
    fn default() -> Self {
        Self::new()
    }
}

impl SealingService {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Seal a document at the current time
    pub fn seal<T: Serialize + ?Sized>(&self, document: &T) -> FiscalResult<Seal> {
        self.seal_at(document, &to_iso8601(self.clock.now()))
    }

    /// Seal a document at a caller-supplied (persisted) timestamp
    pub fn seal_at<T: Serialize + ?Sized>(&self, document: &T, timestamp: &str) -> FiscalResult<Seal> {
        let document_hash = hash::digest(document)?;
        let seal_hash = compute_seal_hash(timestamp, &document_hash, SEAL_VERSION);
        Ok(Seal {
            timestamp: timestamp.to_string(),
            document_hash,
            seal_hash,
            version: SEAL_VERSION.to_string(),
        })
    }

    /// Recompute both hashes; any mismatch or unserializable document is `false`
    pub fn verify<T: Serialize + ?Sized>(&self, document: &T, seal: &Seal) -> bool {
        verify_seal(document, seal)
    }
}

/// Stateless seal check (also used by the ledger verifier)
pub fn verify_seal<T: Serialize + ?Sized>(document: &T, seal: &Seal) -> bool {
    if seal.version != SEAL_VERSION {
        return false;
    }
    let Ok(document_hash) = hash::digest(document) else {
        return false;
    };
    document_hash == seal.document_hash && seal_hash_matches(seal)
}

/// Whether `seal.seal_hash` recomputes from the seal's own fields
pub fn seal_hash_matches(seal: &Seal) -> bool {
    compute_seal_hash(&seal.timestamp, &seal.document_hash, &seal.version) == seal.seal_hash
}

fn compute_seal_hash(timestamp: &str, document_hash: &str, version: &str) -> String {
    hash::digest_value(&json!({
        "timestamp": timestamp,
        "documentHash": document_hash,
        "version": version,
    }))
}
