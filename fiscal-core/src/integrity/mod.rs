//! 完整性校验
//!
//! - 备份文件：流式 SHA-256，与清单中的校验和、大小比较
//! - 审计账本：委托 `AuditLedger::verify_all`，不完整时写入 integrity 告警通道
//!
//! Verification reports results as values; it never blocks normal traffic.

use std::path::Path;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

use crate::audit::{AuditLedger, LedgerVerification};
use crate::backup::BackupManifest;
use crate::integrity_alert;
use crate::utils::FiscalResult;

const CHUNK_SIZE: usize = 64 * 1024;

/// 备份校验结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupVerification {
    pub file_name: String,
    pub valid: bool,
    /// 失败原因（valid 时为 None）
    pub reason: Option<String>,
    pub expected_checksum: Option<String>,
    pub actual_checksum: Option<String>,
}

impl BackupVerification {
    fn invalid(file_name: &str, reason: impl Into<String>) -> Self {
        Self {
            file_name: file_name.to_string(),
            valid: false,
            reason: Some(reason.into()),
            expected_checksum: None,
            actual_checksum: None,
        }
    }
}

#[derive(Clone)]
pub struct IntegrityVerifier {
    manifest: BackupManifest,
    ledger: AuditLedger,
}

impl IntegrityVerifier {
    pub fn new(manifest: BackupManifest, ledger: AuditLedger) -> Self {
        Self { manifest, ledger }
    }

    /// 校验备份目录中的快照文件
    pub async fn verify_backup(&self, file_name: &str) -> BackupVerification {
        self.verify_file(file_name, &self.manifest.dir().join(file_name))
            .await
    }

    /// Verify an arbitrary file (e.g. a staged copy) against the manifest entry for `file_name`
    pub async fn verify_file(&self, file_name: &str, path: &Path) -> BackupVerification {
        let entry = match self.manifest.find(file_name).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return BackupVerification::invalid(file_name, "no manifest entry"),
            Err(e) => {
                return BackupVerification::invalid(file_name, format!("manifest unreadable: {e}"));
            }
        };

        let (actual, size) = match file_checksum(path).await {
            Ok(result) => result,
            Err(e) => return BackupVerification::invalid(file_name, format!("read error: {e}")),
        };

        let reason = if size != entry.size_bytes {
            Some(format!(
                "size mismatch: expected {} bytes, found {size}",
                entry.size_bytes
            ))
        } else if actual != entry.checksum {
            Some("checksum mismatch".to_string())
        } else {
            None
        };

        if let Some(reason) = &reason {
            integrity_alert!(
                "backup_invalid",
                file = %file_name,
                reason = %reason,
                expected = %entry.checksum,
                actual = %actual
            );
        }

        BackupVerification {
            file_name: file_name.to_string(),
            valid: reason.is_none(),
            reason,
            expected_checksum: Some(entry.checksum),
            actual_checksum: Some(actual),
        }
    }

    /// 全量账本校验，不完整时告警
    pub async fn verify_ledger(&self) -> FiscalResult<LedgerVerification> {
        let report = self.ledger.verify_all().await?;
        if report.intact {
            tracing::info!(
                total = report.total,
                verified = report.verified,
                "Ledger verification passed"
            );
        } else {
            integrity_alert!(
                "ledger_not_intact",
                total = report.total,
                altered = report.altered,
                altered_entries = ?report.altered_entries,
                chain_breaks = report.chain_breaks.len(),
                head_matches = report.head_matches
            );
        }
        Ok(report)
    }
}

/// Streaming SHA-256 of a file: `(lowercase hex, size in bytes)`
pub async fn file_checksum(path: &Path) -> std::io::Result<(String, u64)> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut size = 0u64;
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }
    Ok((hex::encode(hasher.finalize()), size))
}
