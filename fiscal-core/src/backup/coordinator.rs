//! 备份与恢复
//!
//! # 备份流程
//!
//! ```text
//! VACUUM INTO .{name}.tmp → fsync → SHA-256 → rename {name} → manifest.json → retention
//! ```
//!
//! `VACUUM INTO` reads one consistent snapshot, so writers are never blocked.
//! A cancelled or failed run leaves only a hidden temp file, removed on the
//! next run; nothing appears in the manifest.
//!
//! # 恢复流程
//!
//! 校验 → 暂存副本再校验 → ATTACH → 单个写事务内逐表替换 → DETACH。
//! 校验失败时不触碰在线数据库。恢复期间持有写锁（维护窗口）。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use shared::models::ManifestEntry;
use shared::util::to_iso8601;
use sqlx::{Connection, SqliteConnection, SqlitePool};

use super::manifest::BackupManifest;
use super::retention::RetentionPolicy;
use crate::integrity::{IntegrityVerifier, file_checksum};
use crate::utils::{FiscalError, FiscalResult};

const SNAPSHOT_PREFIX: &str = "fiscal-";
const SNAPSHOT_EXT: &str = "db";
const TMP_SUFFIX: &str = ".tmp";
const RESTORE_ALIAS: &str = "restore_src";

/// Tables the core never copies on restore
const SKIPPED_TABLES: &[&str] = &["_sqlx_migrations"];

#[derive(Clone)]
pub struct BackupCoordinator {
    pool: SqlitePool,
    manifest: BackupManifest,
    verifier: IntegrityVerifier,
    retention: RetentionPolicy,
    /// 备份与恢复互斥
    run_lock: Arc<tokio::sync::Mutex<()>>,
}

impl BackupCoordinator {
    pub fn new(
        pool: SqlitePool,
        manifest: BackupManifest,
        verifier: IntegrityVerifier,
        retention: RetentionPolicy,
    ) -> Self {
        Self {
            pool,
            manifest,
            verifier,
            retention,
            run_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn backup_dir(&self) -> &Path {
        self.manifest.dir()
    }

    /// 执行一次备份
    pub async fn run_backup(&self) -> FiscalResult<ManifestEntry> {
        let _guard = self.run_lock.lock().await;
        let dir = self.backup_dir().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        self.clean_stale_files().await;

        let created = Utc::now();
        let file_name = self.unique_name(created).await?;
        let final_path = dir.join(&file_name);
        let tmp = TempFile::new(dir.join(format!(".{file_name}{TMP_SUFFIX}")));

        let entry = match self.snapshot(&tmp, &final_path, &file_name, created).await {
            Ok(entry) => entry,
            Err(e) => {
                tracing::error!(file = %file_name, error = %e, "Backup failed");
                return Err(e);
            }
        };

        self.manifest.append(entry.clone()).await?;
        tracing::info!(
            file = %entry.file_name,
            size_bytes = entry.size_bytes,
            checksum = %entry.checksum,
            "Backup completed"
        );

        if let Err(e) = self.apply_retention_locked().await {
            // 备份本身已成功，保留策略失败只记录
            tracing::warn!(error = %e, "Backup retention failed");
        }

        Ok(entry)
    }

    async fn snapshot(
        &self,
        tmp: &TempFile,
        final_path: &Path,
        file_name: &str,
        created: DateTime<Utc>,
    ) -> FiscalResult<ManifestEntry> {
        let tmp_path = tmp
            .path()
            .to_str()
            .ok_or_else(|| FiscalError::backup("backup path is not valid UTF-8"))?
            .to_string();

        sqlx::query("VACUUM INTO ?")
            .bind(tmp_path)
            .execute(&self.pool)
            .await
            .map_err(|e| FiscalError::backup(format!("snapshot failed: {e}")))?;

        tokio::fs::File::open(tmp.path()).await?.sync_all().await?;
        let (checksum, size_bytes) = file_checksum(tmp.path()).await?;

        tokio::fs::rename(tmp.path(), final_path).await?;
        tmp.disarm();

        Ok(ManifestEntry {
            file_name: file_name.to_string(),
            created_at: to_iso8601(created),
            checksum,
            size_bytes,
        })
    }

    /// `fiscal-YYYYMMDDTHHMMSSmmmZ.db`, suffixed when the name is taken
    async fn unique_name(&self, created: DateTime<Utc>) -> FiscalResult<String> {
        let stem = format!("{SNAPSHOT_PREFIX}{}", created.format("%Y%m%dT%H%M%S%3fZ"));
        let known = self.manifest.entries().await?;
        let taken = |name: &str| {
            known.iter().any(|e| e.file_name == name) || self.backup_dir().join(name).exists()
        };

        let mut name = format!("{stem}.{SNAPSHOT_EXT}");
        let mut n = 1;
        while taken(&name) {
            name = format!("{stem}-{n}.{SNAPSHOT_EXT}");
            n += 1;
        }
        Ok(name)
    }

    /// Remove temp files and unlisted snapshots left by cancelled runs
    ///
    /// Only called under `run_lock`, so no snapshot is in flight.
    async fn clean_stale_files(&self) {
        let listed: Option<Vec<String>> = match self.manifest.entries().await {
            Ok(entries) => Some(entries.into_iter().map(|e| e.file_name).collect()),
            Err(e) => {
                tracing::warn!(error = %e, "Manifest unreadable, keeping unlisted snapshots");
                None
            }
        };
        let Ok(mut dir) = tokio::fs::read_dir(self.backup_dir()).await else {
            return;
        };
        while let Ok(Some(entry)) = dir.next_entry().await {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let stale_tmp = name.ends_with(TMP_SUFFIX)
                && (name.starts_with(&format!(".{SNAPSHOT_PREFIX}"))
                    || name.starts_with(".restore-"));
            let orphan = listed.as_ref().is_some_and(|listed| {
                is_snapshot_name(name) && !listed.iter().any(|l| l == name)
            });
            if !(stale_tmp || orphan) {
                continue;
            }
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) if orphan => tracing::warn!(file = %name, "Removed snapshot missing from manifest"),
                Ok(()) => {}
                Err(e) => tracing::warn!(file = %name, error = %e, "Failed to remove stale backup file"),
            }
        }
    }

    /// 从备份恢复
    ///
    /// Fails with `Integrity` when the backup (or its staged copy) does not
    /// match the manifest; the live store is left untouched in that case.
    pub async fn restore(&self, file_name: &str) -> FiscalResult<()> {
        validate_file_name(file_name)?;
        let _guard = self.run_lock.lock().await;

        let check = self.verifier.verify_backup(file_name).await;
        if !check.valid {
            let reason = check.reason.unwrap_or_default();
            tracing::error!(file = %file_name, reason = %reason, "Restore rejected");
            return Err(FiscalError::integrity(format!("{file_name}: {reason}")));
        }

        let staged = TempFile::new(
            self.backup_dir()
                .join(format!(".restore-{file_name}{TMP_SUFFIX}")),
        );
        tokio::fs::copy(self.backup_dir().join(file_name), staged.path()).await?;

        let staged_check = self.verifier.verify_file(file_name, staged.path()).await;
        if !staged_check.valid {
            let reason = staged_check.reason.unwrap_or_default();
            tracing::error!(file = %file_name, reason = %reason, "Staged restore copy rejected");
            return Err(FiscalError::integrity(format!(
                "{file_name} (staged copy): {reason}"
            )));
        }

        tracing::warn!(file = %file_name, "Restoring store from backup");
        match self.replace_tables(staged.path()).await {
            Ok(tables) => {
                tracing::info!(file = %file_name, tables, "Restore completed");
                Ok(())
            }
            Err(e) => {
                tracing::error!(file = %file_name, error = %e, "Restore failed");
                Err(match e {
                    FiscalError::Integrity(_) => e,
                    other => FiscalError::Restore(format!("{file_name}: {other}")),
                })
            }
        }
    }

    async fn replace_tables(&self, staged: &Path) -> FiscalResult<usize> {
        let staged = staged
            .to_str()
            .ok_or_else(|| FiscalError::backup("restore path is not valid UTF-8"))?;

        let mut conn = self.pool.acquire().await?;
        sqlx::query(&format!("ATTACH DATABASE ? AS {RESTORE_ALIAS}"))
            .bind(staged)
            .execute(&mut *conn)
            .await
            .map_err(|e| FiscalError::backup(format!("cannot attach backup: {e}")))?;

        let copied = copy_attached(&mut conn).await;

        // DETACH 无论成功与否都要执行
        if let Err(e) = sqlx::query(&format!("DETACH DATABASE {RESTORE_ALIAS}"))
            .execute(&mut *conn)
            .await
        {
            tracing::warn!(error = %e, "Failed to detach restore source");
        }

        copied
    }

    /// All backups, newest first
    pub async fn list_backups(&self) -> FiscalResult<Vec<ManifestEntry>> {
        let mut entries = self.manifest.entries().await?;
        // manifest 按追加顺序存储，同一毫秒内的备份以后追加者为新
        entries.reverse();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(entries)
    }

    /// 应用保留策略，返回被删除的文件名
    pub async fn apply_retention(&self) -> FiscalResult<Vec<String>> {
        let _guard = self.run_lock.lock().await;
        self.apply_retention_locked().await
    }

    async fn apply_retention_locked(&self) -> FiscalResult<Vec<String>> {
        let entries = self.manifest.entries().await?;
        let expired = self.retention.select_expired(&entries, Utc::now());
        if expired.is_empty() {
            return Ok(expired);
        }

        self.manifest.remove(&expired).await?;
        for name in &expired {
            match tokio::fs::remove_file(self.backup_dir().join(name)).await {
                Ok(()) => tracing::info!(file = %name, "Expired backup deleted"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(file = %name, error = %e, "Failed to delete expired backup"),
            }
        }
        Ok(expired)
    }
}

/// Replace every table of `main` with the attached copy inside one write transaction
async fn copy_attached(conn: &mut SqliteConnection) -> FiscalResult<usize> {
    let live = list_tables(conn, "main").await?;
    let source = list_tables(conn, RESTORE_ALIAS).await?;
    if live != source {
        return Err(FiscalError::integrity(format!(
            "backup schema differs: live {live:?}, backup {source:?}"
        )));
    }

    let mut tx = conn.begin().await?;
    for table in &live {
        let quoted = quote_ident(table);
        sqlx::query(&format!("DELETE FROM main.{quoted}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!(
            "INSERT INTO main.{quoted} SELECT * FROM {RESTORE_ALIAS}.{quoted}"
        ))
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(live.len())
}

async fn list_tables(conn: &mut SqliteConnection, schema: &str) -> FiscalResult<Vec<String>> {
    let mut tables: Vec<String> = sqlx::query_scalar(&format!(
        "SELECT name FROM {schema}.sqlite_master \
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name"
    ))
    .fetch_all(&mut *conn)
    .await?;
    tables.retain(|t| !SKIPPED_TABLES.contains(&t.as_str()));
    Ok(tables)
}

/// `fiscal-*.db` as produced by `unique_name`
fn is_snapshot_name(name: &str) -> bool {
    name.starts_with(SNAPSHOT_PREFIX) && name.ends_with(&format!(".{SNAPSHOT_EXT}"))
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Backup names are plain file names inside the backup directory
fn validate_file_name(file_name: &str) -> FiscalResult<()> {
    let plain = !file_name.is_empty()
        && !file_name.starts_with('.')
        && !file_name.contains(['/', '\\'])
        && file_name != "..";
    if plain {
        Ok(())
    } else {
        Err(FiscalError::validation(format!(
            "invalid backup file name: {file_name:?}"
        )))
    }
}

/// Temp file removed on drop unless disarmed (covers cancellation)
struct TempFile {
    path: PathBuf,
    armed: std::sync::atomic::AtomicBool,
}

impl TempFile {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            armed: std::sync::atomic::AtomicBool::new(true),
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn disarm(&self) {
        self.armed
            .store(false, std::sync::atomic::Ordering::Relaxed);
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if self.armed.load(std::sync::atomic::Ordering::Relaxed) {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_validation() {
        assert!(validate_file_name("fiscal-20250101T000000000Z.db").is_ok());
        assert!(validate_file_name("").is_err());
        assert!(validate_file_name("..").is_err());
        assert!(validate_file_name(".hidden.tmp").is_err());
        assert!(validate_file_name("../fiscal.db").is_err());
        assert!(validate_file_name("sub\\fiscal.db").is_err());
    }

    #[test]
    fn test_snapshot_names() {
        assert!(is_snapshot_name("fiscal-20250101T000000000Z.db"));
        assert!(is_snapshot_name("fiscal-20250101T000000000Z-2.db"));
        assert!(!is_snapshot_name(".fiscal-20250101T000000000Z.db.tmp"));
        assert!(!is_snapshot_name("manifest.json"));
        assert!(!is_snapshot_name("fiscal.db-wal"));
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("audit_ledger"), "\"audit_ledger\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_temp_file_removed_unless_disarmed() {
        let dir = tempfile::tempdir().unwrap();
        let removed = dir.path().join("a.tmp");
        let kept = dir.path().join("b.tmp");
        std::fs::write(&removed, b"x").unwrap();
        std::fs::write(&kept, b"x").unwrap();

        drop(TempFile::new(removed.clone()));
        let guard = TempFile::new(kept.clone());
        guard.disarm();
        drop(guard);

        assert!(!removed.exists());
        assert!(kept.exists());
    }
}
