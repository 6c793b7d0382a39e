//! 备份清单 `manifest.json`
//!
//! JSON list of [`ManifestEntry`] beside the snapshot files. Every write goes
//! to a temp file first and is renamed over the old manifest.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use shared::models::ManifestEntry;
use tokio::io::AsyncWriteExt;

use crate::utils::FiscalResult;

pub const MANIFEST_FILE: &str = "manifest.json";
const MANIFEST_TMP: &str = ".manifest.json.tmp";

#[derive(Clone)]
pub struct BackupManifest {
    dir: PathBuf,
    /// 串行化清单的读-改-写
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl BackupManifest {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(MANIFEST_FILE)
    }

    /// All entries, oldest first (empty when no manifest exists yet)
    pub async fn entries(&self) -> FiscalResult<Vec<ManifestEntry>> {
        read_entries(&self.path()).await
    }

    pub async fn find(&self, file_name: &str) -> FiscalResult<Option<ManifestEntry>> {
        Ok(self
            .entries()
            .await?
            .into_iter()
            .find(|e| e.file_name == file_name))
    }

    pub async fn append(&self, entry: ManifestEntry) -> FiscalResult<()> {
        let _guard = self.lock.lock().await;
        let mut entries = read_entries(&self.path()).await?;
        entries.retain(|e| e.file_name != entry.file_name);
        entries.push(entry);
        self.write_entries(&entries).await
    }

    /// Drop entries by file name; returns how many were removed
    pub async fn remove(&self, file_names: &[String]) -> FiscalResult<usize> {
        let _guard = self.lock.lock().await;
        let mut entries = read_entries(&self.path()).await?;
        let before = entries.len();
        entries.retain(|e| !file_names.contains(&e.file_name));
        let removed = before - entries.len();
        if removed > 0 {
            self.write_entries(&entries).await?;
        }
        Ok(removed)
    }

    async fn write_entries(&self, entries: &[ManifestEntry]) -> FiscalResult<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let tmp = self.dir.join(MANIFEST_TMP);
        let json = serde_json::to_vec_pretty(entries)?;

        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&json).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp, self.path()).await?;
        Ok(())
    }
}

async fn read_entries(path: &Path) -> FiscalResult<Vec<ManifestEntry>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}
