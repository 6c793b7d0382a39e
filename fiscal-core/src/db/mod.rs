//! Database Module
//!
//! Handles the SQLite connection pool and migrations. Every component takes
//! the pool in its constructor; [`DbService`] is owned by the composing
//! application.

use crate::utils::{FiscalError, FiscalResult};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;
use std::time::Duration;

/// 写冲突等待时间
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Database service - owns a SQLite connection pool
#[derive(Clone)]
pub struct DbService {
    pub pool: SqlitePool,
}

impl DbService {
    /// Open (or create) the store at `db_path` with WAL mode and run migrations
    pub async fn open(db_path: impl AsRef<Path>) -> FiscalResult<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            // busy_timeout: 写冲突时等待 5s 而非立即失败
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await
            .map_err(|e| FiscalError::storage(format!("Failed to open database: {e}")))?;

        tracing::info!(
            path = %db_path.display(),
            "Database connection established (SQLite WAL, busy_timeout=5000ms)"
        );

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Wrap an existing pool (the caller is responsible for its settings)
    pub async fn from_pool(pool: SqlitePool) -> FiscalResult<Self> {
        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    async fn migrate(&self) -> FiscalResult<()> {
        sqlx::migrate!("./migrations")
            .set_ignore_missing(true)
            .run(&self.pool)
            .await?;
        tracing::info!("Database migrations applied");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Busy/locked result codes (SQLITE_BUSY, SQLITE_LOCKED and their extended forms)
const BUSY_CODES: &[&str] = &["5", "6", "261", "262", "517"];

/// Whether a store error is a transient write-write conflict
pub(crate) fn is_busy(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Database(db) => {
            db.code().is_some_and(|c| BUSY_CODES.contains(&c.as_ref()))
                || db.message().contains("database is locked")
        }
        _ => false,
    }
}

/// Whether a store error is a UNIQUE constraint violation
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}
