//! Logging Infrastructure
//!
//! Structured logging setup for development and production:
//! - Daily rotating application logs (deleted after 14 days)
//! - Permanent integrity logs (never deleted): every ledger or backup
//!   verification failure is written with `target: "integrity"`

use std::fs;
use std::path::{Path, PathBuf};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, prelude::*};

/// Log target reserved for integrity alerts
pub const INTEGRITY_TARGET: &str = "integrity";

/// Application log retention in days
const APP_LOG_RETENTION_DAYS: i64 = 14;

/// Clean up old application log files
///
/// Only `app/app.YYYY-MM-DD` files are considered; the integrity channel is kept forever.
pub fn cleanup_old_logs(log_dir: &Path) -> anyhow::Result<()> {
    let cutoff = chrono::Utc::now().date_naive() - chrono::Duration::days(APP_LOG_RETENTION_DAYS);

    let app_log_dir = log_dir.join("app");
    if !app_log_dir.exists() {
        return Ok(());
    }

    for entry in fs::read_dir(app_log_dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };

        // RollingFileAppender names files `app.YYYY-MM-DD`
        if let Some(date_part) = name.strip_prefix("app.")
            && let Ok(date) = chrono::NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
            && date < cutoff
        {
            fs::remove_file(&path)?;
            tracing::info!(file = %name, "Deleted old log file");
        }
    }

    Ok(())
}

/// Initialize the logging system with daily rotating logs
///
/// # Arguments
/// * `level` - Log level (e.g., "info", "debug", "warn")
/// * `json_format` - JSON output (production) or human-readable (development)
/// * `log_dir` - Optional directory for file logging
pub fn init_logger_with_file(
    level: &str,
    json_format: bool,
    log_dir: Option<&str>,
) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = tracing_subscriber::registry().with(env_filter);

    let console_layer = if json_format {
        fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    };

    let Some(dir) = log_dir else {
        subscriber.with(console_layer).try_init()?;
        return Ok(());
    };

    let log_dir = Path::new(dir);
    let app_log_dir = log_dir.join("app");
    let integrity_log_dir = log_dir.join(INTEGRITY_TARGET);
    fs::create_dir_all(&app_log_dir)?;
    fs::create_dir_all(&integrity_log_dir)?;

    // Application logs: everything except the integrity channel
    let app_log = RollingFileAppender::new(Rotation::DAILY, app_log_dir, "app");
    let app_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_current_span(true)
        .with_thread_ids(true)
        .with_writer(std::sync::Mutex::new(app_log))
        .with_filter(tracing_subscriber::filter::filter_fn(|meta| {
            meta.target() != INTEGRITY_TARGET
        }));

    // Integrity alerts: permanent
    let integrity_log = RollingFileAppender::new(Rotation::DAILY, integrity_log_dir, "integrity");
    let integrity_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_current_span(true)
        .with_writer(std::sync::Mutex::new(integrity_log))
        .with_filter(tracing_subscriber::filter::filter_fn(|meta| {
            meta.target() == INTEGRITY_TARGET
        }));

    subscriber
        .with(console_layer)
        .with(app_layer)
        .with(integrity_layer)
        .try_init()?;

    if tokio::runtime::Handle::try_current().is_ok() {
        tokio::spawn(periodic_cleanup(log_dir.to_path_buf()));
    }

    Ok(())
}

/// Periodic cleanup task - runs every hour to clean old logs
async fn periodic_cleanup(log_dir: PathBuf) {
    use tokio::time::{Duration, sleep};

    loop {
        sleep(Duration::from_secs(3600)).await;

        if let Err(e) = cleanup_old_logs(&log_dir) {
            tracing::error!(error = %e, "Failed to cleanup old logs");
        }
    }
}

/// Initialize the logging system (console only)
pub fn init_logger(level: &str, json_format: bool) -> anyhow::Result<()> {
    init_logger_with_file(level, json_format, None)
}

/// Integrity alert helper
///
/// Writes to the permanent integrity channel.
///
/// ```ignore
/// integrity_alert!("ledger_altered", altered = 2, total = 310);
/// ```
#[macro_export]
macro_rules! integrity_alert {
    ($event:expr, $($arg:tt)*) => {
        tracing::error!(
            target: "integrity",
            event = $event,
            timestamp = %::shared::util::now_iso8601(),
            $($arg)*
        );
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cleanup_removes_only_old_app_logs() {
        let dir = tempfile::tempdir().unwrap();
        let app = dir.path().join("app");
        let integrity = dir.path().join("integrity");
        fs::create_dir_all(&app).unwrap();
        fs::create_dir_all(&integrity).unwrap();

        let old = app.join("app.2001-01-01");
        let today = app.join(format!("app.{}", chrono::Utc::now().format("%Y-%m-%d")));
        let unrelated = app.join("notes.txt");
        let kept_alert = integrity.join("integrity.2001-01-01");
        for p in [&old, &today, &unrelated, &kept_alert] {
            fs::write(p, b"x").unwrap();
        }

        cleanup_old_logs(dir.path()).unwrap();

        assert!(!old.exists());
        assert!(today.exists());
        assert!(unrelated.exists());
        assert!(kept_alert.exists());
    }
}
