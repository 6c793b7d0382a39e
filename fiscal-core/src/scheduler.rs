//! 维护调度器
//!
//! 启动时补做：账本校验一次；若最近一次备份早于备份间隔则立即备份。
//! 运行期间按配置间隔周期触发，收到 shutdown 信号即退出。
//!
//! 校验失败只告警，不影响正常业务。

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::backup::BackupCoordinator;
use crate::core::{BackgroundTasks, TaskKind};
use crate::integrity::IntegrityVerifier;

#[derive(Clone)]
pub struct MaintenanceScheduler {
    verifier: IntegrityVerifier,
    backups: BackupCoordinator,
    verify_interval: Option<Duration>,
    backup_interval: Option<Duration>,
}

impl MaintenanceScheduler {
    pub fn new(
        verifier: IntegrityVerifier,
        backups: BackupCoordinator,
        verify_interval: Option<Duration>,
        backup_interval: Option<Duration>,
    ) -> Self {
        Self {
            verifier,
            backups,
            verify_interval,
            backup_interval,
        }
    }

    /// 注册为 `TaskKind::Periodic`（间隔为 None 的任务不注册）
    pub fn register(self, tasks: &mut BackgroundTasks) {
        if let Some(interval) = self.verify_interval {
            let this = self.clone();
            let shutdown = tasks.shutdown_token();
            tasks.spawn("ledger_verify", TaskKind::Periodic, async move {
                this.verify_loop(interval, shutdown).await;
            });
        }
        if let Some(interval) = self.backup_interval {
            let shutdown = tasks.shutdown_token();
            tasks.spawn("backup", TaskKind::Periodic, async move {
                self.backup_loop(interval, shutdown).await;
            });
        }
    }

    /// 账本校验循环：启动补扫 → 周期触发
    async fn verify_loop(&self, interval: Duration, shutdown: CancellationToken) {
        tracing::info!(interval_secs = interval.as_secs(), "Ledger verify scheduler started");
        loop {
            self.verify_once().await;
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
        tracing::info!("Ledger verify scheduler stopped");
    }

    /// 备份循环：最近备份过旧则先补做
    async fn backup_loop(&self, interval: Duration, shutdown: CancellationToken) {
        tracing::info!(interval_secs = interval.as_secs(), "Backup scheduler started");

        let mut wait = self.catch_up_delay(interval).await;
        loop {
            if !wait.is_zero() {
                tracing::debug!(wait_secs = wait.as_secs(), "Next backup scheduled");
            }
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
            // 取消时丢弃未完成的备份（临时文件由 guard 清理）
            tokio::select! {
                _ = shutdown.cancelled() => break,
                result = self.backups.run_backup() => {
                    if let Err(e) = result {
                        tracing::error!(error = %e, "Scheduled backup failed");
                    }
                }
            }
            wait = interval;
        }
        tracing::info!("Backup scheduler stopped");
    }

    pub async fn verify_once(&self) {
        match self.verifier.verify_ledger().await {
            Ok(report) if !report.intact => {
                tracing::warn!(
                    total = report.total,
                    altered = report.altered,
                    chain_breaks = report.chain_breaks.len(),
                    head_matches = report.head_matches,
                    "Scheduled ledger verification found issues"
                );
            }
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "Scheduled ledger verification failed"),
        }
    }

    /// 距下一次备份的等待时间（0 = 立即）
    async fn catch_up_delay(&self, interval: Duration) -> Duration {
        let newest = match self.backups.list_backups().await {
            Ok(entries) => entries.into_iter().next(),
            Err(e) => {
                tracing::warn!(error = %e, "Cannot read backup manifest, backing up now");
                None
            }
        };
        let last = newest.and_then(|e| DateTime::parse_from_rfc3339(&e.created_at).ok());
        match last {
            Some(last) => next_delay(last.with_timezone(&Utc), Utc::now(), interval),
            None => Duration::ZERO,
        }
    }
}

fn next_delay(last: DateTime<Utc>, now: DateTime<Utc>, interval: Duration) -> Duration {
    let elapsed = (now - last).to_std().unwrap_or(Duration::ZERO);
    interval.saturating_sub(elapsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_next_delay() {
        let last = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let day = Duration::from_secs(86_400);

        let now = Utc.with_ymd_and_hms(2025, 1, 1, 6, 0, 0).unwrap();
        assert_eq!(next_delay(last, now, day), Duration::from_secs(18 * 3600));

        let overdue = Utc.with_ymd_and_hms(2025, 1, 3, 0, 0, 0).unwrap();
        assert_eq!(next_delay(last, overdue, day), Duration::ZERO);

        // Clock went backwards
        let before = Utc.with_ymd_and_hms(2024, 12, 31, 0, 0, 0).unwrap();
        assert_eq!(next_delay(last, before, day), day);
    }
}
