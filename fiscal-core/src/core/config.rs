use std::path::PathBuf;
use std::time::Duration;

use crate::backup::RetentionPolicy;
use crate::sequence::RetryPolicy;

/// 财务核心配置
///
/// # 环境变量
///
/// 所有配置项都可以通过环境变量覆盖（`.env` 由 dotenv 加载）：
///
/// | 环境变量 | 默认值 | 说明 |
/// |----------|--------|------|
/// | WORK_DIR | /var/lib/fiscal | 工作目录 |
/// | DATABASE_PATH | {WORK_DIR}/fiscal.db | SQLite 数据库文件 |
/// | BACKUP_DIR | {WORK_DIR}/backups | 备份目录 |
/// | BACKUP_RETENTION_COUNT | 14 | 保留的最新备份数量 |
/// | BACKUP_RETENTION_DAYS | (无) | 备份最长保留天数 |
/// | BACKUP_INTERVAL_HOURS | 24 | 定时备份间隔（小时，0 关闭） |
/// | VERIFY_INTERVAL_MINUTES | 60 | 账本校验间隔（分钟，0 关闭） |
/// | SEQUENCE_MAX_RETRIES | 5 | 编号分配最大尝试次数 |
/// | SEQUENCE_RETRY_BASE_MS | 20 | 编号分配退避基数（毫秒） |
/// | LOG_LEVEL | info | 日志级别 |
/// | LOG_JSON | false | JSON 日志输出 |
/// | ENVIRONMENT | development | 运行环境 |
///
/// # 示例
///
/// ```ignore
/// WORK_DIR=/data/fiscal BACKUP_RETENTION_DAYS=90 fiscal-maint daemon
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// 工作目录，存放数据库、备份和日志
    pub work_dir: PathBuf,
    pub database_path: PathBuf,
    pub backup_dir: PathBuf,
    pub backup_retention_count: usize,
    pub backup_retention_days: Option<u32>,
    /// 0 = 不做定时备份
    pub backup_interval_hours: u64,
    /// 0 = 不做定时校验
    pub verify_interval_minutes: u64,
    pub sequence_max_retries: u32,
    pub sequence_retry_base_ms: u64,
    pub log_level: String,
    pub log_json: bool,
    /// 运行环境: development | staging | production
    pub environment: String,
}

impl Config {
    /// 从环境变量加载配置
    ///
    /// 如果环境变量未设置，使用默认值
    pub fn from_env() -> Self {
        let work_dir: PathBuf = std::env::var("WORK_DIR")
            .unwrap_or_else(|_| "/var/lib/fiscal".into())
            .into();
        Self::from_env_in(work_dir)
    }

    /// 以指定工作目录加载配置（其余项仍读环境变量）
    ///
    /// 常用于测试场景
    pub fn from_env_in(work_dir: impl Into<PathBuf>) -> Self {
        let work_dir = work_dir.into();
        Self {
            database_path: std::env::var("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| work_dir.join("fiscal.db")),
            backup_dir: std::env::var("BACKUP_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| work_dir.join("backups")),
            backup_retention_count: env_parse("BACKUP_RETENTION_COUNT").unwrap_or(14),
            backup_retention_days: env_parse("BACKUP_RETENTION_DAYS"),
            backup_interval_hours: env_parse("BACKUP_INTERVAL_HOURS").unwrap_or(24),
            verify_interval_minutes: env_parse("VERIFY_INTERVAL_MINUTES").unwrap_or(60),
            sequence_max_retries: env_parse("SEQUENCE_MAX_RETRIES").unwrap_or(5),
            sequence_retry_base_ms: env_parse("SEQUENCE_RETRY_BASE_MS").unwrap_or(20),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            log_json: env_parse("LOG_JSON").unwrap_or(false),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),
            work_dir,
        }
    }

    pub fn log_dir(&self) -> PathBuf {
        self.work_dir.join("logs")
    }

    pub fn retention_policy(&self) -> RetentionPolicy {
        RetentionPolicy::new(self.backup_retention_count, self.backup_retention_days)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.sequence_max_retries.max(1),
            base_delay: Duration::from_millis(self.sequence_retry_base_ms),
            ..RetryPolicy::default()
        }
    }

    /// `None` = 定时备份关闭
    pub fn backup_interval(&self) -> Option<Duration> {
        (self.backup_interval_hours > 0).then(|| Duration::from_secs(self.backup_interval_hours * 3600))
    }

    /// `None` = 定时校验关闭
    pub fn verify_interval(&self) -> Option<Duration> {
        (self.verify_interval_minutes > 0).then(|| Duration::from_secs(self.verify_interval_minutes * 60))
    }

    /// 是否生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
