//! Fiscal Core - 汽车经销商财务单据完整性与编号子系统
//!
//! # 架构概述
//!
//! 发票/形式发票服务通过本 crate 完成单据创建中与税务相关的部分：
//!
//! - **内容哈希** (`hash`): 规范化 JSON + SHA-256
//! - **时间戳封印** (`seal`): 单据哈希与时间绑定
//! - **审计账本** (`audit`): 哈希链、只追加的操作记录
//! - **单据编号** (`sequence`): 公司/类型/年度范围内唯一递增编号
//! - **完整性校验** (`integrity`): 账本与备份文件校验
//! - **备份** (`backup`): 快照、恢复、保留策略
//! - **VeriFactu** (`verifactu`): 提交码生成
//!
//! # 模块结构
//!
//! ```text
//! fiscal-core/src/
//! ├── core/          # 配置、组件装配、后台任务
//! ├── db/            # SQLite 连接池与迁移
//! ├── utils/         # 错误、日志
//! ├── hash/ seal/ audit/ sequence/
//! ├── integrity/ backup/ verifactu/
//! ├── documents/     # 单据创建流程
//! └── scheduler.rs   # 定时校验与备份
//! ```

pub mod audit;
pub mod backup;
pub mod core;
pub mod db;
pub mod documents;
pub mod hash;
pub mod integrity;
pub mod scheduler;
pub mod seal;
pub mod sequence;
pub mod utils;
pub mod verifactu;

// Re-export 公共类型
pub use audit::{AuditLedger, LedgerVerification, NewOperation};
pub use backup::{BackupCoordinator, RetentionPolicy};
pub use core::{BackgroundTasks, Config, FiscalCore, TaskKind};
pub use db::DbService;
pub use documents::{FiscalDocumentService, IssueRequest, IssuedDocument};
pub use integrity::{BackupVerification, IntegrityVerifier};
pub use scheduler::MaintenanceScheduler;
pub use seal::SealingService;
pub use sequence::{AllocatedNumber, SequenceAllocator};
pub use utils::{FiscalError, FiscalResult};
pub use verifactu::{VeriFactuCodeGenerator, VeriFactuInput};

// Re-export shared error types
pub use shared::{ErrorCategory, ErrorCode};

// Re-export logger functions
pub use utils::logger::{cleanup_old_logs, init_logger, init_logger_with_file};

/// 设置运行环境：加载 `.env`、读取配置、创建工作目录、初始化日志
pub fn setup_environment() -> anyhow::Result<Config> {
    dotenv::dotenv().ok();
    let config = Config::from_env();

    std::fs::create_dir_all(&config.work_dir)?;
    let log_dir = config.log_dir();
    init_logger_with_file(
        &config.log_level,
        config.log_json,
        log_dir.to_str(),
    )?;

    Ok(config)
}
