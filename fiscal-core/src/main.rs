//! fiscal-maint - 财务核心维护工具
//!
//! ```text
//! fiscal-maint [daemon]        定时校验与备份，Ctrl+C 退出
//! fiscal-maint verify          校验审计账本与全部备份
//! fiscal-maint backup          立即备份
//! fiscal-maint restore <file>  从备份恢复（维护窗口）
//! fiscal-maint list-backups    列出备份
//! ```

use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, bail};
use fiscal_core::{BackgroundTasks, Config, FiscalCore, MaintenanceScheduler, setup_environment};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);
const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(60);

enum Command {
    Daemon,
    Verify,
    Backup,
    Restore(String),
    ListBackups,
}

impl Command {
    fn parse(mut args: impl Iterator<Item = String>) -> anyhow::Result<Self> {
        let command = match args.next().as_deref() {
            None | Some("daemon") => Command::Daemon,
            Some("verify") => Command::Verify,
            Some("backup") => Command::Backup,
            Some("restore") => Command::Restore(args.next().context("usage: fiscal-maint restore <file>")?),
            Some("list-backups") => Command::ListBackups,
            Some(other) => bail!("unknown command: {other}"),
        };
        Ok(command)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "fiscal-maint failed");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<ExitCode> {
    let command = Command::parse(std::env::args().skip(1))?;

    // 1. 设置环境 (dotenv, 工作目录, 日志)
    let config = setup_environment()?;
    tracing::info!(environment = %config.environment, "Fiscal core starting");

    // 2. 打开数据库并装配组件
    let core = FiscalCore::open(&config)
        .await
        .context("failed to open fiscal store")?;

    let code = match command {
        Command::Daemon => daemon(&config, &core).await?,
        Command::Verify => verify(&core).await?,
        Command::Backup => {
            let entry = core.backups.run_backup().await?;
            println!("{}", serde_json::to_string_pretty(&entry)?);
            ExitCode::SUCCESS
        }
        Command::Restore(file) => {
            core.backups.restore(&file).await?;
            println!("restored {file}");
            ExitCode::SUCCESS
        }
        Command::ListBackups => {
            let entries = core.backups.list_backups().await?;
            println!("{}", serde_json::to_string_pretty(&entries)?);
            ExitCode::SUCCESS
        }
    };

    core.db.close().await;
    Ok(code)
}

async fn daemon(config: &Config, core: &FiscalCore) -> anyhow::Result<ExitCode> {
    let mut tasks = BackgroundTasks::new();
    MaintenanceScheduler::new(
        core.verifier.clone(),
        core.backups.clone(),
        config.verify_interval(),
        config.backup_interval(),
    )
    .register(&mut tasks);
    tracing::info!(tasks = tasks.len(), "Maintenance daemon running");

    let mut health = tokio::time::interval(HEALTH_CHECK_INTERVAL);
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for shutdown signal")?;
                tracing::info!("Shutdown signal received");
                break;
            }
            _ = health.tick() => {
                tasks.check_health();
            }
        }
    }

    tasks.shutdown(SHUTDOWN_TIMEOUT).await;
    Ok(ExitCode::SUCCESS)
}

/// 账本 + 全部备份；任何一项不完整返回非零退出码
async fn verify(core: &FiscalCore) -> anyhow::Result<ExitCode> {
    let ledger = core.verifier.verify_ledger().await?;
    println!("{}", serde_json::to_string_pretty(&ledger)?);

    let mut all_valid = ledger.intact;
    for entry in core.backups.list_backups().await? {
        let result = core.verifier.verify_backup(&entry.file_name).await;
        all_valid &= result.valid;
        println!("{}", serde_json::to_string(&result)?);
    }

    Ok(if all_valid {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
