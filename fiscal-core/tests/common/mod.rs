//! 集成测试公共工具：临时工作目录 + 真实 SQLite 文件

#![allow(dead_code)]

use fiscal_core::{Config, FiscalCore};
use rust_decimal::Decimal;
use shared::models::{InvoiceState, ProformaState, RecordState};
use tempfile::TempDir;

pub const TELWAGEN_ID: i64 = 1;

pub struct TestEnv {
    /// 保持目录存活
    pub dir: TempDir,
    pub config: Config,
    pub core: FiscalCore,
}

pub async fn setup() -> TestEnv {
    setup_with(|_| {}).await
}

pub async fn setup_with(adjust: impl FnOnce(&mut Config)) -> TestEnv {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::from_env_in(dir.path());
    config.database_path = dir.path().join("fiscal.db");
    config.backup_dir = dir.path().join("backups");
    config.backup_retention_count = 14;
    config.backup_retention_days = None;
    config.sequence_max_retries = 20;
    config.sequence_retry_base_ms = 5;
    adjust(&mut config);

    let core = FiscalCore::open(&config).await.unwrap();
    sqlx::query("INSERT INTO companies (id, name, cif, address) VALUES (?, ?, ?, ?)")
        .bind(TELWAGEN_ID)
        .bind("Telwagen Car Ibérica S.L.")
        .bind("B35000000")
        .bind("Calle Sin Token 1, Telde")
        .execute(&core.db.pool)
        .await
        .unwrap();

    TestEnv { dir, config, core }
}

pub fn proforma(id: i64, numero: &str) -> RecordState {
    RecordState::Proforma(ProformaState {
        id,
        numero_proforma: numero.to_string(),
        empresa_id: TELWAGEN_ID,
        cliente_id: 10,
        coche_id: Some(20),
        fecha_emision: "2025-03-14".to_string(),
        fecha_validez: Some("2025-04-14".to_string()),
        subtotal: Decimal::new(1_000_000, 2),
        igic: Decimal::new(70_000, 2),
        total: Decimal::new(1_070_000, 2),
        estado: "pendiente".to_string(),
    })
}

pub fn invoice(id: i64, numero: &str) -> InvoiceState {
    InvoiceState {
        id,
        numero_factura: numero.to_string(),
        numero_serie: "F".to_string(),
        empresa_id: TELWAGEN_ID,
        empresa_cif: "B35000000".to_string(),
        cliente_id: 10,
        cliente_identificacion: "12345678Z".to_string(),
        coche_id: Some(20),
        fecha_emision: "2025-03-14".to_string(),
        subtotal: Decimal::new(1_000_000, 2),
        igic: Decimal::new(70_000, 2),
        total: Decimal::new(1_070_000, 2),
        estado: "emitida".to_string(),
        emitida_en: "2025-03-14T09:26:53.589Z".to_string(),
    }
}

pub async fn ledger_rows(env: &TestEnv) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM audit_ledger")
        .fetch_one(&env.core.db.pool)
        .await
        .unwrap()
}
