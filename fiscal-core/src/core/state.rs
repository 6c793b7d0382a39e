//! 组件装配
//!
//! [`FiscalCore`] builds every component from one [`DbService`]; cloning is
//! cheap (all components share the pool and their locks).

use std::sync::Arc;

use crate::audit::AuditLedger;
use crate::backup::{BackupCoordinator, BackupManifest};
use crate::core::Config;
use crate::db::DbService;
use crate::documents::FiscalDocumentService;
use crate::integrity::IntegrityVerifier;
use crate::seal::SealingService;
use crate::sequence::{CompanyDirectory, SequenceAllocator, SqliteCompanyDirectory};
use crate::utils::FiscalResult;
use crate::verifactu::VeriFactuCodeGenerator;

#[derive(Clone)]
pub struct FiscalCore {
    pub db: DbService,
    pub ledger: AuditLedger,
    pub sealing: SealingService,
    pub sequences: SequenceAllocator,
    pub verifier: IntegrityVerifier,
    pub backups: BackupCoordinator,
    pub verifactu: VeriFactuCodeGenerator,
    pub documents: FiscalDocumentService,
}

impl FiscalCore {
    /// Open the store named by `config` and assemble all components
    pub async fn open(config: &Config) -> FiscalResult<Self> {
        let db = DbService::open(&config.database_path).await?;
        Ok(Self::assemble(db, config))
    }

    /// Assemble on an already opened store
    pub fn assemble(db: DbService, config: &Config) -> Self {
        let companies: Arc<dyn CompanyDirectory> =
            Arc::new(SqliteCompanyDirectory::new(db.pool.clone()));

        let ledger = AuditLedger::new(db.pool.clone());
        let sealing = SealingService::new();
        let sequences =
            SequenceAllocator::with_retry(db.pool.clone(), companies, config.retry_policy());
        let manifest = BackupManifest::new(&config.backup_dir);
        let verifier = IntegrityVerifier::new(manifest.clone(), ledger.clone());
        let backups = BackupCoordinator::new(
            db.pool.clone(),
            manifest,
            verifier.clone(),
            config.retention_policy(),
        );
        let verifactu = VeriFactuCodeGenerator::new();
        let documents = FiscalDocumentService::new(
            sequences.clone(),
            sealing.clone(),
            ledger.clone(),
            verifactu,
        );

        Self {
            db,
            ledger,
            sealing,
            sequences,
            verifier,
            backups,
            verifactu,
            documents,
        }
    }
}
