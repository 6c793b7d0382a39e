//! 公司资料查询
//!
//! The `companies` table belongs to the invoicing service; the allocator only
//! needs name and address to build prefixes.

use async_trait::async_trait;
use serde::Serialize;
use sqlx::SqlitePool;

use crate::utils::FiscalResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct CompanyProfile {
    pub id: i64,
    pub name: String,
    pub cif: String,
    pub address: String,
}

/// Company lookup used by the sequence allocator
#[async_trait]
pub trait CompanyDirectory: Send + Sync {
    async fn find(&self, company_id: i64) -> FiscalResult<Option<CompanyProfile>>;
}

/// Reads the shared `companies` table
#[derive(Clone)]
pub struct SqliteCompanyDirectory {
    pool: SqlitePool,
}

impl SqliteCompanyDirectory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CompanyDirectory for SqliteCompanyDirectory {
    async fn find(&self, company_id: i64) -> FiscalResult<Option<CompanyProfile>> {
        let company = sqlx::query_as::<_, CompanyProfile>(
            "SELECT id, name, cif, address FROM companies WHERE id = ?",
        )
        .bind(company_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(company)
    }
}
