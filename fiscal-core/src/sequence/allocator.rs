//! 单据编号分配器
//!
//! 每次分配在一个写事务内完成：
//!
//! 1. upsert 计数器行（写优先，立即取得写锁）
//! 2. 与已发号登记表中的最大号比较，取较大者 + 1
//! 3. 条件更新计数器（`WHERE last_number = ?`）
//! 4. 写入 `issued_numbers`（编号串与 (年度, 序号) 双重 UNIQUE 保证不重号）
//!
//! 冲突（UNIQUE 违反、数据库忙）按指数退避重试，超过上限返回 `ExhaustedRetries`。

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use shared::models::DocumentKind;
use shared::util::now_millis;
use sqlx::SqlitePool;

use super::company::CompanyDirectory;
use super::prefix::{document_prefix, format_number, parse_formatted};
use crate::db::{is_busy, is_unique_violation};
use crate::utils::{FiscalError, FiscalResult};

const MIN_YEAR: i32 = 2000;
const MAX_YEAR: i32 = 9999;

/// 分配结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocatedNumber {
    pub number: i64,
    /// e.g. `TCI-XX001/2025`
    pub formatted: String,
    pub prefix: String,
}

/// 冲突重试策略（指数退避）
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(20),
            max_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

#[derive(Clone)]
pub struct SequenceAllocator {
    pool: SqlitePool,
    companies: Arc<dyn CompanyDirectory>,
    retry: RetryPolicy,
}

impl SequenceAllocator {
    pub fn new(pool: SqlitePool, companies: Arc<dyn CompanyDirectory>) -> Self {
        Self::with_retry(pool, companies, RetryPolicy::default())
    }

    pub fn with_retry(
        pool: SqlitePool,
        companies: Arc<dyn CompanyDirectory>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            pool,
            companies,
            retry,
        }
    }

    /// 分配下一个编号
    pub async fn next(
        &self,
        company_id: i64,
        kind: DocumentKind,
        year: i32,
    ) -> FiscalResult<AllocatedNumber> {
        validate_scope(company_id, year)?;

        let company = self
            .companies
            .find(company_id)
            .await?
            .ok_or(FiscalError::InvalidCompany(company_id))?;
        let prefix = document_prefix(&company.name, &company.address);

        let attempts = self.retry.max_attempts.max(1);
        for attempt in 0..attempts {
            match self.try_allocate(company_id, kind, year, &prefix).await {
                Ok(allocated) => {
                    tracing::debug!(
                        company_id,
                        kind = %kind,
                        year,
                        formatted = %allocated.formatted,
                        attempt = attempt + 1,
                        "Document number allocated"
                    );
                    return Ok(allocated);
                }
                Err(e) if e.is_retryable_conflict() => {
                    tracing::warn!(
                        company_id,
                        kind = %kind,
                        year,
                        attempt = attempt + 1,
                        max_attempts = attempts,
                        error = %e,
                        "Number allocation conflict"
                    );
                    if attempt + 1 < attempts {
                        tokio::time::sleep(self.retry.delay_for(attempt)).await;
                    }
                }
                Err(e) => {
                    tracing::error!(company_id, kind = %kind, year, error = %e, "Number allocation failed");
                    return Err(e);
                }
            }
        }

        tracing::error!(
            company_id,
            kind = %kind,
            year,
            attempts,
            "Number allocation exhausted retries"
        );
        Err(FiscalError::ExhaustedRetries { attempts })
    }

    /// Single attempt inside one write transaction
    async fn try_allocate(
        &self,
        company_id: i64,
        kind: DocumentKind,
        year: i32,
        prefix: &str,
    ) -> FiscalResult<AllocatedNumber> {
        let now = now_millis();
        let mut tx = self.pool.begin().await.map_err(classify)?;

        let last_number: i64 = sqlx::query_scalar(
            "INSERT INTO document_sequences (company_id, document_kind, year, last_number, updated_at) \
             VALUES (?, ?, ?, 0, ?) \
             ON CONFLICT (company_id, document_kind, year) DO UPDATE SET updated_at = excluded.updated_at \
             RETURNING last_number",
        )
        .bind(company_id)
        .bind(kind.as_str())
        .bind(year)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(classify)?;

        let highest_issued: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(number), 0) FROM issued_numbers \
             WHERE company_id = ? AND document_kind = ? AND year = ?",
        )
        .bind(company_id)
        .bind(kind.as_str())
        .bind(year)
        .fetch_one(&mut *tx)
        .await
        .map_err(classify)?;

        let number = last_number.max(highest_issued) + 1;
        let formatted = format_number(prefix, number, year);

        let updated = sqlx::query(
            "UPDATE document_sequences SET last_number = ?, updated_at = ? \
             WHERE company_id = ? AND document_kind = ? AND year = ? AND last_number = ?",
        )
        .bind(number)
        .bind(now)
        .bind(company_id)
        .bind(kind.as_str())
        .bind(year)
        .bind(last_number)
        .execute(&mut *tx)
        .await
        .map_err(classify)?;
        if updated.rows_affected() == 0 {
            return Err(FiscalError::Concurrency(format!(
                "counter moved while allocating {formatted}"
            )));
        }

        insert_issued(&mut tx, company_id, kind, year, number, &formatted, now).await?;

        tx.commit().await.map_err(classify)?;

        Ok(AllocatedNumber {
            number,
            formatted,
            prefix: prefix.to_string(),
        })
    }

    /// 当前计数（未分配则为 0），只读
    pub async fn current(&self, company_id: i64, kind: DocumentKind, year: i32) -> FiscalResult<i64> {
        validate_scope(company_id, year)?;
        let current: i64 = sqlx::query_scalar(
            "SELECT MAX( \
               COALESCE((SELECT last_number FROM document_sequences \
                         WHERE company_id = ?1 AND document_kind = ?2 AND year = ?3), 0), \
               COALESCE((SELECT MAX(number) FROM issued_numbers \
                         WHERE company_id = ?1 AND document_kind = ?2 AND year = ?3), 0))",
        )
        .bind(company_id)
        .bind(kind.as_str())
        .bind(year)
        .fetch_one(&self.pool)
        .await?;
        Ok(current)
    }

    /// 登记已有编号（迁移历史单据）
    ///
    /// The number must be written exactly as this company would have issued
    /// it (same prefix, three-digit padding, year); anything else is a
    /// `Validation` error. It is recorded as issued and the counter moves past
    /// it. A number already issued in the scope is a `DuplicateNumber`.
    pub async fn register_existing(
        &self,
        company_id: i64,
        kind: DocumentKind,
        formatted: &str,
    ) -> FiscalResult<AllocatedNumber> {
        let (number, year) = parse_formatted(formatted).ok_or_else(|| {
            FiscalError::validation(format!("not a document number: {formatted}"))
        })?;
        validate_scope(company_id, year)?;
        if number <= 0 {
            return Err(FiscalError::validation(format!(
                "document number must be positive: {formatted}"
            )));
        }
        let company = self
            .companies
            .find(company_id)
            .await?
            .ok_or(FiscalError::InvalidCompany(company_id))?;

        let prefix = document_prefix(&company.name, &company.address);
        let expected = format_number(&prefix, number, year);
        if expected != formatted {
            return Err(FiscalError::validation(format!(
                "{formatted} is not a number of company {company_id} (expected {expected})"
            )));
        }

        let now = now_millis();
        let mut tx = self.pool.begin().await.map_err(classify)?;

        sqlx::query(
            "INSERT INTO document_sequences (company_id, document_kind, year, last_number, updated_at) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT (company_id, document_kind, year) DO UPDATE SET \
               last_number = MAX(last_number, excluded.last_number), updated_at = excluded.updated_at",
        )
        .bind(company_id)
        .bind(kind.as_str())
        .bind(year)
        .bind(number)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(classify)?;

        insert_issued(&mut tx, company_id, kind, year, number, formatted, now).await?;

        tx.commit().await.map_err(classify)?;

        tracing::info!(company_id, kind = %kind, formatted, "Existing document number registered");

        Ok(AllocatedNumber {
            number,
            formatted: expected,
            prefix,
        })
    }
}

async fn insert_issued(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    company_id: i64,
    kind: DocumentKind,
    year: i32,
    number: i64,
    formatted: &str,
    now: i64,
) -> FiscalResult<()> {
    sqlx::query(
        "INSERT INTO issued_numbers (company_id, document_kind, year, number, formatted, issued_at) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(company_id)
    .bind(kind.as_str())
    .bind(year)
    .bind(number)
    .bind(formatted)
    .bind(now)
    .execute(&mut **tx)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            FiscalError::DuplicateNumber(formatted.to_string())
        } else {
            classify(e)
        }
    })?;
    Ok(())
}

fn validate_scope(company_id: i64, year: i32) -> FiscalResult<()> {
    if company_id <= 0 {
        return Err(FiscalError::validation(format!(
            "company id must be positive, got {company_id}"
        )));
    }
    if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
        return Err(FiscalError::validation(format!(
            "year must be within {MIN_YEAR}..={MAX_YEAR}, got {year}"
        )));
    }
    Ok(())
}

/// Busy-store errors become retryable conflicts; everything else is storage
fn classify(err: sqlx::Error) -> FiscalError {
    if is_busy(&err) {
        FiscalError::Concurrency(err.to_string())
    } else {
        FiscalError::from(err)
    }
}
