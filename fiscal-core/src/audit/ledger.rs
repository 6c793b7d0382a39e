//! 审计账本服务
//!
//! Append-only 设计：
//! - 仅提供 `append` 和读取方法，没有 delete/update 接口
//! - 每次 append 在同一个写事务中推进 `ledger_head` 并写入条目
//! - `verify_all` 逐行重算哈希，流式扫描，不阻塞写入 (WAL)

use std::sync::Arc;

use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use shared::util::{now_iso8601, now_millis};
use sqlx::SqlitePool;

use super::storage::{
    ChainLink, LedgerRow, SELECT_COLUMNS, check_row, compute_chain_hash, compute_integrity_hash,
    encode_state,
};
use super::types::{
    AppendReceipt, AuditListResponse, AuditQuery, ChainBreak, GENESIS_HASH, HistoryPage,
    LedgerEntry, LedgerHead, LedgerVerification, NewOperation,
};
use crate::utils::{FiscalError, FiscalResult};

#[derive(Clone)]
pub struct AuditLedger {
    pool: SqlitePool,
    /// 序列化进程内的 append，跨进程由写事务 + busy_timeout 保证
    append_lock: Arc<tokio::sync::Mutex<()>>,
}

impl AuditLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            append_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// 追加一条操作记录
    ///
    /// 1. 推进链头（写优先，立即取得写锁）
    /// 2. 计算 integrity/chain 哈希并写入条目
    /// 3. 更新链头哈希，提交
    ///
    /// Attempted once; a failure is a `Storage` error the caller treats as fatal.
    pub async fn append(&self, op: NewOperation) -> FiscalResult<AppendReceipt> {
        let _guard = self.append_lock.lock().await;

        match self.append_inner(&op).await {
            Ok(receipt) => {
                tracing::debug!(
                    sequence = receipt.id,
                    table = %op.table,
                    record_id = %op.record_id,
                    operation = %op.operation_kind,
                    "Ledger entry appended"
                );
                Ok(receipt)
            }
            Err(e) => {
                tracing::error!(
                    table = %op.table,
                    record_id = %op.record_id,
                    operation = %op.operation_kind,
                    actor = %op.actor,
                    error = %e,
                    "Failed to append ledger entry"
                );
                Err(match e {
                    FiscalError::Storage(_) => e,
                    other => FiscalError::storage(other.to_string()),
                })
            }
        }
    }

    async fn append_inner(&self, op: &NewOperation) -> FiscalResult<AppendReceipt> {
        let (before_value, before_text) = encode_state(op.before_state.as_ref())?;
        let (after_value, after_text) = encode_state(op.after_state.as_ref())?;
        let seal_text = op.seal.as_ref().map(serde_json::to_string).transpose()?;

        let occurred_at = now_iso8601();
        let operation_kind = op.operation_kind.as_str();
        let integrity_hash = compute_integrity_hash(
            &op.table,
            &op.record_id,
            operation_kind,
            &before_value,
            &after_value,
            &occurred_at,
        );

        let mut tx = self.pool.begin().await?;

        let (sequence, prev_hash): (i64, String) = sqlx::query_as(
            "UPDATE ledger_head SET sequence = sequence + 1, updated_at = ? \
             WHERE id = 1 RETURNING sequence, head_hash",
        )
        .bind(now_millis())
        .fetch_one(&mut *tx)
        .await?;

        let chain_hash = compute_chain_hash(&ChainLink {
            sequence,
            prev_hash: &prev_hash,
            integrity_hash: &integrity_hash,
            seal_hash: op.seal.as_ref().map(|s| s.seal_hash.as_str()),
            actor: &op.actor,
            source_ip: op.source_ip.as_deref(),
            user_agent: op.user_agent.as_deref(),
        });

        sqlx::query(
            "INSERT INTO audit_ledger (id, table_name, record_id, operation_kind, actor, \
             before_state, after_state, seal, integrity_hash, prev_hash, chain_hash, occurred_at, \
             source_ip, user_agent) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(sequence)
        .bind(&op.table)
        .bind(&op.record_id)
        .bind(operation_kind)
        .bind(&op.actor)
        .bind(before_text)
        .bind(after_text)
        .bind(seal_text)
        .bind(&integrity_hash)
        .bind(&prev_hash)
        .bind(&chain_hash)
        .bind(&occurred_at)
        .bind(&op.source_ip)
        .bind(&op.user_agent)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE ledger_head SET head_hash = ? WHERE id = 1")
            .bind(&chain_hash)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(AppendReceipt {
            id: sequence,
            integrity_hash,
            chain_hash,
            occurred_at,
        })
    }

    /// 当前链头
    pub async fn head(&self) -> FiscalResult<LedgerHead> {
        let (sequence, head_hash, updated_at): (i64, String, i64) =
            sqlx::query_as("SELECT sequence, head_hash, updated_at FROM ledger_head WHERE id = 1")
                .fetch_one(&self.pool)
                .await?;
        Ok(LedgerHead {
            sequence,
            head_hash,
            updated_at,
        })
    }

    /// 单条记录的历史（最新在前，分页）
    pub async fn history(
        &self,
        table: &str,
        record_id: &str,
        page: HistoryPage,
    ) -> FiscalResult<Vec<LedgerEntry>> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM audit_ledger WHERE table_name = ? AND record_id = ? \
             ORDER BY id DESC LIMIT ? OFFSET ?"
        );
        let rows: Vec<LedgerRow> = sqlx::query_as(&sql)
            .bind(table)
            .bind(record_id)
            .bind(page.limit as i64)
            .bind(page.offset as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(LedgerEntry::try_from).collect()
    }

    /// 单条记录的历史（最新在前，惰性流）
    pub fn history_stream<'a>(
        &'a self,
        table: &'a str,
        record_id: &'a str,
    ) -> BoxStream<'a, FiscalResult<LedgerEntry>> {
        const SQL: &str = "SELECT id, table_name, record_id, operation_kind, actor, before_state, \
             after_state, seal, integrity_hash, prev_hash, chain_hash, occurred_at, source_ip, \
             user_agent FROM audit_ledger WHERE table_name = ? AND record_id = ? ORDER BY id DESC";
        sqlx::query_as::<_, LedgerRow>(SQL)
            .bind(table)
            .bind(record_id)
            .fetch(&self.pool)
            .map(|row| row.map_err(FiscalError::from).and_then(LedgerEntry::try_from))
            .boxed()
    }

    /// 条件查询（最新在前）
    pub async fn query(&self, q: &AuditQuery) -> FiscalResult<AuditListResponse> {
        let mut conditions = Vec::new();
        let mut binds: Vec<String> = Vec::new();

        if let Some(from) = &q.from {
            conditions.push("occurred_at >= ?");
            binds.push(from.clone());
        }
        if let Some(to) = &q.to {
            conditions.push("occurred_at <= ?");
            binds.push(to.clone());
        }
        if let Some(table) = &q.table {
            conditions.push("table_name = ?");
            binds.push(table.clone());
        }
        if let Some(kind) = q.operation_kind {
            conditions.push("operation_kind = ?");
            binds.push(kind.as_str().to_string());
        }
        if let Some(actor) = &q.actor {
            conditions.push("actor = ?");
            binds.push(actor.clone());
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };

        let count_sql = format!("SELECT COUNT(*) FROM audit_ledger{where_clause}");
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        for value in &binds {
            count_query = count_query.bind(value);
        }
        let total = count_query.fetch_one(&self.pool).await?;

        let select_sql = format!(
            "SELECT {SELECT_COLUMNS} FROM audit_ledger{where_clause} ORDER BY id DESC LIMIT ? OFFSET ?"
        );
        let mut select_query = sqlx::query_as::<_, LedgerRow>(&select_sql);
        for value in &binds {
            select_query = select_query.bind(value);
        }
        let rows = select_query
            .bind(q.limit as i64)
            .bind(q.offset as i64)
            .fetch_all(&self.pool)
            .await?;

        let items = rows
            .into_iter()
            .map(LedgerEntry::try_from)
            .collect::<FiscalResult<Vec<_>>>()?;

        Ok(AuditListResponse {
            items,
            total: total.max(0) as u64,
        })
    }

    /// 全量校验
    ///
    /// Streams every entry up to the head read at the start, recomputing its
    /// integrity and chain hashes. A corrupt row is counted as altered and the
    /// scan continues. Read-only; entries appended during the scan are not
    /// included.
    pub async fn verify_all(&self) -> FiscalResult<LedgerVerification> {
        let head = self.head().await?;

        let sql = format!("SELECT {SELECT_COLUMNS} FROM audit_ledger WHERE id <= ? ORDER BY id ASC");
        let mut rows = sqlx::query(&sql).bind(head.sequence).fetch(&self.pool);

        let mut total = 0u64;
        let mut verified = 0u64;
        let mut altered_entries = Vec::new();
        let mut chain_breaks = Vec::new();
        let mut expected_prev = GENESIS_HASH.to_string();
        let mut last_id = 0i64;

        while let Some(row) = rows.try_next().await? {
            let check = check_row(&row)?;
            total += 1;
            last_id = check.id;

            if check.consistent {
                verified += 1;
            } else {
                altered_entries.push(check.id);
            }

            let actual_prev = check.prev_hash.unwrap_or_default();
            if actual_prev != expected_prev {
                chain_breaks.push(ChainBreak {
                    entry_id: check.id,
                    expected_prev_hash: expected_prev.clone(),
                    actual_prev_hash: actual_prev,
                });
            }
            expected_prev = check.chain_hash.unwrap_or_default();
        }

        // 链头必须指向最后一条记录（截断/删除末尾可被发现）
        let head_matches = last_id == head.sequence && expected_prev == head.head_hash;

        let altered = altered_entries.len() as u64;
        let intact = altered == 0 && chain_breaks.is_empty() && head_matches;

        Ok(LedgerVerification {
            total,
            verified,
            altered,
            intact,
            altered_entries,
            chain_breaks,
            head_matches,
            verified_at: now_iso8601(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbService;
    use crate::seal::SealingService;
    use serde_json::json;
    use shared::models::{OperationKind, RecordState};

    async fn ledger() -> (tempfile::TempDir, AuditLedger) {
        let dir = tempfile::tempdir().unwrap();
        let db = DbService::open(dir.path().join("fiscal.db")).await.unwrap();
        (dir, AuditLedger::new(db.pool))
    }

    fn state(n: i64) -> RecordState {
        RecordState::document("nota", json!({"id": n, "texto": format!("nota {n}")}))
    }

    #[tokio::test]
    async fn test_append_advances_head() {
        let (_dir, ledger) = ledger().await;

        let first = ledger
            .append(NewOperation::insert("notas", "1", "admin", state(1)))
            .await
            .unwrap();
        let second = ledger
            .append(NewOperation::update("notas", "1", "admin", state(1), state(2)))
            .await
            .unwrap();

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(first.integrity_hash.len(), 64);

        let head = ledger.head().await.unwrap();
        assert_eq!(head.sequence, 2);
        assert_eq!(head.head_hash, second.chain_hash);
    }

    #[tokio::test]
    async fn test_history_newest_first_and_paged() {
        let (_dir, ledger) = ledger().await;
        for n in 0..5 {
            ledger
                .append(NewOperation::update("notas", "7", "admin", state(n), state(n + 1)))
                .await
                .unwrap();
        }
        ledger
            .append(NewOperation::insert("notas", "8", "admin", state(0)))
            .await
            .unwrap();

        let page = ledger
            .history("notas", "7", HistoryPage { offset: 0, limit: 2 })
            .await
            .unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].sequence_id, 5);
        assert_eq!(page[1].sequence_id, 4);
        assert_eq!(page[0].after_state, Some(state(5)));

        let rest = ledger
            .history("notas", "7", HistoryPage { offset: 2, limit: 50 })
            .await
            .unwrap();
        assert_eq!(rest.len(), 3);

        let streamed: Vec<_> = ledger
            .history_stream("notas", "7")
            .try_collect()
            .await
            .unwrap();
        assert_eq!(streamed.len(), 5);
        assert!(streamed.windows(2).all(|w| w[0].sequence_id > w[1].sequence_id));
    }

    #[tokio::test]
    async fn test_query_filters() {
        let (_dir, ledger) = ledger().await;
        ledger
            .append(NewOperation::insert("notas", "1", "ana", state(1)))
            .await
            .unwrap();
        ledger
            .append(NewOperation::delete("notas", "1", "luis", state(1)))
            .await
            .unwrap();
        ledger
            .append(NewOperation::insert("otras", "2", "ana", state(2)))
            .await
            .unwrap();

        let by_actor = ledger
            .query(&AuditQuery {
                actor: Some("ana".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_actor.total, 2);

        let deletes = ledger
            .query(&AuditQuery {
                operation_kind: Some(OperationKind::Delete),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(deletes.total, 1);
        assert_eq!(deletes.items[0].actor, "luis");
        assert_eq!(deletes.items[0].after_state, None);

        let limited = ledger
            .query(&AuditQuery {
                limit: 1,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(limited.total, 3);
        assert_eq!(limited.items.len(), 1);
        assert_eq!(limited.items[0].sequence_id, 3);
    }

    #[tokio::test]
    async fn test_default_query_lists_latest_page() {
        let (_dir, ledger) = ledger().await;
        for n in 1..=3 {
            ledger
                .append(NewOperation::insert("notas", n.to_string(), "admin", state(n)))
                .await
                .unwrap();
        }

        let query = AuditQuery::default();
        assert_eq!(query.limit, 50);
        let page = ledger.query(&query).await.unwrap();
        assert_eq!(page.total, 3);
        let ids: Vec<i64> = page.items.iter().map(|e| e.sequence_id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[tokio::test]
    async fn test_failed_append_is_storage_error_and_leaves_no_trace() {
        let (_dir, ledger) = ledger().await;
        ledger
            .append(NewOperation::insert("notas", "1", "admin", state(1)))
            .await
            .unwrap();
        let before = ledger.head().await.unwrap();

        sqlx::query(
            "CREATE TRIGGER reject_ledger BEFORE INSERT ON audit_ledger \
             BEGIN SELECT RAISE(ABORT, 'ledger disabled'); END",
        )
        .execute(&ledger.pool)
        .await
        .unwrap();

        let result = ledger
            .append(NewOperation::insert("notas", "2", "admin", state(2)))
            .await;
        assert!(matches!(result, Err(FiscalError::Storage(_))), "{result:?}");

        let after = ledger.head().await.unwrap();
        assert_eq!(after.sequence, before.sequence);
        assert_eq!(after.head_hash, before.head_hash);
        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM audit_ledger")
            .fetch_one(&ledger.pool)
            .await
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[tokio::test]
    async fn test_verify_all_untouched() {
        let (_dir, ledger) = ledger().await;
        let sealing = SealingService::new();
        for n in 0..10 {
            let s = state(n);
            let seal = sealing.seal(&s).unwrap();
            ledger
                .append(NewOperation::insert("notas", n.to_string(), "admin", s).with_seal(seal))
                .await
                .unwrap();
        }

        let report = ledger.verify_all().await.unwrap();
        assert_eq!(report.total, 10);
        assert_eq!(report.verified, 10);
        assert_eq!(report.altered, 0);
        assert!(report.chain_breaks.is_empty());
        assert!(report.head_matches);
        assert!(report.intact);
    }

    #[tokio::test]
    async fn test_verify_all_empty_ledger() {
        let (_dir, ledger) = ledger().await;
        let report = ledger.verify_all().await.unwrap();
        assert_eq!(report.total, 0);
        assert!(report.intact);
    }

    #[tokio::test]
    async fn test_verify_all_detects_altered_seal() {
        let (_dir, ledger) = ledger().await;
        let s = state(1);
        let seal = SealingService::new().seal(&s).unwrap();
        ledger
            .append(NewOperation::insert("notas", "1", "admin", s).with_seal(seal))
            .await
            .unwrap();

        let forged = SealingService::new().seal(&state(99)).unwrap();
        sqlx::query("UPDATE audit_ledger SET seal = ? WHERE id = 1")
            .bind(serde_json::to_string(&forged).unwrap())
            .execute(&ledger.pool)
            .await
            .unwrap();

        let report = ledger.verify_all().await.unwrap();
        assert_eq!(report.altered, 1);
        assert_eq!(report.altered_entries, vec![1]);
        assert!(!report.intact);
    }
}
