//! 审计账本存储层：行映射与哈希计算
//!
//! Hash inputs use the canonical JSON of the stored fields, so a row can be
//! re-hashed from its own columns without any in-memory state:
//!
//! ```text
//! integrityHash = digest({table, recordId, operationKind, beforeState, afterState, occurredAt})
//! chainHash     = digest({sequence, prevHash, integrityHash, sealHash, actor, sourceIp, userAgent})
//! ```

use serde_json::{Value, json};
use shared::models::{OperationKind, RecordState, Seal};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use super::types::LedgerEntry;
use crate::hash;
use crate::seal::seal_hash_matches;
use crate::utils::{FiscalError, FiscalResult};

pub(crate) const SELECT_COLUMNS: &str = "id, table_name, record_id, operation_kind, actor, \
     before_state, after_state, seal, integrity_hash, prev_hash, chain_hash, occurred_at, \
     source_ip, user_agent";

/// 计算操作内容哈希
pub(crate) fn compute_integrity_hash(
    table: &str,
    record_id: &str,
    operation_kind: &str,
    before_state: &Value,
    after_state: &Value,
    occurred_at: &str,
) -> String {
    hash::digest_value(&json!({
        "table": table,
        "recordId": record_id,
        "operationKind": operation_kind,
        "beforeState": before_state,
        "afterState": after_state,
        "occurredAt": occurred_at,
    }))
}

/// 链哈希输入（操作上下文字段也在此受保护）
#[derive(Debug, Clone, Copy)]
pub(crate) struct ChainLink<'a> {
    pub sequence: i64,
    pub prev_hash: &'a str,
    pub integrity_hash: &'a str,
    pub seal_hash: Option<&'a str>,
    pub actor: &'a str,
    pub source_ip: Option<&'a str>,
    pub user_agent: Option<&'a str>,
}

/// 计算链哈希
pub(crate) fn compute_chain_hash(link: &ChainLink<'_>) -> String {
    hash::digest_value(&json!({
        "sequence": link.sequence,
        "prevHash": link.prev_hash,
        "integrityHash": link.integrity_hash,
        "sealHash": link.seal_hash,
        "actor": link.actor,
        "sourceIp": link.source_ip,
        "userAgent": link.user_agent,
    }))
}

/// Payload as persisted: canonical JSON text, `None` for absent states
pub(crate) fn encode_state(state: Option<&RecordState>) -> FiscalResult<(Value, Option<String>)> {
    match state {
        Some(state) => {
            let value = serde_json::to_value(state)?;
            let text = hash::canonicalize(&value);
            Ok((value, Some(text)))
        }
        None => Ok((Value::Null, None)),
    }
}

/// Stored text back to a JSON value (`NULL` column → `null`)
fn decode_state(text: Option<&str>) -> FiscalResult<Value> {
    match text {
        Some(text) => Ok(serde_json::from_str(text)?),
        None => Ok(Value::Null),
    }
}

/// Raw ledger row as stored
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct LedgerRow {
    pub id: i64,
    pub table_name: String,
    pub record_id: String,
    pub operation_kind: String,
    pub actor: String,
    pub before_state: Option<String>,
    pub after_state: Option<String>,
    pub seal: Option<String>,
    pub integrity_hash: String,
    pub prev_hash: String,
    pub chain_hash: String,
    pub occurred_at: String,
    pub source_ip: Option<String>,
    pub user_agent: Option<String>,
}

impl TryFrom<LedgerRow> for LedgerEntry {
    type Error = FiscalError;

    fn try_from(row: LedgerRow) -> FiscalResult<Self> {
        let operation_kind: OperationKind = row
            .operation_kind
            .parse()
            .map_err(|e: String| FiscalError::storage(format!("entry {}: {e}", row.id)))?;
        let parse_state = |text: Option<String>| -> FiscalResult<Option<RecordState>> {
            text.map(|t| serde_json::from_str(&t)).transpose().map_err(Into::into)
        };
        Ok(LedgerEntry {
            sequence_id: row.id,
            table: row.table_name,
            record_id: row.record_id,
            operation_kind,
            actor: row.actor,
            before_state: parse_state(row.before_state)?,
            after_state: parse_state(row.after_state)?,
            seal: row.seal.map(|s| serde_json::from_str(&s)).transpose()?,
            integrity_hash: row.integrity_hash,
            prev_hash: row.prev_hash,
            chain_hash: row.chain_hash,
            occurred_at: row.occurred_at,
            source_ip: row.source_ip,
            user_agent: row.user_agent,
        })
    }
}

/// 单行校验结果
#[derive(Debug)]
pub(crate) struct RowCheck {
    pub id: i64,
    /// `None` when the column itself is unreadable
    pub prev_hash: Option<String>,
    pub chain_hash: Option<String>,
    pub consistent: bool,
}

/// Re-hash one raw row from its own columns
///
/// Never fails: an unreadable column or unparsable payload marks the row as
/// inconsistent so the scan can continue.
pub(crate) fn check_row(row: &SqliteRow) -> FiscalResult<RowCheck> {
    let id: i64 = row.try_get("id")?;
    let prev_hash: Option<String> = row.try_get("prev_hash").ok();
    let chain_hash: Option<String> = row.try_get("chain_hash").ok();

    let consistent = match (&prev_hash, &chain_hash) {
        (Some(prev), Some(chain)) => recompute_row(row, id, prev, chain).unwrap_or(false),
        _ => false,
    };

    Ok(RowCheck {
        id,
        prev_hash,
        chain_hash,
        consistent,
    })
}

fn recompute_row(row: &SqliteRow, id: i64, prev_hash: &str, chain_hash: &str) -> FiscalResult<bool> {
    let table: String = row.try_get("table_name")?;
    let record_id: String = row.try_get("record_id")?;
    let operation_kind: String = row.try_get("operation_kind")?;
    let actor: String = row.try_get("actor")?;
    let source_ip: Option<String> = row.try_get("source_ip")?;
    let user_agent: Option<String> = row.try_get("user_agent")?;
    let before_state: Option<String> = row.try_get("before_state")?;
    let after_state: Option<String> = row.try_get("after_state")?;
    let seal: Option<String> = row.try_get("seal")?;
    let integrity_hash: String = row.try_get("integrity_hash")?;
    let occurred_at: String = row.try_get("occurred_at")?;

    let before = decode_state(before_state.as_deref())?;
    let after = decode_state(after_state.as_deref())?;

    let expected = compute_integrity_hash(
        &table,
        &record_id,
        &operation_kind,
        &before,
        &after,
        &occurred_at,
    );
    if expected != integrity_hash {
        return Ok(false);
    }

    let seal: Option<Seal> = seal.map(|s| serde_json::from_str(&s)).transpose()?;
    if let Some(seal) = &seal {
        if !seal_hash_matches(seal) {
            return Ok(false);
        }
        // Sealed document is the after-state
        if !after.is_null() && hash::digest_value(&after) != seal.document_hash {
            return Ok(false);
        }
    }

    let expected_chain = compute_chain_hash(&ChainLink {
        sequence: id,
        prev_hash,
        integrity_hash: &integrity_hash,
        seal_hash: seal.as_ref().map(|s| s.seal_hash.as_str()),
        actor: &actor,
        source_ip: source_ip.as_deref(),
        user_agent: user_agent.as_deref(),
    });
    Ok(expected_chain == chain_hash)
}
