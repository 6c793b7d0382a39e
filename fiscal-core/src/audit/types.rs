//! 审计账本类型定义
//!
//! 所有条目不可变、不可删除，支持 SHA256 哈希链防篡改。

use serde::{Deserialize, Serialize};
use shared::models::{OperationKind, RecordState, Seal};

/// Chain start value (no predecessor)
pub const GENESIS_HASH: &str = "genesis";

/// 待追加的操作
///
/// `occurred_at` is stamped by the ledger at append time.
#[derive(Debug, Clone)]
pub struct NewOperation {
    pub table: String,
    pub record_id: String,
    pub operation_kind: OperationKind,
    pub actor: String,
    pub before_state: Option<RecordState>,
    pub after_state: Option<RecordState>,
    pub seal: Option<Seal>,
    pub source_ip: Option<String>,
    pub user_agent: Option<String>,
}

impl NewOperation {
    pub fn insert(
        table: impl Into<String>,
        record_id: impl Into<String>,
        actor: impl Into<String>,
        after: RecordState,
    ) -> Self {
        Self::new(table, record_id, OperationKind::Insert, actor, None, Some(after))
    }

    pub fn update(
        table: impl Into<String>,
        record_id: impl Into<String>,
        actor: impl Into<String>,
        before: RecordState,
        after: RecordState,
    ) -> Self {
        Self::new(
            table,
            record_id,
            OperationKind::Update,
            actor,
            Some(before),
            Some(after),
        )
    }

    pub fn delete(
        table: impl Into<String>,
        record_id: impl Into<String>,
        actor: impl Into<String>,
        before: RecordState,
    ) -> Self {
        Self::new(table, record_id, OperationKind::Delete, actor, Some(before), None)
    }

    fn new(
        table: impl Into<String>,
        record_id: impl Into<String>,
        operation_kind: OperationKind,
        actor: impl Into<String>,
        before_state: Option<RecordState>,
        after_state: Option<RecordState>,
    ) -> Self {
        Self {
            table: table.into(),
            record_id: record_id.into(),
            operation_kind,
            actor: actor.into(),
            before_state,
            after_state,
            seal: None,
            source_ip: None,
            user_agent: None,
        }
    }

    pub fn with_seal(mut self, seal: Seal) -> Self {
        self.seal = Some(seal);
        self
    }

    pub fn with_context(mut self, context: RequestContext) -> Self {
        self.source_ip = context.source_ip;
        self.user_agent = context.user_agent;
        self
    }
}

/// Caller-side request metadata recorded with each operation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    pub source_ip: Option<String>,
    pub user_agent: Option<String>,
}

/// 追加结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendReceipt {
    /// Ledger sequence (entry id)
    pub id: i64,
    pub integrity_hash: String,
    pub chain_hash: String,
    pub occurred_at: String,
}

/// 审计账本条目（不可变）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    /// 全局递增序列号
    pub sequence_id: i64,
    pub table: String,
    pub record_id: String,
    pub operation_kind: OperationKind,
    pub actor: String,
    pub before_state: Option<RecordState>,
    pub after_state: Option<RecordState>,
    pub seal: Option<Seal>,
    pub integrity_hash: String,
    pub prev_hash: String,
    pub chain_hash: String,
    /// UTC ISO-8601
    pub occurred_at: String,
    pub source_ip: Option<String>,
    pub user_agent: Option<String>,
}

/// 持久化的链头
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerHead {
    pub sequence: i64,
    pub head_hash: String,
    /// Unix 毫秒
    pub updated_at: i64,
}

/// 单条记录历史分页参数
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct HistoryPage {
    #[serde(default)]
    pub offset: usize,
    /// 分页大小（默认 50）
    #[serde(default = "default_limit")]
    pub limit: usize,
}

impl Default for HistoryPage {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: default_limit(),
        }
    }
}

/// 审计账本查询参数
#[derive(Debug, Clone, Deserialize)]
pub struct AuditQuery {
    /// 起始时间（ISO-8601，含）
    pub from: Option<String>,
    /// 截止时间（ISO-8601，含）
    pub to: Option<String>,
    pub table: Option<String>,
    pub operation_kind: Option<OperationKind>,
    pub actor: Option<String>,
    /// 分页偏移
    #[serde(default)]
    pub offset: usize,
    /// 分页大小（默认 50）
    #[serde(default = "default_limit")]
    pub limit: usize,
}

impl Default for AuditQuery {
    fn default() -> Self {
        Self {
            from: None,
            to: None,
            table: None,
            operation_kind: None,
            actor: None,
            offset: 0,
            limit: default_limit(),
        }
    }
}

fn default_limit() -> usize {
    50
}

/// 审计账本列表响应
#[derive(Debug, Serialize)]
pub struct AuditListResponse {
    pub items: Vec<LedgerEntry>,
    pub total: u64,
}

/// 全量校验结果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerVerification {
    /// 扫描的记录总数
    pub total: u64,
    pub verified: u64,
    pub altered: u64,
    /// `altered == 0` 且链无断裂且链头一致
    pub intact: bool,
    /// 被篡改的条目序列号
    pub altered_entries: Vec<i64>,
    pub chain_breaks: Vec<ChainBreak>,
    /// 持久化链头与最后一条记录一致
    pub head_matches: bool,
    pub verified_at: String,
}

/// 哈希链断裂点
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainBreak {
    /// 断裂处的序列号
    pub entry_id: i64,
    /// 期望的 prev_hash
    pub expected_prev_hash: String,
    /// 实际的 prev_hash
    pub actual_prev_hash: String,
}
