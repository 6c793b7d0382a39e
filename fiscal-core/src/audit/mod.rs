//! 审计账本模块：税务级防篡改操作记录
//!
//! # 架构
//!
//! ```text
//! 状态变更操作
//!   └─ AuditLedger::append() → 写事务 { ledger_head++ → audit_ledger INSERT → head_hash }
//!
//! SHA256 哈希链: genesis → entry₁ → entry₂ → ... → entryₙ ← ledger_head
//! ```
//!
//! # 防篡改保证
//!
//! - **integrity_hash**: 每条记录的内容哈希，修改任何存储字段都会不匹配
//! - **chain_hash**: 包含前一条的 chain_hash，删除/插入中间记录会断链
//! - **ledger_head**: 持久化链头，删除末尾记录可被发现
//! - **Append-only**: 无删除/更新接口

pub mod ledger;
mod storage;
pub mod types;

pub use ledger::AuditLedger;
pub use types::{
    AppendReceipt, AuditListResponse, AuditQuery, ChainBreak, GENESIS_HASH, HistoryPage,
    LedgerEntry, LedgerHead, LedgerVerification, NewOperation, RequestContext,
};
