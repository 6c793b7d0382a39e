//! 单据编号模块
//!
//! 按 `(company, kind, year)` 分配唯一、递增的单据编号。
//! 计数器 + 已发号登记表 + 有限重试，替代"先读最大号再插入"的竞态写法。

mod allocator;
mod company;
pub mod prefix;

pub use allocator::{AllocatedNumber, RetryPolicy, SequenceAllocator};
pub use company::{CompanyDirectory, CompanyProfile, SqliteCompanyDirectory};
