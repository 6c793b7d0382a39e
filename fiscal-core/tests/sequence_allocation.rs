//! 单据编号并发测试

mod common;

use std::collections::HashSet;

use common::{TELWAGEN_ID, setup};
use fiscal_core::FiscalError;
use shared::models::DocumentKind;

const CONCURRENCY: usize = 50;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_allocations_are_unique() {
    let env = setup().await;

    let handles: Vec<_> = (0..CONCURRENCY)
        .map(|_| {
            let allocator = env.core.sequences.clone();
            tokio::spawn(async move { allocator.next(TELWAGEN_ID, DocumentKind::Proforma, 2025).await })
        })
        .collect();

    let mut formatted = HashSet::new();
    let mut numbers = Vec::new();
    for handle in handles {
        let allocated = handle.await.unwrap().unwrap();
        numbers.push(allocated.number);
        assert!(formatted.insert(allocated.formatted), "duplicate number issued");
    }

    assert_eq!(formatted.len(), CONCURRENCY);
    numbers.sort_unstable();
    assert_eq!(numbers, (1..=CONCURRENCY as i64).collect::<Vec<_>>());
    assert_eq!(
        env.core
            .sequences
            .current(TELWAGEN_ID, DocumentKind::Proforma, 2025)
            .await
            .unwrap(),
        CONCURRENCY as i64
    );

    let registered: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM issued_numbers")
        .fetch_one(&env.core.db.pool)
        .await
        .unwrap();
    assert_eq!(registered, CONCURRENCY as i64);
}

#[tokio::test]
async fn telwagen_proforma_numbers() {
    let env = setup().await;
    let allocator = &env.core.sequences;

    let first = allocator.next(TELWAGEN_ID, DocumentKind::Proforma, 2025).await.unwrap();
    let second = allocator.next(TELWAGEN_ID, DocumentKind::Proforma, 2025).await.unwrap();

    assert_eq!(first.formatted, "TCI-XX001/2025");
    assert_eq!(second.formatted, "TCI-XX002/2025");
}

#[tokio::test]
async fn unknown_company_is_rejected() {
    let env = setup().await;
    let result = env.core.sequences.next(404, DocumentKind::Invoice, 2025).await;
    assert!(matches!(result, Err(FiscalError::InvalidCompany(404))));
}

#[tokio::test]
async fn allocator_survives_reopen() {
    let env = setup().await;
    env.core
        .sequences
        .next(TELWAGEN_ID, DocumentKind::Invoice, 2025)
        .await
        .unwrap();
    env.core.db.close().await;

    let reopened = fiscal_core::FiscalCore::open(&env.config).await.unwrap();
    let next = reopened
        .sequences
        .next(TELWAGEN_ID, DocumentKind::Invoice, 2025)
        .await
        .unwrap();
    assert_eq!(next.formatted, "TCI-XX002/2025");
}
