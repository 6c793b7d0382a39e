//! 单据创建流程：编号 → 封印 → 账本 → VeriFactu

mod common;

use common::{TELWAGEN_ID, invoice, proforma, setup};
use fiscal_core::audit::{HistoryPage, RequestContext};
use fiscal_core::{FiscalError, IssueRequest, VeriFactuInput};
use regex::Regex;
use rust_decimal::Decimal;
use shared::models::{DocumentKind, RecordState};

fn request(kind: DocumentKind, record_id: &str) -> IssueRequest {
    IssueRequest {
        company_id: TELWAGEN_ID,
        kind,
        year: 2025,
        record_id: record_id.to_string(),
        actor: "admin".to_string(),
        context: RequestContext {
            source_ip: Some("192.168.1.20".to_string()),
            user_agent: Some("facturacion/1.0".to_string()),
        },
    }
}

#[tokio::test]
async fn issuing_an_invoice_seals_codes_and_records_it() {
    let env = setup().await;

    let issued = env
        .core
        .documents
        .issue(request(DocumentKind::Invoice, "1"), |number| {
            Ok(RecordState::Invoice(invoice(1, &number.formatted)))
        })
        .await
        .unwrap();

    assert_eq!(issued.number.number, 1);
    assert!(issued.number.formatted.ends_with("001/2025"));

    // 封印与记录绑定
    assert!(env.core.sealing.verify(&issued.record, &issued.seal));
    let RecordState::Invoice(mut tampered) = issued.record.clone() else {
        panic!("expected invoice record");
    };
    tampered.total = Decimal::new(1_000, 2);
    assert!(!env.core.sealing.verify(&RecordState::Invoice(tampered.clone()), &issued.seal));

    // VeriFactu 提交码
    let code = issued.verifactu.as_ref().expect("invoice gets a VeriFactu code");
    let pattern = Regex::new(r"^VF-[0-9A-F]{12}$").unwrap();
    assert!(pattern.is_match(&code.code), "{}", code.code);
    let RecordState::Invoice(original) = &issued.record else {
        unreachable!();
    };
    assert!(env.core.verifactu.verify(&VeriFactuInput::from(original), &code.code));
    assert!(!env.core.verifactu.verify(&VeriFactuInput::from(&tampered), &code.code));

    // 账本
    let history = env
        .core
        .ledger
        .history("facturas", "1", HistoryPage::default())
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    let entry = &history[0];
    assert_eq!(entry.sequence_id, issued.ledger.id);
    assert_eq!(entry.seal.as_ref(), Some(&issued.seal));
    assert_eq!(entry.after_state.as_ref(), Some(&issued.record));
    assert_eq!(entry.source_ip.as_deref(), Some("192.168.1.20"));
    assert!(env.core.ledger.verify_all().await.unwrap().intact);
}

#[tokio::test]
async fn proformas_get_no_verifactu_code() {
    let env = setup().await;

    let issued = env
        .core
        .documents
        .issue(request(DocumentKind::Proforma, "7"), |number| {
            Ok(proforma(7, &number.formatted))
        })
        .await
        .unwrap();

    assert_eq!(issued.number.formatted, "TCI-XX001/2025");
    assert!(issued.verifactu.is_none());
    assert_eq!(
        env.core
            .ledger
            .history("proformas", "7", HistoryPage::default())
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn mismatched_record_kind_is_rejected() {
    let env = setup().await;

    let result = env
        .core
        .documents
        .issue(request(DocumentKind::Invoice, "2"), |number| {
            Ok(proforma(2, &number.formatted))
        })
        .await;

    assert!(matches!(result, Err(FiscalError::Validation(_))));
    let head = env.core.ledger.head().await.unwrap();
    assert_eq!(head.sequence, 0);
}

#[tokio::test]
async fn builder_failure_stops_creation() {
    let env = setup().await;

    let result = env
        .core
        .documents
        .issue(request(DocumentKind::Proforma, "3"), |_| {
            Err(FiscalError::validation("cliente sin identificación"))
        })
        .await;

    assert!(matches!(result, Err(FiscalError::Validation(_))));
    assert_eq!(env.core.ledger.head().await.unwrap().sequence, 0);
}

#[tokio::test]
async fn unknown_company_blocks_creation() {
    let env = setup().await;
    let mut req = request(DocumentKind::Invoice, "4");
    req.company_id = 99;

    let result = env
        .core
        .documents
        .issue(req, |_| panic!("builder must not run without a number"))
        .await;

    assert!(matches!(result, Err(FiscalError::InvalidCompany(99))));
}

#[tokio::test]
async fn invoice_without_emission_timestamp_is_not_recorded() {
    let env = setup().await;

    let result = env
        .core
        .documents
        .issue(request(DocumentKind::Invoice, "5"), |number| {
            let mut record = invoice(5, &number.formatted);
            record.emitida_en = String::new();
            Ok(RecordState::Invoice(record))
        })
        .await;

    assert!(matches!(result, Err(FiscalError::Validation(_))), "{result:?}");
    assert_eq!(env.core.ledger.head().await.unwrap().sequence, 0);
}
