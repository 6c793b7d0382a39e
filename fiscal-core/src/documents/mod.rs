//! 单据创建流程
//!
//! ```text
//! SequenceAllocator::next → build(record) → SealingService::seal
//!   → AuditLedger::append → VeriFactu code (facturas)
//! ```
//!
//! A failed number allocation blocks creation. The ledger append happens last
//! and is attempted once.

use serde::Serialize;
use shared::models::{DocumentKind, RecordState, Seal};

use crate::audit::{AppendReceipt, AuditLedger, NewOperation, RequestContext};
use crate::seal::SealingService;
use crate::sequence::{AllocatedNumber, SequenceAllocator};
use crate::utils::{FiscalError, FiscalResult};
use crate::verifactu::{VeriFactuCodeGenerator, VeriFactuInput};

/// 单据创建请求
#[derive(Debug, Clone)]
pub struct IssueRequest {
    pub company_id: i64,
    pub kind: DocumentKind,
    pub year: i32,
    /// 记录 ID（由发票服务分配）
    pub record_id: String,
    pub actor: String,
    pub context: RequestContext,
}

/// VeriFactu 结果（仅发票）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VeriFactuCode {
    pub code: String,
    pub fingerprint: String,
}

/// 单据创建结果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedDocument {
    pub number: AllocatedNumber,
    pub record: RecordState,
    pub seal: Seal,
    pub ledger: AppendReceipt,
    pub verifactu: Option<VeriFactuCode>,
}

#[derive(Clone)]
pub struct FiscalDocumentService {
    allocator: SequenceAllocator,
    sealing: SealingService,
    ledger: AuditLedger,
    verifactu: VeriFactuCodeGenerator,
}

impl FiscalDocumentService {
    pub fn new(
        allocator: SequenceAllocator,
        sealing: SealingService,
        ledger: AuditLedger,
        verifactu: VeriFactuCodeGenerator,
    ) -> Self {
        Self {
            allocator,
            sealing,
            ledger,
            verifactu,
        }
    }

    /// 分配编号并创建单据
    ///
    /// `build` receives the allocated number and returns the full record.
    pub async fn issue<F>(&self, request: IssueRequest, build: F) -> FiscalResult<IssuedDocument>
    where
        F: FnOnce(&AllocatedNumber) -> FiscalResult<RecordState>,
    {
        let number = self
            .allocator
            .next(request.company_id, request.kind, request.year)
            .await?;

        let record = build(&number)?;
        check_kind(request.kind, &record)?;

        let seal = self.sealing.seal(&record)?;

        // 发票字段在写入账本前校验，避免留下无法生成提交码的条目
        let verifactu_input = match &record {
            RecordState::Invoice(invoice) => {
                let input = VeriFactuInput::from(invoice);
                let fingerprint = self.verifactu.fingerprint(&input)?;
                Some((input, fingerprint))
            }
            _ => None,
        };

        let operation = NewOperation::insert(
            request.kind.table(),
            request.record_id.clone(),
            request.actor.clone(),
            record.clone(),
        )
        .with_seal(seal.clone())
        .with_context(request.context);
        let ledger = self.ledger.append(operation).await?;

        let verifactu = verifactu_input
            .map(|(input, fingerprint)| -> FiscalResult<VeriFactuCode> {
                Ok(VeriFactuCode {
                    code: self.verifactu.generate(&input)?,
                    fingerprint,
                })
            })
            .transpose()?;

        tracing::info!(
            kind = %request.kind,
            formatted = %number.formatted,
            record_id = %request.record_id,
            sequence = ledger.id,
            "Fiscal document issued"
        );

        Ok(IssuedDocument {
            number,
            record,
            seal,
            ledger,
            verifactu,
        })
    }
}

fn check_kind(kind: DocumentKind, record: &RecordState) -> FiscalResult<()> {
    let matches = matches!(
        (kind, record),
        (DocumentKind::Invoice, RecordState::Invoice(_))
            | (DocumentKind::Proforma, RecordState::Proforma(_))
            | (DocumentKind::CreditNote, RecordState::CreditNote(_))
    );
    if matches {
        Ok(())
    } else {
        Err(FiscalError::validation(format!(
            "record kind {} does not match requested {kind}",
            record.kind()
        )))
    }
}
