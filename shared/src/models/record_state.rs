//! Before/after payloads stored in the audit ledger
//!
//! Known record kinds are typed; anything else travels as a generic JSON
//! document so older binaries can still read ledgers written by newer ones.
//!
//! Wire form (both typed and generic): `{"kind": "<kind>", "data": {...}}`

use rust_decimal::Decimal;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

/// Invoice (factura) as persisted by the invoicing service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceState {
    pub id: i64,
    pub numero_factura: String,
    pub numero_serie: String,
    pub empresa_id: i64,
    pub empresa_cif: String,
    pub cliente_id: i64,
    /// NIF/NIE/CIF of the client
    pub cliente_identificacion: String,
    #[serde(default)]
    pub coche_id: Option<i64>,
    /// Issue date, `YYYY-MM-DD`
    pub fecha_emision: String,
    pub subtotal: Decimal,
    /// IGIC amount
    pub igic: Decimal,
    pub total: Decimal,
    pub estado: String,
    /// Emission timestamp (ISO-8601 UTC), captured once when the invoice is issued
    pub emitida_en: String,
}

/// Proforma as persisted by the invoicing service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProformaState {
    pub id: i64,
    pub numero_proforma: String,
    pub empresa_id: i64,
    pub cliente_id: i64,
    #[serde(default)]
    pub coche_id: Option<i64>,
    pub fecha_emision: String,
    #[serde(default)]
    pub fecha_validez: Option<String>,
    pub subtotal: Decimal,
    pub igic: Decimal,
    pub total: Decimal,
    pub estado: String,
}

/// Credit note (abono) referencing the invoice it rectifies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditNoteState {
    pub id: i64,
    pub numero_abono: String,
    pub factura_id: i64,
    pub empresa_id: i64,
    pub cliente_id: i64,
    pub fecha_emision: String,
    pub motivo: String,
    pub total: Decimal,
}

/// Tagged union over ledger payloads
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawRecordState")]
pub enum RecordState {
    Invoice(InvoiceState),
    Proforma(ProformaState),
    CreditNote(CreditNoteState),
    /// Unknown record kind, kept verbatim
    Document {
        kind: String,
        data: serde_json::Value,
    },
}

impl RecordState {
    pub const INVOICE: &'static str = "invoice";
    pub const PROFORMA: &'static str = "proforma";
    pub const CREDIT_NOTE: &'static str = "credit_note";

    /// Kind tag written next to the payload
    pub fn kind(&self) -> &str {
        match self {
            RecordState::Invoice(_) => Self::INVOICE,
            RecordState::Proforma(_) => Self::PROFORMA,
            RecordState::CreditNote(_) => Self::CREDIT_NOTE,
            RecordState::Document { kind, .. } => kind,
        }
    }

    /// Generic fallback constructor
    pub fn document(kind: impl Into<String>, data: serde_json::Value) -> Self {
        RecordState::Document {
            kind: kind.into(),
            data,
        }
    }
}

impl Serialize for RecordState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("RecordState", 2)?;
        state.serialize_field("kind", self.kind())?;
        match self {
            RecordState::Invoice(v) => state.serialize_field("data", v)?,
            RecordState::Proforma(v) => state.serialize_field("data", v)?,
            RecordState::CreditNote(v) => state.serialize_field("data", v)?,
            RecordState::Document { data, .. } => state.serialize_field("data", data)?,
        }
        state.end()
    }
}

/// Untyped wire form
#[derive(Debug, Deserialize)]
struct RawRecordState {
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

impl TryFrom<RawRecordState> for RecordState {
    type Error = serde_json::Error;

    fn try_from(raw: RawRecordState) -> Result<Self, Self::Error> {
        Ok(match raw.kind.as_str() {
            RecordState::INVOICE => RecordState::Invoice(serde_json::from_value(raw.data)?),
            RecordState::PROFORMA => RecordState::Proforma(serde_json::from_value(raw.data)?),
            RecordState::CREDIT_NOTE => RecordState::CreditNote(serde_json::from_value(raw.data)?),
            _ => RecordState::Document {
                kind: raw.kind,
                data: raw.data,
            },
        })
    }
}
