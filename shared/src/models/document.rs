//! Document and operation kinds

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fiscal document kinds numbered by the sequence allocator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    /// Factura
    Invoice,
    /// Proforma
    Proforma,
    /// Factura rectificativa / abono
    CreditNote,
}

impl DocumentKind {
    /// Stable storage key (also the serde representation)
    pub const fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Invoice => "invoice",
            DocumentKind::Proforma => "proforma",
            DocumentKind::CreditNote => "credit_note",
        }
    }

    /// Table owned by the invoicing service for this kind
    pub const fn table(&self) -> &'static str {
        match self {
            DocumentKind::Invoice => "facturas",
            DocumentKind::Proforma => "proformas",
            DocumentKind::CreditNote => "abonos",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "invoice" => Ok(DocumentKind::Invoice),
            "proforma" => Ok(DocumentKind::Proforma),
            "credit_note" => Ok(DocumentKind::CreditNote),
            other => Err(format!("unknown document kind: {other}")),
        }
    }
}

/// State-changing operation recorded in the audit ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationKind {
    Insert,
    Update,
    Delete,
}

impl OperationKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Insert => "INSERT",
            OperationKind::Update => "UPDATE",
            OperationKind::Delete => "DELETE",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INSERT" => Ok(OperationKind::Insert),
            "UPDATE" => Ok(OperationKind::Update),
            "DELETE" => Ok(OperationKind::Delete),
            other => Err(format!("unknown operation kind: {other}")),
        }
    }
}
