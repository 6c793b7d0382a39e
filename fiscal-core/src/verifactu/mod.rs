//! VeriFactu 提交码
//!
//! ```text
//! code = "VF-" + upper(hex(digest({numero_factura, numero_serie, empresa_cif,
//!                                  cliente_identificacion, fecha_emision, total, timestamp}))[0..12])
//! ```
//!
//! `timestamp` is the invoice's persisted emission time, so regenerating the
//! code for the same invoice always yields the same value.

use chrono::DateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared::models::InvoiceState;

use crate::hash;
use crate::utils::{FiscalError, FiscalResult};

pub const CODE_PREFIX: &str = "VF-";
const CODE_HEX_LEN: usize = 12;

/// Canonical subset of invoice fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VeriFactuInput {
    pub numero_factura: String,
    pub numero_serie: String,
    pub empresa_cif: String,
    pub cliente_identificacion: String,
    /// `YYYY-MM-DD`
    pub fecha_emision: String,
    pub total: Decimal,
    /// Persisted emission timestamp (RFC 3339)
    pub timestamp: String,
}

impl From<&InvoiceState> for VeriFactuInput {
    fn from(invoice: &InvoiceState) -> Self {
        Self {
            numero_factura: invoice.numero_factura.clone(),
            numero_serie: invoice.numero_serie.clone(),
            empresa_cif: invoice.empresa_cif.clone(),
            cliente_identificacion: invoice.cliente_identificacion.clone(),
            fecha_emision: invoice.fecha_emision.clone(),
            total: invoice.total,
            timestamp: invoice.emitida_en.clone(),
        }
    }
}

impl VeriFactuInput {
    fn validate(&self) -> FiscalResult<()> {
        let required = [
            ("numero_factura", &self.numero_factura),
            ("numero_serie", &self.numero_serie),
            ("empresa_cif", &self.empresa_cif),
            ("cliente_identificacion", &self.cliente_identificacion),
            ("fecha_emision", &self.fecha_emision),
            ("timestamp", &self.timestamp),
        ];
        if let Some((field, _)) = required.iter().find(|(_, v)| v.trim().is_empty()) {
            return Err(FiscalError::validation(format!("missing required field: {field}")));
        }
        if DateTime::parse_from_rfc3339(&self.timestamp).is_err() {
            return Err(FiscalError::validation(format!(
                "timestamp is not RFC 3339: {}",
                self.timestamp
            )));
        }
        // 金额按两位小数编码，多余的有效小数位会被静默截断
        if self.total.round_dp(2) != self.total {
            return Err(FiscalError::validation(format!(
                "total has more than two decimals: {}",
                self.total
            )));
        }
        Ok(())
    }

    /// Amount always rendered with two decimals (`107` → `"107.00"`)
    fn payload(&self) -> serde_json::Value {
        json!({
            "numero_factura": self.numero_factura,
            "numero_serie": self.numero_serie,
            "empresa_cif": self.empresa_cif,
            "cliente_identificacion": self.cliente_identificacion,
            "fecha_emision": self.fecha_emision,
            "total": format!("{:.2}", self.total),
            "timestamp": self.timestamp,
        })
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct VeriFactuCodeGenerator;

impl VeriFactuCodeGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Full 64-hex digest of the canonical subset
    pub fn fingerprint(&self, input: &VeriFactuInput) -> FiscalResult<String> {
        input.validate()?;
        Ok(hash::digest_value(&input.payload()))
    }

    /// `VF-` + first 12 hex digits, uppercase
    pub fn generate(&self, input: &VeriFactuInput) -> FiscalResult<String> {
        let fingerprint = self.fingerprint(input)?;
        Ok(format!(
            "{CODE_PREFIX}{}",
            fingerprint[..CODE_HEX_LEN].to_ascii_uppercase()
        ))
    }

    pub fn verify(&self, input: &VeriFactuInput, code: &str) -> bool {
        self.generate(input).is_ok_and(|expected| expected == code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn input() -> VeriFactuInput {
        VeriFactuInput {
            numero_factura: "TCI-XX001/2025".to_string(),
            numero_serie: "F".to_string(),
            empresa_cif: "B35000000".to_string(),
            cliente_identificacion: "12345678Z".to_string(),
            fecha_emision: "2025-03-14".to_string(),
            total: Decimal::from_str("1070.00").unwrap(),
            timestamp: "2025-03-14T09:26:53.589Z".to_string(),
        }
    }

    #[test]
    fn test_code_format() {
        let code = VeriFactuCodeGenerator::new().generate(&input()).unwrap();
        assert_eq!(code.len(), 15);
        assert!(code.starts_with("VF-"));
        assert!(
            code[3..]
                .chars()
                .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c))
        );
    }

    #[test]
    fn test_deterministic_and_matches_fingerprint() {
        let generator = VeriFactuCodeGenerator::new();
        let a = generator.generate(&input()).unwrap();
        let b = generator.generate(&input()).unwrap();
        assert_eq!(a, b);

        let fingerprint = generator.fingerprint(&input()).unwrap();
        assert_eq!(&a[3..], fingerprint[..12].to_ascii_uppercase());
        assert!(generator.verify(&input(), &a));
    }

    #[test]
    fn test_total_scale_does_not_matter() {
        let generator = VeriFactuCodeGenerator::new();
        let mut scaled = input();
        scaled.total = Decimal::from_str("1070").unwrap();
        assert_eq!(
            generator.generate(&input()).unwrap(),
            generator.generate(&scaled).unwrap()
        );
    }

    #[test]
    fn test_sub_cent_totals_rejected() {
        let generator = VeriFactuCodeGenerator::new();

        let mut fine = input();
        fine.total = Decimal::new(107_005, 3);
        assert!(matches!(
            generator.generate(&fine),
            Err(FiscalError::Validation(msg)) if msg.contains("107.005")
        ));
        assert!(generator.fingerprint(&fine).is_err());
        assert!(!generator.verify(&fine, &generator.generate(&input()).unwrap()));

        // 末尾零不算多余精度
        let mut padded = input();
        padded.total = Decimal::from_str("1070.000").unwrap();
        assert_eq!(
            generator.generate(&padded).unwrap(),
            generator.generate(&input()).unwrap()
        );
    }

    #[test]
    fn test_any_field_changes_code() {
        let generator = VeriFactuCodeGenerator::new();
        let base = generator.generate(&input()).unwrap();

        let mut other = input();
        other.timestamp = "2025-03-14T09:26:54.000Z".to_string();
        assert_ne!(base, generator.generate(&other).unwrap());

        let mut other = input();
        other.total = Decimal::from_str("1070.01").unwrap();
        assert_ne!(base, generator.generate(&other).unwrap());
        assert!(!generator.verify(&other, &base));
    }

    #[test]
    fn test_missing_fields_rejected() {
        let generator = VeriFactuCodeGenerator::new();

        let mut missing = input();
        missing.empresa_cif = "  ".to_string();
        assert!(matches!(
            generator.generate(&missing),
            Err(FiscalError::Validation(msg)) if msg.contains("empresa_cif")
        ));

        let mut missing = input();
        missing.timestamp = String::new();
        assert!(generator.generate(&missing).is_err());

        let mut bad = input();
        bad.timestamp = "14/03/2025".to_string();
        assert!(generator.generate(&bad).is_err());
        assert!(!generator.verify(&bad, "VF-000000000000"));
    }
}
