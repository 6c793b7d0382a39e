//! 内容哈希：规范化 JSON + SHA-256
//!
//! `canonicalize` produces a byte-stable text for any JSON value:
//!
//! - object keys ordered by key name (byte order), recursively
//! - array order preserved
//! - no insignificant whitespace
//! - integers in plain decimal; floats with zero fraction and
//!   `|f| <= 2^53` written as integers (`5.0` → `5`); other floats use the
//!   shortest round-trip representation
//!
//! `digest` is `SHA-256(utf8(canonicalize(value)))` as lowercase hex.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt::Write;

use crate::utils::FiscalResult;

/// f64 可精确表示的最大整数绝对值 (2^53)
const MAX_SAFE_INT: f64 = (1_i64 << 53) as f64;

/// Canonical text of a JSON value
pub fn canonicalize(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

/// Canonical text of any serializable value
pub fn canonicalize_serialize<T: Serialize + ?Sized>(value: &T) -> FiscalResult<String> {
    Ok(canonicalize(&serde_json::to_value(value)?))
}

/// SHA-256 of the canonical form, lowercase hex
pub fn digest_value(value: &Value) -> String {
    sha256_hex(canonicalize(value).as_bytes())
}

/// SHA-256 of the canonical form of any serializable value
pub fn digest<T: Serialize + ?Sized>(value: &T) -> FiscalResult<String> {
    Ok(digest_value(&serde_json::to_value(value)?))
}

/// Lowercase hex SHA-256 of raw bytes
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => write_number(n, out),
        // serde_json's Display escapes strings deterministically
        Value::String(_) => {
            let _ = write!(out, "{value}");
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                let _ = write!(out, "{}", Value::String(key.clone()));
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
    }
}

fn write_number(n: &serde_json::Number, out: &mut String) {
    if let Some(i) = n.as_i64() {
        let _ = write!(out, "{i}");
    } else if let Some(u) = n.as_u64() {
        let _ = write!(out, "{u}");
    } else if let Some(f) = n.as_f64()
        && f.fract() == 0.0
        && f.abs() <= MAX_SAFE_INT
    {
        let _ = write!(out, "{}", f as i64);
    } else {
        let _ = write!(out, "{n}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_keys_sorted_recursively() {
        let value = json!({"b": 1, "a": {"z": true, "y": null}, "c": [3, 1, 2]});
        assert_eq!(
            canonicalize(&value),
            r#"{"a":{"y":null,"z":true},"b":1,"c":[3,1,2]}"#
        );
    }

    #[test]
    fn test_key_permutation_is_stable() {
        let a: Value =
            serde_json::from_str(r#"{"numero":"A-XX001/2025","total":"10.00","lineas":[{"x":1,"y":2}]}"#)
                .unwrap();
        let b: Value =
            serde_json::from_str(r#"{"lineas":[{"y":2,"x":1}],"total":"10.00","numero":"A-XX001/2025"}"#)
                .unwrap();
        assert_eq!(canonicalize(&a), canonicalize(&b));
        assert_eq!(digest_value(&a), digest_value(&b));
    }

    #[test]
    fn test_array_order_matters() {
        assert_ne!(digest_value(&json!([1, 2])), digest_value(&json!([2, 1])));
    }

    #[test]
    fn test_integral_float_written_as_integer() {
        assert_eq!(canonicalize(&json!(5.0)), "5");
        assert_eq!(canonicalize(&json!(-12.0)), "-12");
        assert_eq!(canonicalize(&json!(5)), canonicalize(&json!(5.0)));
        assert_eq!(canonicalize(&json!(0.1)), "0.1");
        assert_eq!(canonicalize(&json!(2.5)), "2.5");
        // Beyond 2^53 the float form is kept
        assert_eq!(canonicalize(&json!(1e300)), json!(1e300).to_string());
    }

    #[test]
    fn test_strings_escaped() {
        let value = json!({"s": "Telwagen \"Car\"\nIbérica"});
        assert_eq!(
            canonicalize(&value),
            r#"{"s":"Telwagen \"Car\"\nIbérica"}"#
        );
    }

    #[test]
    fn test_digest_is_lowercase_hex() {
        let hash = digest_value(&json!({"a": 1}));
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
        assert_eq!(hash, sha256_hex(br#"{"a":1}"#));
    }

    #[test]
    fn test_digest_serialize_matches_value() {
        #[derive(Serialize)]
        struct Doc {
            b: i32,
            a: &'static str,
        }
        let hash = digest(&Doc { b: 2, a: "x" }).unwrap();
        assert_eq!(hash, digest_value(&json!({"a": "x", "b": 2})));
    }
}
