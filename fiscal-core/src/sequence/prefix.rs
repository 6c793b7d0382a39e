//! 单据编号前缀与格式
//!
//! ```text
//! "Telwagen Car Ibérica S.L." + "Calle Sin Token 1" → "TCI-XX"
//! prefix + 001 + "/" + 2025                        → "TCI-XX001/2025"
//! ```

use std::sync::LazyLock;

use regex::Regex;

/// Address token fallback
const DEFAULT_TOKEN: &str = "XX";
const INITIALS_LEN: usize = 3;
const PAD_CHAR: char = 'X';

/// First bare two-letter uppercase token in an address (e.g. province code)
static ADDRESS_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Z]{2})\b").expect("static regex"));

/// Trailing `NNN/YYYY` of a formatted number
static FORMATTED_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)/(\d{4})$").expect("static regex"));

/// Up to three initials (first letter of each word), uppercase, padded with `X`
pub fn company_initials(name: &str) -> String {
    let mut initials: String = name
        .split_whitespace()
        .filter_map(|word| word.chars().find(|c| c.is_alphanumeric()))
        .flat_map(char::to_uppercase)
        .take(INITIALS_LEN)
        .collect();
    while initials.chars().count() < INITIALS_LEN {
        initials.push(PAD_CHAR);
    }
    initials
}

/// Two-letter address token, `XX` when absent
pub fn address_token(address: &str) -> &str {
    ADDRESS_TOKEN
        .captures(address)
        .and_then(|c| c.get(1))
        .map_or(DEFAULT_TOKEN, |m| m.as_str())
}

/// `{initials}-{token}`
pub fn document_prefix(company_name: &str, address: &str) -> String {
    format!("{}-{}", company_initials(company_name), address_token(address))
}

/// `{prefix}{number:03}/{year}`
pub fn format_number(prefix: &str, number: i64, year: i32) -> String {
    format!("{prefix}{number:03}/{year}")
}

/// Parse the trailing `(number, year)` of a formatted document number
pub fn parse_formatted(formatted: &str) -> Option<(i64, i32)> {
    let caps = FORMATTED_SUFFIX.captures(formatted)?;
    let number = caps.get(1)?.as_str().parse().ok()?;
    let year = caps.get(2)?.as_str().parse().ok()?;
    Some((number, year))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initials() {
        assert_eq!(company_initials("Telwagen Car Ibérica S.L."), "TCI");
        assert_eq!(company_initials("autos canarias"), "ACX");
        assert_eq!(company_initials("Motor"), "MXX");
        assert_eq!(company_initials(""), "XXX");
        assert_eq!(company_initials("  (Grupo)  Sur  "), "GSX");
    }

    #[test]
    fn test_address_token() {
        assert_eq!(address_token("Calle Mayor 5, Las Palmas GC"), "GC");
        assert_eq!(address_token("Avda. Marítima 12, TF, España"), "TF");
        assert_eq!(address_token("Calle Sin Token 1"), "XX");
        // Longer uppercase runs are not bare tokens
        assert_eq!(address_token("POLIGONO ARINAGA"), "XX");
        assert_eq!(address_token(""), "XX");
    }

    #[test]
    fn test_prefix_and_format() {
        let prefix = document_prefix("Telwagen Car Ibérica S.L.", "Calle Sin Token 1");
        assert_eq!(prefix, "TCI-XX");
        assert_eq!(format_number(&prefix, 1, 2025), "TCI-XX001/2025");
        assert_eq!(format_number(&prefix, 42, 2025), "TCI-XX042/2025");
        assert_eq!(format_number(&prefix, 1234, 2025), "TCI-XX1234/2025");
    }

    #[test]
    fn test_parse_formatted() {
        assert_eq!(parse_formatted("TCI-XX001/2025"), Some((1, 2025)));
        assert_eq!(parse_formatted("ABC-GC1234/2024"), Some((1234, 2024)));
        assert_eq!(parse_formatted("TCI-XX001-2025"), None);
        assert_eq!(parse_formatted("sin numero"), None);
    }
}
