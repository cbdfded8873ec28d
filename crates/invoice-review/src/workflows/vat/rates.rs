use std::sync::OnceLock;

use regex::Regex;

use crate::workflows::intake::FieldValue;

/// Tolerance used when deciding whether an extracted rate is zero.
const ZERO_RATE_EPSILON: f64 = 1e-9;

fn rate_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\d+(?:[.,]\d+)?").expect("rate pattern compiles"))
}

/// Every numeric rate embedded in a `vat_rates` value, accepting comma decimals.
pub fn extract_rates(value: &FieldValue) -> Vec<f64> {
    match value {
        FieldValue::Null => Vec::new(),
        FieldValue::Number(rate) => vec![*rate],
        FieldValue::List(items) => items.iter().flat_map(extract_rates).collect(),
        FieldValue::Text(text) => rate_pattern()
            .find_iter(text)
            .filter_map(|token| token.as_str().replace(',', ".").parse::<f64>().ok())
            .collect(),
    }
}

pub fn has_zero_rate(value: &FieldValue) -> bool {
    extract_rates(value)
        .into_iter()
        .any(|rate| rate.abs() < ZERO_RATE_EPSILON)
}
