//! Utility functions for formatting and common operations
//!
//! Centralized formatting for currency, percentages and metric keys so the
//! CLI tables, the KPI summary and the JSON payload agree.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// Format as dollars using US conventions.
///
/// - Thousands separator: `,`
/// - Decimal separator: `.`
/// - Negative sign before the symbol: `-$1,234.56`
///
/// # Examples
/// ```
/// use t12_ledger::utils::format_currency;
///
/// assert_eq!(format_currency(1234.56), "$1,234.56");
/// assert_eq!(format_currency(-0.125), "-$0.13");
/// ```
pub fn format_currency(value: f64) -> String {
    let rounded = Decimal::from_f64(value)
        .map(|d| d.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
        .unwrap_or(Decimal::ZERO);
    let is_negative = rounded < Decimal::ZERO;

    let formatted = format!("{:.2}", rounded.abs());
    let (integer_part, decimal_part) = formatted.split_once('.').unwrap_or((formatted.as_str(), "00"));

    // Add thousands separators to integer part
    let with_separators: String = integer_part
        .chars()
        .rev()
        .enumerate()
        .flat_map(|(i, c)| {
            if i > 0 && i % 3 == 0 {
                vec![',', c]
            } else {
                vec![c]
            }
        })
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();

    let sign = if is_negative { "-" } else { "" };
    format!("{}${}.{}", sign, with_separators, decimal_part)
}

/// Format an optional amount, "N/A" when absent
pub fn format_currency_opt(value: Option<f64>) -> String {
    value.map(format_currency).unwrap_or_else(|| "N/A".to_string())
}

/// Format a percentage with two decimals: "12.34%", "N/A" when absent
pub fn format_percent(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.2}%", v),
        None => "N/A".to_string(),
    }
}

/// Same as `format_percent` with an explicit "+" for positive changes
pub fn format_signed_percent(value: Option<f64>) -> String {
    match value {
        Some(v) if v > 0.0 => format!("+{:.2}%", v),
        other => format_percent(other),
    }
}

/// JSON key for a metric name: "EBITDA (NOI)" becomes "ebitda_noi"
pub fn metric_key(name: &str) -> String {
    name.to_lowercase()
        .replace(' ', "_")
        .replace('&', "and")
        .replace(['(', ')', '.'], "")
}
