//! Money and period token parsing
//!
//! Both parsers return `None` on anything they do not understand. Callers
//! decide whether that is a quality issue.

use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::workbook::{excel_serial_to_date, Cell};

/// Serial day numbers in this range are read as dates (roughly 1968 to 2036)
const SERIAL_DATE_RANGE: std::ops::RangeInclusive<f64> = 25000.0..=50000.0;

/// Tokens that mean "no value" rather than a parse failure
const BLANK_TOKENS: &[&str] = &["-", "--", "n/a", "na", "none", "null", "nan"];

/// Exactly "Jul 2024": the header marker the monthly-column layout uses
pub static MONTH_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z]{3} \d{4}$").expect("valid month header regex"));

static MONTH_YEAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z]{3,9})\.?[\s\-'/]+(\d{2}|\d{4})$").expect("valid month-year regex")
});

/// Trailing column status such as "Actual" or "Budget" in "Jul 2024 Actual"
static STATUS_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)[\s\-_(]+(actuals?|act|estimated?|est|budget(?:ed)?|bgt|forecast|fcst|projected|proj|plan)\.?\)?$")
        .expect("valid status suffix regex")
});

static US_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,2})[/-](\d{1,2})[/-](\d{2}|\d{4})$").expect("valid US date regex")
});

static ISO_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{4})-(\d{1,2})-(\d{1,2})(?:[T ].*)?$").expect("valid ISO date regex")
});

const MONTH_NAMES: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

/// A column header, reduced to what it means for the time series
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PeriodToken {
    /// First day of a calendar month
    Month(NaiveDate),
    /// The cumulative year-to-date column
    Ytd,
}

impl PeriodToken {
    pub fn month(&self) -> Option<NaiveDate> {
        match self {
            PeriodToken::Month(date) => Some(*date),
            PeriodToken::Ytd => None,
        }
    }
}

pub fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

fn rebase_year(digits: &str) -> Option<i32> {
    let year: i32 = digits.parse().ok()?;
    Some(if digits.len() == 2 { 2000 + year } else { year })
}

fn month_from_name(name: &str) -> Option<u32> {
    let lower = name.to_lowercase();
    if lower.len() < 3 {
        return None;
    }
    MONTH_NAMES
        .iter()
        .position(|full| {
            full.starts_with(&lower) && (lower.len() == 3 || lower == "sept" || lower == **full)
        })
        .map(|idx| idx as u32 + 1)
}

fn month_start(year: i32, month: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1)
}

/// Parses a formatted currency token.
///
/// `"$(1,234.56)"` is -1234.56, `"$1,234"` is 1234.0; blanks and `"N/A"`
/// are `None`.
pub fn parse_money(token: &str) -> Option<f64> {
    let trimmed = token.trim();
    if trimmed.is_empty() || BLANK_TOKENS.contains(&trimmed.to_lowercase().as_str()) {
        return None;
    }

    let mut cleaned: String = trimmed
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | ' ' | '\u{a0}'))
        .collect();

    let mut negate = false;
    if cleaned.starts_with('(') && cleaned.ends_with(')') && cleaned.len() > 2 {
        negate = true;
        cleaned = cleaned[1..cleaned.len() - 1].to_string();
    }
    if let Some(rest) = cleaned.strip_prefix("-(") {
        if let Some(inner) = rest.strip_suffix(')') {
            cleaned = inner.to_string();
            negate = true;
        }
    }

    let value = Decimal::from_str(&cleaned)
        .or_else(|_| Decimal::from_scientific(&cleaned))
        .ok()
        .and_then(|d| d.to_f64())
        .or_else(|| cleaned.parse::<f64>().ok().filter(|f| f.is_finite()))?;

    Some(if negate { -value } else { value })
}

/// Parses a textual period token.
///
/// Accepts `Jul 2024`, `Jan-24`, `July 2024`, `07/31/2024`, `2024-07-31`
/// and Excel serial numbers. Every date is normalized to the first of its
/// month. `"YTD"` in any case is the cumulative marker. A trailing column
/// status (`"Jul 2024 Actual"`, `"Jan-24 Budget"`) is ignored.
pub fn parse_period(token: &str) -> Option<PeriodToken> {
    let token = token.trim();
    let trimmed = STATUS_SUFFIX.replace(token, "");
    let trimmed = trimmed.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.eq_ignore_ascii_case("ytd") {
        return Some(PeriodToken::Ytd);
    }

    if let Some(caps) = MONTH_YEAR.captures(trimmed) {
        let month = month_from_name(&caps[1])?;
        let year = rebase_year(&caps[2])?;
        return month_start(year, month).map(PeriodToken::Month);
    }

    if let Some(caps) = US_DATE.captures(trimmed) {
        let month: u32 = caps[1].parse().ok()?;
        let day: u32 = caps[2].parse().ok()?;
        let year = rebase_year(&caps[3])?;
        let date = NaiveDate::from_ymd_opt(year, month, day)?;
        return Some(PeriodToken::Month(first_of_month(date)));
    }

    if let Some(caps) = ISO_DATE.captures(trimmed) {
        let year: i32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let day: u32 = caps[3].parse().ok()?;
        let date = NaiveDate::from_ymd_opt(year, month, day)?;
        return Some(PeriodToken::Month(first_of_month(date)));
    }

    trimmed.parse::<f64>().ok().and_then(period_from_serial)
}

fn period_from_serial(serial: f64) -> Option<PeriodToken> {
    if !SERIAL_DATE_RANGE.contains(&serial) {
        return None;
    }
    excel_serial_to_date(serial).map(|d| PeriodToken::Month(first_of_month(d)))
}

/// Reads a header cell as a period
pub fn period_from_cell(cell: &Cell) -> Option<PeriodToken> {
    match cell {
        Cell::Date(date) => Some(PeriodToken::Month(first_of_month(*date))),
        Cell::Number(n) => period_from_serial(*n),
        Cell::Text(s) => parse_period(s),
        Cell::Empty | Cell::Bool(_) | Cell::Error(_) => None,
    }
}

/// Renders a month the way canonical `Period` labels read (`Jul 2024`)
pub fn period_label(date: NaiveDate) -> String {
    date.format("%b %Y").to_string()
}

/// Numeric cell reader that counts what it had to coerce.
///
/// Values beyond the overflow limit are spreadsheet blank sentinels and read
/// as zero.
#[derive(Debug, Clone)]
pub struct NumericGuard {
    overflow_limit: f64,
    pub parse_failures: usize,
    pub overflow_sentinels: usize,
}

impl NumericGuard {
    pub fn new(overflow_limit: f64) -> Self {
        Self {
            overflow_limit,
            parse_failures: 0,
            overflow_sentinels: 0,
        }
    }

    pub fn read(&mut self, cell: &Cell) -> Option<f64> {
        let value = match cell {
            Cell::Empty => return None,
            Cell::Number(n) => {
                if !n.is_finite() {
                    self.parse_failures += 1;
                    return None;
                }
                *n
            }
            Cell::Text(s) => match parse_money(s) {
                Some(v) => v,
                None => {
                    let lower = s.trim().to_lowercase();
                    if !lower.is_empty() && !BLANK_TOKENS.contains(&lower.as_str()) {
                        self.parse_failures += 1;
                    }
                    return None;
                }
            },
            Cell::Date(_) | Cell::Bool(_) | Cell::Error(_) => {
                self.parse_failures += 1;
                return None;
            }
        };

        Some(self.clamp(value))
    }

    /// Applies the overflow guard to an already-numeric value
    pub fn clamp(&mut self, value: f64) -> f64 {
        if value.abs() > self.overflow_limit {
            self.overflow_sentinels += 1;
            0.0
        } else {
            value
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn month(y: i32, m: u32) -> Option<PeriodToken> {
        Some(PeriodToken::Month(NaiveDate::from_ymd_opt(y, m, 1).unwrap()))
    }

    #[test]
    fn test_parse_money_accounting_notation() {
        assert_eq!(parse_money("$(1,234.56)"), Some(-1234.56));
        assert_eq!(parse_money("$1,234"), Some(1234.0));
        assert_eq!(parse_money("-$500.25"), Some(-500.25));
        assert_eq!(parse_money(" 1,000,000 "), Some(1_000_000.0));
        assert_eq!(parse_money("(75)"), Some(-75.0));
    }

    #[test]
    fn test_parse_money_blanks() {
        assert_eq!(parse_money("N/A"), None);
        assert_eq!(parse_money(""), None);
        assert_eq!(parse_money("   "), None);
        assert_eq!(parse_money("-"), None);
        assert_eq!(parse_money("abc"), None);
    }

    #[test]
    fn test_parse_money_scientific() {
        assert_eq!(parse_money("1e3"), Some(1000.0));
    }

    #[test]
    fn test_parse_period_month_year() {
        assert_eq!(parse_period("Jul 2024"), month(2024, 7));
        assert_eq!(parse_period("Jan-24"), month(2024, 1));
        assert_eq!(parse_period("July 2024"), month(2024, 7));
        assert_eq!(parse_period("Sept 2023"), month(2023, 9));
        assert_eq!(parse_period("Dec 99"), month(2099, 12));
    }

    #[test]
    fn test_parse_period_ignores_status_suffix() {
        assert_eq!(parse_period("Jul 2024 Actual"), month(2024, 7));
        assert_eq!(parse_period("Jan-24 Budget"), month(2024, 1));
        assert_eq!(parse_period("Mar 2025 (Forecast)"), month(2025, 3));
        assert_eq!(parse_period("07/31/2024 est."), month(2024, 7));
        assert_eq!(parse_period("YTD Actuals"), Some(PeriodToken::Ytd));
        assert_eq!(parse_period("Budget"), None);
        assert_eq!(parse_period("Widgets Budget"), None);
    }

    #[test]
    fn test_parse_period_ytd_marker() {
        assert_eq!(parse_period("YTD"), Some(PeriodToken::Ytd));
        assert_eq!(parse_period("ytd"), Some(PeriodToken::Ytd));
        assert_eq!(PeriodToken::Ytd.month(), None);
    }

    #[test]
    fn test_parse_period_numeric_dates() {
        assert_eq!(parse_period("07/31/2024"), month(2024, 7));
        assert_eq!(parse_period("7/31/24"), month(2024, 7));
        assert_eq!(parse_period("2024-12-31"), month(2024, 12));
        assert_eq!(parse_period("2024-12-31 00:00:00"), month(2024, 12));
        assert_eq!(parse_period("45658"), month(2025, 1));
    }

    #[test]
    fn test_parse_period_rejects_noise() {
        assert_eq!(parse_period("Budget"), None);
        assert_eq!(parse_period("Actuals"), None);
        assert_eq!(parse_period("Foo 2024"), None);
        assert_eq!(parse_period("13/01/2024"), None);
        assert_eq!(parse_period("12"), None);
    }

    #[test]
    fn test_period_from_cell() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        assert_eq!(period_from_cell(&Cell::Date(d)), month(2024, 3));
        assert_eq!(period_from_cell(&Cell::Number(45658.0)), month(2025, 1));
        assert_eq!(period_from_cell(&Cell::Number(2024.0)), None);
        assert_eq!(period_from_cell(&Cell::Empty), None);
    }

    #[test]
    fn test_month_header_pattern() {
        assert!(MONTH_HEADER.is_match("Jul 2024"));
        assert!(!MONTH_HEADER.is_match("July 2024"));
        assert!(!MONTH_HEADER.is_match("Jul-24"));
    }

    #[test]
    fn test_numeric_guard_counts_coercions() {
        let mut guard = NumericGuard::new(1e15);
        assert_eq!(guard.read(&Cell::Number(-2.5e18)), Some(0.0));
        assert_eq!(guard.read(&Cell::text("$(10)")), Some(-10.0));
        assert_eq!(guard.read(&Cell::text("oops")), None);
        assert_eq!(guard.read(&Cell::text("N/A")), None);
        assert_eq!(guard.read(&Cell::Empty), None);
        assert_eq!(guard.overflow_sentinels, 1);
        assert_eq!(guard.parse_failures, 1);

        assert_eq!(guard.read(&Cell::Error("#REF!".to_string())), None);
        assert_eq!(guard.parse_failures, 2);
    }

    #[test]
    fn test_period_label() {
        let d = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
        assert_eq!(period_label(d), "Jul 2024");
    }
}
