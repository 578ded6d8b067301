//! Category-grouped text summary of a property's latest month
//!
//! Used by the `summary` command and as plain-text context for a narrative
//! layer. Sections are kept structured so the CLI can style the headings.

use chrono::NaiveDate;
use itertools::Itertools;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

use super::analysis::{find_row, ASKING_RENT, GROSS_SCHEDULED_RENT, LOSS_TO_LEASE, VACANCY};
use super::stats::{pct_change_or_zero, safe_div};
use crate::config::AnalysisSettings;
use crate::error::AnalysisError;
use crate::timeseries::{CanonicalRow, CanonicalTimeSeries};
use crate::utils::format_currency;

const EFFECTIVE_RENTAL_INCOME: &str = "Effective Rental Income";

/// Latest-month categories and the name fragments that place a metric in them.
/// A metric lands in the first category with a matching fragment.
const CATEGORIES: &[(&str, &[&str])] = &[
    (
        "REVENUE PERFORMANCE",
        &[
            "Rent",
            "Income",
            "Gross Scheduled Rent",
            "Effective Rental Income",
            "Other - Income",
            "Other Income",
        ],
    ),
    (
        "REVENUE LOSS FACTORS",
        &["Loss to lease", "Vacancy", "Concessions", "Delinquency", "Non Revenue Units"],
    ),
    (
        "EXPENSES",
        &[
            "General & Admin.",
            "Management Fee",
            "Payroll",
            "Insurance",
            "Property Taxes",
            "Leasing & Marketing",
            "Professional fees",
            "Landscaping",
            "Security & Life Safety",
            "Repairs & Maintenance",
            "Unit T/O Refurbishment",
            "Utilities",
            "Trash Removal",
            "Miscellaneous",
            "Other - Expense",
            "Total Expense",
        ],
    ),
    (
        "NOI & BELOW LINE",
        &[
            "EBITDA (NOI)",
            "Repl. Reserve Fund",
            "State Franchise Fee",
            "Partnership Professional Fees",
            "Asset Management Fees",
            "Debt Service",
            "Other - Below Line",
            "Total Below Line",
            "Renovations",
            "Monthly Cash Flow",
        ],
    ),
    (
        "BALANCE SHEET & ESCROW",
        &[
            "Operating Account Balance",
            "Interest Reserve Account",
            "Undeposited Funds",
            "Security Deposits",
            "Total Cash",
            "Open ARR",
            "Escrow - Taxes",
            "Escrow - Insurance",
            "Escrow - Other",
            "Escrow - RR",
            "Open AP",
            "Total Equity",
            "Total Debt",
        ],
    ),
];

const TREND_METRICS: &[&str] = &[
    EFFECTIVE_RENTAL_INCOME,
    ASKING_RENT,
    VACANCY,
    "Delinquency",
    LOSS_TO_LEASE,
];

const YTD_REVENUE_WORDS: &[&str] = &["income", "rent", "revenue"];
const YTD_EXPENSE_WORDS: &[&str] = &["expense", "cost", "fee", "tax", "payroll"];

fn squash(text: &str) -> String {
    text.to_lowercase().chars().filter(|c| !c.is_whitespace()).collect()
}

fn bullet(metric: &str, value: f64) -> String {
    format!("• {}: {}", metric, format_currency(value))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiSection {
    pub title: String,
    pub lines: Vec<String>,
}

impl KpiSection {
    fn new(title: impl Into<String>, lines: Vec<String>) -> Self {
        Self {
            title: title.into(),
            lines,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiSummary {
    pub property: String,
    pub sheet: String,
    pub month: NaiveDate,
    pub sections: Vec<KpiSection>,
}

impl KpiSummary {
    /// Summarizes the latest month carrying monthly rows for `property`
    pub fn build(
        table: &CanonicalTimeSeries,
        property: &str,
        settings: &AnalysisSettings,
    ) -> Result<Self, AnalysisError> {
        let slice = table.property_slice(property)?;
        let monthly: Vec<&CanonicalRow> = slice.monthly().collect();
        let ytd: Vec<&CanonicalRow> = slice.ytd().collect();
        let Some(&month) = slice.months().last() else {
            return Err(AnalysisError::NoMonthlyData(slice.property.clone()));
        };
        let latest: Vec<&CanonicalRow> = monthly
            .iter()
            .copied()
            .filter(|r| r.month() == Some(month))
            .collect();

        let mut sections = category_sections(&latest);

        let trends = trend_lines(&monthly);
        sections.push(KpiSection::new(
            "TREND ANALYSIS",
            if trends.is_empty() {
                vec!["• Insufficient data for trend analysis".to_string()]
            } else {
                trends
            },
        ));

        let ratios = ratio_lines(&latest, settings.absolute_loss_numerators);
        sections.push(KpiSection::new(
            "KEY PERFORMANCE RATIOS",
            if ratios.is_empty() {
                vec!["• Unable to calculate performance ratios".to_string()]
            } else {
                ratios
            },
        ));

        sections.extend(ytd_sections(&ytd, month));

        Ok(Self {
            property: slice.property.clone(),
            sheet: slice
                .rows
                .first()
                .map(|r| r.observation.sheet.clone())
                .unwrap_or_default(),
            month,
            sections,
        })
    }

    pub fn section(&self, title: &str) -> Option<&KpiSection> {
        self.sections.iter().find(|s| s.title == title)
    }

    pub fn heading(&self) -> String {
        format!("T12 PROPERTY ANALYSIS - {}", self.month.format("%B %Y"))
    }
}

impl fmt::Display for KpiSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== {} ===", self.heading())?;
        writeln!(f, "Property: {}", self.property)?;
        writeln!(f, "Sheet: {}", self.sheet)?;
        for section in &self.sections {
            writeln!(f)?;
            writeln!(f, "=== {} ===", section.title)?;
            for line in &section.lines {
                writeln!(f, "{}", line)?;
            }
        }
        Ok(())
    }
}

fn value_of(rows: &[&CanonicalRow], metric: &str) -> Option<f64> {
    find_row(rows, metric).and_then(|r| r.actual())
}

fn category_sections(latest: &[&CanonicalRow]) -> Vec<KpiSection> {
    let metrics: Vec<&str> = latest.iter().map(|r| r.metric()).unique().collect();
    let mut used: HashSet<&str> = HashSet::new();
    let mut sections = Vec::new();

    for (title, patterns) in CATEGORIES {
        let mut lines = Vec::new();
        for pattern in patterns.iter() {
            let needle = squash(pattern);
            for metric in &metrics {
                if used.contains(metric) || !squash(metric).contains(&needle) {
                    continue;
                }
                if let Some(value) = value_of(latest, metric) {
                    lines.push(bullet(metric, value));
                    used.insert(*metric);
                }
            }
        }
        if !lines.is_empty() {
            sections.push(KpiSection::new(*title, lines));
        }
    }

    let other: Vec<String> = metrics
        .iter()
        .filter(|m| !used.contains(*m))
        .filter_map(|m| value_of(latest, m).map(|v| bullet(m, v)))
        .collect();
    if !other.is_empty() {
        sections.push(KpiSection::new("OTHER METRICS", other));
    }
    sections
}

/// Last two months of each trend metric
fn trend_lines(monthly: &[&CanonicalRow]) -> Vec<String> {
    TREND_METRICS
        .iter()
        .filter_map(|name| {
            let resolved = find_row(monthly, name)?.metric();
            let values: Vec<f64> = monthly
                .iter()
                .filter(|r| r.metric() == resolved)
                .sorted_by_key(|r| r.month())
                .filter_map(|r| r.actual())
                .collect();
            let [.., previous, latest] = values.as_slice() else {
                return None;
            };
            let change = latest - previous;
            let direction = if change > 0.0 { "increased" } else { "decreased" };
            Some(format!(
                "• {}: {} by {} ({:.1}%)",
                name,
                direction,
                format_currency(change.abs()),
                pct_change_or_zero(*latest, *previous).abs()
            ))
        })
        .collect()
}

fn ratio_lines(latest: &[&CanonicalRow], absolute_losses: bool) -> Vec<String> {
    let present = |name: &str| value_of(latest, name).filter(|v| *v != 0.0);
    let loss = |v: f64| if absolute_losses { v.abs() } else { v };
    let asking = present(ASKING_RENT).filter(|v| *v > 0.0);
    let effective = present(EFFECTIVE_RENTAL_INCOME);
    let gross = present(GROSS_SCHEDULED_RENT).filter(|v| *v > 0.0);

    let rate = |numerator: Option<f64>, denominator: Option<f64>| {
        safe_div(numerator? * 100.0, denominator?)
    };

    [
        ("Collection Rate", rate(effective, asking)),
        ("Loss-to-Lease Rate", rate(present(LOSS_TO_LEASE).map(loss), asking)),
        ("Vacancy Rate", rate(present(VACANCY).map(loss), asking)),
        ("Economic Occupancy Rate", rate(effective, gross)),
    ]
    .into_iter()
    .filter_map(|(label, value)| value.map(|v| format!("• {}: {:.1}%", label, v)))
    .collect()
}

fn ytd_sections(ytd: &[&CanonicalRow], month: NaiveDate) -> Vec<KpiSection> {
    if ytd.is_empty() {
        return Vec::new();
    }

    let mut revenue = Vec::new();
    let mut expenses = Vec::new();
    let mut other = Vec::new();
    for metric in ytd.iter().map(|r| r.metric()).unique() {
        let Some(value) = value_of(ytd, metric) else {
            continue;
        };
        let line = format!("• {} (cumulative YTD): {}", metric, format_currency(value));
        let lower = metric.to_lowercase();
        if YTD_REVENUE_WORDS.iter().any(|w| lower.contains(w)) {
            revenue.push(line);
        } else if YTD_EXPENSE_WORDS.iter().any(|w| lower.contains(w)) {
            expenses.push(line);
        } else {
            other.push(line);
        }
    }

    let mut sections = vec![KpiSection::new(
        "YEAR-TO-DATE (YTD) CUMULATIVE TOTALS",
        vec![format!(
            "YTD values are cumulative from January 1st through {}; they are not a month.",
            month.format("%B %Y")
        )],
    )];
    for (title, lines) in [
        ("YTD REVENUE & INCOME", revenue),
        ("YTD EXPENSES", expenses),
        ("YTD OTHER METRICS", other),
    ] {
        if !lines.is_empty() {
            sections.push(KpiSection::new(title, lines));
        }
    }
    sections
}
