//! Monthly-column T12 layout
//!
//! Expected format:
//! - header row: the first row holding a `"Jul 2024"` style month label
//! - column 1: metric name
//! - remaining columns: one per month, optionally one `"YTD"` column
//! - one property per sheet (a trailing "CRES" on the sheet name is dropped)

use tracing::{debug, info};

use super::layout::{
    read_metric_rows, record_guard_counters, record_missing_values, record_unparseable_periods,
    scan_period_columns, JoinedTable, Side,
};
use super::scalars::{NumericGuard, MONTH_HEADER};
use super::validation::{IssueKind, QualityIssue, QualityLog};
use super::{Extraction, IngestOptions};
use crate::error::IngestError;
use crate::workbook::{Cell, Sheet, Workbook};

pub const NAME: &str = "T12_Monthly_Financial";
pub const DESCRIPTION: &str = "T12 monthly property financial reports with one column per month";

pub const EXPECTED_METRICS: &[&str] = &[
    "Property Asking Rent",
    "Effective Rental Income",
    "Gross Scheduled Rent",
    "Vacancy",
    "Loss to lease",
    "Concessions",
    "Delinquency",
    "EBITDA",
    "NOI",
    "Total Expense",
    "Management Fee",
    "Property Taxes",
    "Insurance",
    "Monthly Cash Flow",
];

/// Any of these anywhere in the sheet marks it as a T12 statement
const T12_KEYWORDS: &[&str] = &[
    "effective rental income",
    "gross scheduled rent",
    "noi",
    "ebitda",
    "vacancy",
    "property asking rent",
];

fn is_month_header(cell: &Cell) -> bool {
    cell.as_text()
        .map(|t| MONTH_HEADER.is_match(t.trim()))
        .unwrap_or(false)
}

fn row_has_month_header(cells: &[Cell]) -> bool {
    cells.iter().any(is_month_header)
}

fn find_header_row(sheet: &Sheet) -> Option<usize> {
    sheet.rows().position(row_has_month_header)
}

fn has_t12_keyword(sheet: &Sheet) -> bool {
    sheet.rows().flatten().any(|cell| {
        cell.as_text()
            .map(|t| {
                let lower = t.to_lowercase();
                T12_KEYWORDS.iter().any(|k| lower.contains(k))
            })
            .unwrap_or(false)
    })
}

/// Property name for a sheet: the name without a trailing "CRES" tag
pub fn property_name(sheet_name: &str) -> String {
    let trimmed = sheet_name.trim();
    let stripped = trimmed
        .strip_suffix("CRES")
        .map(|s| s.trim_end_matches([' ', '-', '_']))
        .filter(|s| !s.is_empty())
        .unwrap_or(trimmed);
    stripped.trim().to_string()
}

fn target_sheet<'a>(workbook: &'a Workbook, sheet: Option<&str>) -> Option<&'a Sheet> {
    match sheet {
        Some(name) => workbook.sheet(name),
        None => workbook.first_visible(),
    }
}

pub fn can_process(workbook: &Workbook, sheet: Option<&str>) -> bool {
    let Some(target) = target_sheet(workbook, sheet) else {
        return false;
    };
    find_header_row(target).is_some() && has_t12_keyword(target)
}

pub fn process(
    workbook: &Workbook,
    sheet: Option<&str>,
    options: &IngestOptions,
) -> Result<Extraction, IngestError> {
    let mut issues = QualityLog::new();
    let mut observations = Vec::new();

    let targets: Vec<&Sheet> = match sheet {
        Some(name) => {
            let target = workbook.sheet(name).ok_or_else(|| IngestError::HeaderNotFound {
                format: NAME,
                sheet: name.to_string(),
            })?;
            if find_header_row(target).is_none() {
                return Err(IngestError::HeaderNotFound {
                    format: NAME,
                    sheet: name.to_string(),
                });
            }
            vec![target]
        }
        None => {
            let mut with_header = Vec::new();
            for candidate in workbook.visible_sheets() {
                if find_header_row(candidate).is_some() {
                    with_header.push(candidate);
                } else {
                    issues.record(
                        QualityIssue::new(
                            IssueKind::SheetSkipped,
                            "no row with a month label such as 'Jul 2024'",
                        )
                        .on_sheet(&candidate.name),
                    );
                }
            }
            if with_header.is_empty() {
                let first = workbook
                    .first_visible()
                    .map(|s| s.name.clone())
                    .unwrap_or_default();
                return Err(IngestError::HeaderNotFound {
                    format: NAME,
                    sheet: first,
                });
            }
            with_header
        }
    };

    info!("{}: processing {} sheet(s)", NAME, targets.len());
    for target in targets {
        let extracted = extract_sheet(target, options, &mut issues);
        if extracted.is_empty() {
            issues.record(
                QualityIssue::new(IssueKind::EmptyResult, "no usable metric rows").on_sheet(&target.name),
            );
        }
        observations.extend(extracted);
    }

    if observations.is_empty() {
        return Err(IngestError::EmptyResult {
            format: NAME,
            scope: "workbook".to_string(),
        });
    }

    Ok(Extraction {
        observations,
        issues,
    })
}

fn extract_sheet(
    sheet: &Sheet,
    options: &IngestOptions,
    issues: &mut QualityLog,
) -> Vec<crate::models::MetricObservation> {
    let Some(header_idx) = find_header_row(sheet) else {
        return Vec::new();
    };
    debug!("'{}': header at row {}", sheet.name, header_idx + 1);

    let (periods, rejected) = scan_period_columns(sheet, header_idx, 1..sheet.width());
    record_unparseable_periods(&sheet.name, &rejected, issues);

    let rows = read_metric_rows(sheet, header_idx, row_has_month_header, issues);
    let mut guard = NumericGuard::new(options.settings.overflow_limit);
    let mut table = JoinedTable::new();
    table.load_block(sheet, &rows, &periods, Side::Actual, None, &mut guard);

    let window = table.t12_window(options);
    let property = property_name(&sheet.name);
    let observations = table.into_observations(&property, &sheet.name, window);

    record_guard_counters(&sheet.name, &guard, issues);
    record_missing_values(&sheet.name, &rows, &observations, issues);
    debug!(
        "'{}': {} metric rows, {} observations",
        sheet.name,
        rows.len(),
        observations.len()
    );
    observations
}
