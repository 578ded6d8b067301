//! Standard fixed-row T12 workbook
//!
//! Expected format, per visible sheet (sheet name = property name):
//! - Row 7: headers
//! - Column 1 (index 0): metric
//! - Columns 2-13 (index 1-12): monthly actuals
//! - Column 14 (index 13): YTD actual
//! - Column 15 (index 14): YTD budget
//! - Columns 18-29 (index 17-28): monthly budgets
//!
//! A requested sheet that is missing or hidden falls back to every visible
//! non-summary sheet.

use std::ops::RangeInclusive;
use tracing::{debug, info, warn};

use super::layout::{
    budget_allowed, read_metric_rows, record_guard_counters, record_missing_values,
    record_unparseable_periods, scan_period_columns, JoinedTable, Side,
};
use super::scalars::{NumericGuard, PeriodToken};
use super::validation::{IssueKind, QualityIssue, QualityLog};
use super::{Extraction, IngestOptions};
use crate::error::IngestError;
use crate::models::MetricObservation;
use crate::workbook::{Cell, Sheet, Workbook};

pub const NAME: &str = "Standard_T12_Workbook";
pub const DESCRIPTION: &str = "Standard T12 format with fixed row 7 headers and budget columns";

pub const EXPECTED_METRICS: &[&str] = &["Property Asking Rent", "Gross Scheduled Rent", "EBITDA (NOI)"];

const HEADER_ROW: usize = 6;
const FIRST_DATA_ROW: usize = 7;
const ACTUAL_COLUMNS: RangeInclusive<usize> = 1..=12;
const YTD_ACTUAL_COLUMN: usize = 13;
const YTD_BUDGET_COLUMN: usize = 14;
const BUDGET_COLUMNS: RangeInclusive<usize> = 17..=28;

/// First data row must start with one of these
const ROW_8_MARKERS: &[&str] = &["Property Asking Rent", "Rent", "Income"];

fn header_matches(sheet: &Sheet) -> bool {
    let has_ytd = sheet.cell(HEADER_ROW, YTD_ACTUAL_COLUMN).display().to_uppercase() == "YTD";
    let has_budget = sheet.cell(HEADER_ROW, YTD_BUDGET_COLUMN).display().to_uppercase() == "BUDGET";
    let first_metric = sheet.cell(FIRST_DATA_ROW, 0).display();
    let has_common_metric = ROW_8_MARKERS.iter().any(|m| first_metric.contains(m));
    has_ytd && has_budget && has_common_metric
}

pub fn can_process(workbook: &Workbook, sheet: Option<&str>) -> bool {
    let check = sheet
        .and_then(|name| workbook.visible_sheets().find(|s| s.name == name))
        .or_else(|| workbook.visible_sheets().next());
    match check {
        Some(target) => header_matches(target),
        None => false,
    }
}

fn is_excluded(name: &str, options: &IngestOptions) -> bool {
    options
        .settings
        .excluded_sheets
        .iter()
        .any(|excluded| excluded.eq_ignore_ascii_case(name.trim()))
}

pub fn process(
    workbook: &Workbook,
    sheet: Option<&str>,
    options: &IngestOptions,
) -> Result<Extraction, IngestError> {
    let mut issues = QualityLog::new();

    let named = sheet.and_then(|name| workbook.visible_sheets().find(|s| s.name == name));
    if let (Some(name), None) = (sheet, named) {
        warn!("Sheet '{}' is missing or hidden; processing all visible sheets", name);
        issues.record(
            QualityIssue::new(
                IssueKind::SheetSkipped,
                "requested sheet is missing or hidden, all visible sheets were processed instead",
            )
            .on_sheet(name),
        );
    }

    let targets: Vec<&Sheet> = match named {
        Some(target) => vec![target],
        None => workbook
            .visible_sheets()
            .filter(|s| {
                let excluded = is_excluded(&s.name, options);
                if excluded {
                    debug!("Skipping summary sheet '{}'", s.name);
                }
                !excluded
            })
            .collect(),
    };

    info!("{}: processing {} sheet(s)", NAME, targets.len());
    let mut observations = Vec::new();
    for target in targets {
        if target.height() <= FIRST_DATA_ROW {
            issues.record(
                QualityIssue::new(
                    IssueKind::SheetSkipped,
                    format!("fewer than {} rows", FIRST_DATA_ROW + 1),
                )
                .on_sheet(&target.name),
            );
            continue;
        }

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

fn is_header_like(cells: &[Cell]) -> bool {
    cells
        .get(YTD_ACTUAL_COLUMN)
        .map(|c| c.display().eq_ignore_ascii_case("ytd"))
        .unwrap_or(false)
        && cells
            .get(YTD_BUDGET_COLUMN)
            .map(|c| c.display().eq_ignore_ascii_case("budget"))
            .unwrap_or(false)
}

fn extract_sheet(sheet: &Sheet, options: &IngestOptions, issues: &mut QualityLog) -> Vec<MetricObservation> {
    let (actual_periods, mut rejected) = scan_period_columns(sheet, HEADER_ROW, ACTUAL_COLUMNS);
    let (budget_periods, budget_rejected) = scan_period_columns(sheet, HEADER_ROW, BUDGET_COLUMNS);
    rejected.extend(budget_rejected);
    record_unparseable_periods(&sheet.name, &rejected, issues);

    let rows = read_metric_rows(sheet, HEADER_ROW, is_header_like, issues);
    let allowed = budget_allowed(&rows, &options.settings.budget_cutoff_marker);

    let mut guard = NumericGuard::new(options.settings.overflow_limit);
    let mut table = JoinedTable::new();
    table.load_block(sheet, &rows, &actual_periods, Side::Actual, None, &mut guard);
    table.load_block(sheet, &rows, &budget_periods, Side::Budget, Some(&allowed), &mut guard);
    table.load_block(
        sheet,
        &rows,
        &[(YTD_ACTUAL_COLUMN, PeriodToken::Ytd)],
        Side::Actual,
        None,
        &mut guard,
    );
    table.load_block(
        sheet,
        &rows,
        &[(YTD_BUDGET_COLUMN, PeriodToken::Ytd)],
        Side::Budget,
        Some(&allowed),
        &mut guard,
    );

    let window = table.t12_window(options);
    let observations = table.into_observations(&sheet.name, &sheet.name, window);

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
