//! Property database workbook
//!
//! Each property has a pair of sheets:
//! 1. `"<Property>-Fin"` with actuals
//! 2. `"<Property>-Bgt"` with budgets
//!
//! Both use row 7 as the header, metric names in column 1 and one calendar
//! date per remaining column. The workbook carries no YTD column, so YTD rows
//! are synthesized from the boundary year.

use tracing::{debug, info};

use super::layout::{
    budget_allowed, read_metric_rows, record_guard_counters, record_missing_values,
    record_unparseable_periods, scan_period_columns, JoinedTable, Side,
};
use super::scalars::NumericGuard;
use super::validation::{IssueKind, QualityIssue, QualityLog};
use super::{Extraction, IngestOptions};
use crate::error::IngestError;
use crate::models::MetricObservation;
use crate::workbook::{Cell, Sheet, Workbook};

pub const NAME: &str = "Database_T12_Workbook";
pub const DESCRIPTION: &str = "Property database format with paired -Fin and -Bgt sheets";

pub const EXPECTED_METRICS: &[&str] = &["Net Eff. Gross Income", "Total Expense", "EBITDA (NOI)"];

const FIN_SUFFIX: &str = "-Fin";
const BGT_SUFFIX: &str = "-Bgt";
const HEADER_ROW: usize = 6;

/// A property and its two sheets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetPair {
    pub property: String,
    pub fin_sheet: String,
    pub bgt_sheet: String,
}

/// Every `-Fin` sheet that has a matching `-Bgt` sheet, in workbook order
pub fn sheet_pairs(workbook: &Workbook) -> Vec<SheetPair> {
    let names = workbook.sheet_names();
    names
        .iter()
        .filter_map(|name| {
            let base = name.strip_suffix(FIN_SUFFIX)?;
            let bgt = format!("{}{}", base, BGT_SUFFIX);
            names.contains(&bgt.as_str()).then(|| SheetPair {
                property: base.trim().to_string(),
                fin_sheet: name.to_string(),
                bgt_sheet: bgt,
            })
        })
        .collect()
}

pub fn can_process(workbook: &Workbook, _sheet: Option<&str>) -> bool {
    !sheet_pairs(workbook).is_empty()
}

fn pair_matches(pair: &SheetPair, requested: &str) -> bool {
    let requested = requested.trim();
    pair.property.eq_ignore_ascii_case(requested) || pair.fin_sheet.eq_ignore_ascii_case(requested)
}

pub fn process(
    workbook: &Workbook,
    sheet: Option<&str>,
    options: &IngestOptions,
) -> Result<Extraction, IngestError> {
    let mut pairs = sheet_pairs(workbook);
    if pairs.is_empty() {
        return Err(IngestError::EmptyResult {
            format: NAME,
            scope: "workbook (no Property-Fin/Property-Bgt sheet pairs)".to_string(),
        });
    }
    if let Some(requested) = sheet {
        pairs.retain(|p| pair_matches(p, requested));
        if pairs.is_empty() {
            return Err(IngestError::EmptyResult {
                format: NAME,
                scope: format!("property '{}'", requested),
            });
        }
    }

    info!("{}: processing {} property pair(s)", NAME, pairs.len());
    let mut issues = QualityLog::new();
    let mut observations = Vec::new();

    for pair in &pairs {
        let (Some(fin), Some(bgt)) = (workbook.sheet(&pair.fin_sheet), workbook.sheet(&pair.bgt_sheet)) else {
            continue;
        };
        if fin.height() <= HEADER_ROW + 1 {
            issues.record(
                QualityIssue::new(IssueKind::SheetSkipped, "fewer than 8 rows").on_sheet(&fin.name),
            );
            continue;
        }

        let extracted = extract_pair(pair, fin, bgt, options, &mut issues);
        if extracted.is_empty() {
            issues.record(
                QualityIssue::new(IssueKind::EmptyResult, "no usable metric rows").on_sheet(&fin.name),
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

fn no_repeated_header(_: &[Cell]) -> bool {
    false
}

fn extract_pair(
    pair: &SheetPair,
    fin: &Sheet,
    bgt: &Sheet,
    options: &IngestOptions,
    issues: &mut QualityLog,
) -> Vec<MetricObservation> {
    let (fin_periods, rejected) = scan_period_columns(fin, HEADER_ROW, 1..fin.width());
    record_unparseable_periods(&fin.name, &rejected, issues);
    if fin_periods.is_empty() {
        issues.record(
            QualityIssue::new(IssueKind::SheetSkipped, "row 7 holds no date columns").on_sheet(&fin.name),
        );
        return Vec::new();
    }

    let mut guard = NumericGuard::new(options.settings.overflow_limit);
    let mut table = JoinedTable::new();

    let fin_rows = read_metric_rows(fin, HEADER_ROW, no_repeated_header, issues);
    table.load_block(fin, &fin_rows, &fin_periods, Side::Actual, None, &mut guard);

    if bgt.height() > HEADER_ROW + 1 {
        let (bgt_periods, bgt_rejected) = scan_period_columns(bgt, HEADER_ROW, 1..bgt.width());
        record_unparseable_periods(&bgt.name, &bgt_rejected, issues);
        let bgt_rows = read_metric_rows(bgt, HEADER_ROW, no_repeated_header, issues);
        let allowed = budget_allowed(&bgt_rows, &options.settings.budget_cutoff_marker);
        table.load_block(bgt, &bgt_rows, &bgt_periods, Side::Budget, Some(&allowed), &mut guard);
    } else {
        issues.record(
            QualityIssue::new(IssueKind::SheetSkipped, "budget sheet has no data rows").on_sheet(&bgt.name),
        );
    }

    let window = table.t12_window(options);
    if let Some(w) = window {
        debug!("'{}': T12 window {} to {}", pair.property, w.start, w.end);
        table.synthesize_ytd(w.end);
    }
    let observations = table.into_observations(&pair.property, &fin.name, window);

    record_guard_counters(&fin.name, &guard, issues);
    record_missing_values(&fin.name, &fin_rows, &observations, issues);
    observations
}
