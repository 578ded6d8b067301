//! Canonical time series assembly
//!
//! Folds processor output into one table per workbook, derives the display
//! columns and backfills YTD rows with their property's latest month for
//! grouping. The table is immutable once assembled and cheap to clone.

pub mod export;

use chrono::{Datelike, NaiveDate};
use itertools::Itertools;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{AnalysisError, IngestError};
use crate::importers::{
    FormatDescriptor, FormatKind, FormatRegistry, IngestOptions, IssueKind, ProcessingRun,
    QualityIssue, QualityLog,
};
use crate::models::MetricObservation;
use crate::workbook::Workbook;

/// A canonical row: the observation plus derived display columns
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalRow {
    #[serde(flatten)]
    pub observation: MetricObservation,
    /// Calendar month used for grouping; for YTD rows this is the backfilled
    /// latest month of the property and never a trend point
    pub period_key: Option<NaiveDate>,
    pub year: Option<i32>,
    pub month_name: Option<String>,
    pub is_negative: bool,
}

impl CanonicalRow {
    fn new(observation: MetricObservation) -> Self {
        let period_key = observation.period_parsed;
        let is_negative = observation.actual_value.map(|v| v < 0.0).unwrap_or(false);
        let mut row = Self {
            observation,
            period_key: None,
            year: None,
            month_name: None,
            is_negative,
        };
        row.set_period_key(period_key);
        row
    }

    fn set_period_key(&mut self, key: Option<NaiveDate>) {
        self.period_key = key;
        self.year = key.map(|d| d.year());
        self.month_name = key.map(|d| d.format("%B").to_string());
    }

    pub fn property(&self) -> &str {
        &self.observation.property
    }

    pub fn metric(&self) -> &str {
        &self.observation.metric_name
    }

    pub fn is_ytd(&self) -> bool {
        self.observation.is_ytd
    }

    /// Calendar month of a monthly row; `None` for YTD rows
    pub fn month(&self) -> Option<NaiveDate> {
        self.observation.period_parsed
    }

    pub fn actual(&self) -> Option<f64> {
        self.observation.actual_value
    }

    pub fn budget(&self) -> Option<f64> {
        self.observation.budget_value
    }
}

/// The single normalized long-format table for a workbook
#[derive(Debug, Clone, Default)]
pub struct CanonicalTimeSeries {
    rows: Arc<Vec<CanonicalRow>>,
}

impl CanonicalTimeSeries {
    /// Builds the table from processor output.
    ///
    /// The first observation of a `(property, metric, period, is_ytd)` key
    /// wins; later ones are reported and dropped.
    pub fn assemble(observations: Vec<MetricObservation>, issues: &mut QualityLog) -> Self {
        let mut seen: HashSet<(String, String, String, bool)> = HashSet::new();
        let mut rows = Vec::with_capacity(observations.len());
        let mut dropped: HashMap<String, usize> = HashMap::new();

        for observation in observations {
            let key = observation.key();
            let owned = (
                key.0.to_string(),
                key.1.to_string(),
                key.2.to_string(),
                key.3,
            );
            if !seen.insert(owned) {
                *dropped.entry(observation.sheet.clone()).or_insert(0) += 1;
                continue;
            }
            rows.push(CanonicalRow::new(observation));
        }

        for (sheet, count) in dropped.into_iter().sorted() {
            issues.record(
                QualityIssue::new(
                    IssueKind::DuplicateObservation,
                    format!("{} observation(s) repeat an existing property/metric/period and were dropped", count),
                )
                .on_sheet(sheet),
            );
        }

        backfill_ytd(&mut rows);
        info!("Assembled canonical table with {} rows", rows.len());
        Self {
            rows: Arc::new(rows),
        }
    }

    pub fn rows(&self) -> &[CanonicalRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Distinct properties in order of first appearance
    pub fn properties(&self) -> Vec<String> {
        self.rows
            .iter()
            .map(|r| r.property().to_string())
            .unique()
            .collect()
    }

    /// Rows of one property.
    ///
    /// The name is matched exactly, then case-insensitively, then as a
    /// case-insensitive substring of the property and finally of the sheet.
    pub fn property_slice(&self, name: &str) -> Result<PropertySlice<'_>, AnalysisError> {
        let properties = self.properties();
        let wanted = name.trim();
        let lower = wanted.to_lowercase();

        let resolved = properties
            .iter()
            .find(|p| p.as_str() == wanted)
            .or_else(|| properties.iter().find(|p| p.to_lowercase() == lower))
            .or_else(|| properties.iter().find(|p| p.to_lowercase().contains(&lower)))
            .cloned()
            .or_else(|| {
                self.rows
                    .iter()
                    .find(|r| r.observation.sheet.to_lowercase().contains(&lower))
                    .map(|r| r.property().to_string())
            });

        let Some(property) = resolved else {
            return Err(AnalysisError::UnknownProperty {
                name: name.to_string(),
                available: properties,
            });
        };

        debug!("Resolved property '{}' to '{}'", name, property);
        let rows = self.rows.iter().filter(|r| r.property() == property).collect();
        Ok(PropertySlice { property, rows })
    }
}

/// Read-only view of one property's rows
#[derive(Debug, Clone)]
pub struct PropertySlice<'a> {
    pub property: String,
    pub rows: Vec<&'a CanonicalRow>,
}

impl<'a> PropertySlice<'a> {
    pub fn monthly(&self) -> impl Iterator<Item = &'a CanonicalRow> + '_ {
        self.rows.iter().copied().filter(|r| !r.is_ytd())
    }

    pub fn ytd(&self) -> impl Iterator<Item = &'a CanonicalRow> + '_ {
        self.rows.iter().copied().filter(|r| r.is_ytd())
    }

    /// Distinct calendar months with monthly rows, ascending
    pub fn months(&self) -> Vec<NaiveDate> {
        self.monthly()
            .filter_map(|r| r.month())
            .sorted()
            .dedup()
            .collect()
    }

    /// Distinct metric names in order of first appearance
    pub fn metrics(&self) -> Vec<&'a str> {
        self.rows.iter().copied().map(|r| r.metric()).unique().collect()
    }
}

/// Copies each property's latest monthly period onto its YTD rows
fn backfill_ytd(rows: &mut [CanonicalRow]) {
    let mut latest: HashMap<String, NaiveDate> = HashMap::new();
    for row in rows.iter().filter(|r| !r.is_ytd()) {
        if let Some(month) = row.month() {
            latest
                .entry(row.property().to_string())
                .and_modify(|d| {
                    if month > *d {
                        *d = month
                    }
                })
                .or_insert(month);
        }
    }

    for row in rows.iter_mut().filter(|r| r.is_ytd()) {
        let key = latest.get(row.property()).copied();
        row.set_period_key(key);
    }
}

/// Everything a caller gets back from ingesting one workbook
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub format: FormatKind,
    pub descriptor: FormatDescriptor,
    pub table: CanonicalTimeSeries,
}

impl IngestReport {
    pub fn issues(&self) -> &[QualityIssue] {
        &self.descriptor.quality_issues
    }
}

/// Registry selection, extraction and assembly in one call
pub fn ingest_workbook(
    registry: &FormatRegistry,
    workbook: &Workbook,
    format_name: Option<&str>,
    sheet: Option<&str>,
    options: &IngestOptions,
) -> Result<IngestReport, IngestError> {
    let ProcessingRun {
        format,
        mut descriptor,
        observations,
    } = registry.process(workbook, format_name, sheet, options)?;

    let mut issues = QualityLog::new();
    let table = CanonicalTimeSeries::assemble(observations, &mut issues);
    if table.is_empty() {
        return Err(IngestError::NoPropertiesExtracted {
            attempted: vec![format.name().to_string()],
        });
    }
    descriptor.quality_issues.extend(issues.issues().iter().cloned());

    Ok(IngestReport {
        format,
        descriptor,
        table,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).unwrap()
    }

    fn sample() -> Vec<MetricObservation> {
        vec![
            MetricObservation::monthly("Maple", "Maple CRES", "NOI", d(2024, 6), Some(100.0), None),
            MetricObservation::monthly("Maple", "Maple CRES", "NOI", d(2024, 7), Some(-5.0), Some(90.0)),
            MetricObservation::ytd("Maple", "Maple CRES", "NOI", Some(95.0), None),
            MetricObservation::monthly("Oak Grove", "Oak-Fin", "NOI", d(2024, 3), Some(7.0), None),
            MetricObservation::ytd("Oak Grove", "Oak-Fin", "NOI", Some(7.0), None),
        ]
    }

    #[test]
    fn test_ytd_backfill_uses_latest_month_per_property() {
        let mut issues = QualityLog::new();
        let table = CanonicalTimeSeries::assemble(sample(), &mut issues);

        let maple_ytd = table
            .rows()
            .iter()
            .find(|r| r.property() == "Maple" && r.is_ytd())
            .unwrap();
        assert_eq!(maple_ytd.period_key, Some(d(2024, 7)));
        assert_eq!(maple_ytd.month_name.as_deref(), Some("July"));
        assert_eq!(maple_ytd.year, Some(2024));
        assert_eq!(maple_ytd.month(), None);

        let oak_ytd = table
            .rows()
            .iter()
            .find(|r| r.property() == "Oak Grove" && r.is_ytd())
            .unwrap();
        assert_eq!(oak_ytd.period_key, Some(d(2024, 3)));
    }

    #[test]
    fn test_derived_columns() {
        let mut issues = QualityLog::new();
        let table = CanonicalTimeSeries::assemble(sample(), &mut issues);
        let july = &table.rows()[1];
        assert!(july.is_negative);
        assert_eq!(july.month_name.as_deref(), Some("July"));
        assert!(!table.rows()[0].is_negative);
    }

    #[test]
    fn test_duplicate_keys_are_dropped_with_issue() {
        let mut obs = sample();
        obs.push(MetricObservation::monthly("Maple", "Maple 2", "NOI", d(2024, 6), Some(1.0), None));
        let mut issues = QualityLog::new();
        let table = CanonicalTimeSeries::assemble(obs, &mut issues);
        assert_eq!(table.len(), 5);
        assert!(issues.has(IssueKind::DuplicateObservation));
    }

    #[test]
    fn test_property_slice_lookup_order() {
        let mut issues = QualityLog::new();
        let table = CanonicalTimeSeries::assemble(sample(), &mut issues);

        assert_eq!(table.properties(), vec!["Maple", "Oak Grove"]);
        assert_eq!(table.property_slice("Maple").unwrap().property, "Maple");
        assert_eq!(table.property_slice("oak grove").unwrap().property, "Oak Grove");
        assert_eq!(table.property_slice("grove").unwrap().property, "Oak Grove");
        assert_eq!(table.property_slice("oak-fin").unwrap().property, "Oak Grove");

        let slice = table.property_slice("Maple").unwrap();
        assert_eq!(slice.months(), vec![d(2024, 6), d(2024, 7)]);
        assert_eq!(slice.ytd().count(), 1);
        assert_eq!(slice.metrics(), vec!["NOI"]);

        match table.property_slice("Birch") {
            Err(AnalysisError::UnknownProperty { available, .. }) => assert_eq!(available.len(), 2),
            other => panic!("unexpected: {:?}", other.map(|s| s.property)),
        }
    }
}
