//! Quality issues collected while extracting a workbook
//!
//! Processing never stops on a bad cell or an unusable sheet. Everything that
//! was coerced, skipped or guessed is recorded here and travels with the run.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

/// What kind of non-fatal problem was observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    HeaderNotFound,
    EmptyResult,
    NumericParseFailure,
    OverflowSentinel,
    UnparseablePeriod,
    MissingValues,
    DuplicateMetric,
    DuplicateObservation,
    SheetSkipped,
    NoCommonMetrics,
    WeakPeriodDetection,
}

impl IssueKind {
    pub fn label(&self) -> &'static str {
        match self {
            IssueKind::HeaderNotFound => "header_not_found",
            IssueKind::EmptyResult => "empty_result",
            IssueKind::NumericParseFailure => "numeric_parse_failure",
            IssueKind::OverflowSentinel => "overflow_sentinel",
            IssueKind::UnparseablePeriod => "unparseable_period",
            IssueKind::MissingValues => "missing_values",
            IssueKind::DuplicateMetric => "duplicate_metric",
            IssueKind::DuplicateObservation => "duplicate_observation",
            IssueKind::SheetSkipped => "sheet_skipped",
            IssueKind::NoCommonMetrics => "no_common_metrics",
            IssueKind::WeakPeriodDetection => "weak_period_detection",
        }
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A quality issue attached to a processing run, not to a row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityIssue {
    pub kind: IssueKind,
    /// Sheet the issue was observed on, if it is sheet-specific
    pub sheet: Option<String>,
    pub message: String,
    /// Suggestion for fixing the source workbook (if available)
    pub suggestion: Option<String>,
}

impl QualityIssue {
    pub fn new(kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            sheet: None,
            message: message.into(),
            suggestion: None,
        }
    }

    pub fn on_sheet(mut self, sheet: impl Into<String>) -> Self {
        self.sheet = Some(sheet.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

impl fmt::Display for QualityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sheet {
            Some(sheet) => write!(f, "[{}] {}: {}", self.kind, sheet, self.message),
            None => write!(f, "[{}] {}", self.kind, self.message),
        }
    }
}

/// Append-only list of issues for one run
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct QualityLog {
    issues: Vec<QualityIssue>,
}

impl QualityLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, issue: QualityIssue) {
        warn!("{}", issue);
        self.issues.push(issue);
    }

    pub fn extend(&mut self, other: QualityLog) {
        self.issues.extend(other.issues);
    }

    pub fn issues(&self) -> &[QualityIssue] {
        &self.issues
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn has(&self, kind: IssueKind) -> bool {
        self.issues.iter().any(|i| i.kind == kind)
    }

    /// Count issues by kind for summary reporting
    pub fn summary(&self) -> BTreeMap<IssueKind, usize> {
        let mut summary = BTreeMap::new();
        for issue in &self.issues {
            *summary.entry(issue.kind).or_insert(0) += 1;
        }
        summary
    }
}
