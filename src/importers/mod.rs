// Import module - T12 workbook layouts and the registry that selects one

pub mod database_t12;
pub mod layout;
pub mod monthly_t12;
pub mod scalars;
pub mod standard_t12;
pub mod validation;

use chrono::{Local, NaiveDate};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::IngestSettings;
use crate::error::IngestError;
use crate::models::MetricObservation;
use crate::workbook::Workbook;

pub use scalars::{parse_money, parse_period, PeriodToken};
pub use validation::{IssueKind, QualityIssue, QualityLog};

/// Settings for one extraction run
#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub settings: IngestSettings,
    /// Months after this date are impossible actuals and are discarded
    pub as_of: NaiveDate,
}

impl IngestOptions {
    pub fn new(settings: IngestSettings) -> Self {
        Self {
            settings,
            as_of: Local::now().date_naive(),
        }
    }

    pub fn with_as_of(mut self, as_of: NaiveDate) -> Self {
        self.as_of = as_of;
        self
    }
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self::new(IngestSettings::default())
    }
}

/// Raw output of one processor
#[derive(Debug, Default)]
pub struct Extraction {
    pub observations: Vec<MetricObservation>,
    pub issues: QualityLog,
}

/// Metadata describing a processor, plus the issues of the run that used it
#[derive(Debug, Clone, Serialize)]
pub struct FormatDescriptor {
    pub format_name: &'static str,
    pub description: &'static str,
    pub expected_metric_patterns: Vec<&'static str>,
    pub quality_issues: Vec<QualityIssue>,
}

/// The known workbook layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatKind {
    MonthlyT12,
    StandardT12,
    DatabaseT12,
}

impl FormatKind {
    pub const ALL: [FormatKind; 3] = [
        FormatKind::MonthlyT12,
        FormatKind::StandardT12,
        FormatKind::DatabaseT12,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FormatKind::MonthlyT12 => monthly_t12::NAME,
            FormatKind::StandardT12 => standard_t12::NAME,
            FormatKind::DatabaseT12 => database_t12::NAME,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            FormatKind::MonthlyT12 => monthly_t12::DESCRIPTION,
            FormatKind::StandardT12 => standard_t12::DESCRIPTION,
            FormatKind::DatabaseT12 => database_t12::DESCRIPTION,
        }
    }

    pub fn expected_metrics(&self) -> &'static [&'static str] {
        match self {
            FormatKind::MonthlyT12 => monthly_t12::EXPECTED_METRICS,
            FormatKind::StandardT12 => standard_t12::EXPECTED_METRICS,
            FormatKind::DatabaseT12 => database_t12::EXPECTED_METRICS,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.name().eq_ignore_ascii_case(name.trim()))
    }

    pub fn descriptor(&self) -> FormatDescriptor {
        FormatDescriptor {
            format_name: self.name(),
            description: self.description(),
            expected_metric_patterns: self.expected_metrics().to_vec(),
            quality_issues: Vec::new(),
        }
    }

    /// Cheap structural probe; never fails
    pub fn can_process(&self, workbook: &Workbook, sheet: Option<&str>) -> bool {
        let claimed = match self {
            FormatKind::MonthlyT12 => monthly_t12::can_process(workbook, sheet),
            FormatKind::StandardT12 => standard_t12::can_process(workbook, sheet),
            FormatKind::DatabaseT12 => database_t12::can_process(workbook, sheet),
        };
        debug!("Probe {}: {}", self.name(), claimed);
        claimed
    }

    /// Full extraction followed by the metric sanity check
    pub fn process(
        &self,
        workbook: &Workbook,
        sheet: Option<&str>,
        options: &IngestOptions,
    ) -> Result<Extraction, IngestError> {
        let mut extraction = match self {
            FormatKind::MonthlyT12 => monthly_t12::process(workbook, sheet, options),
            FormatKind::StandardT12 => standard_t12::process(workbook, sheet, options),
            FormatKind::DatabaseT12 => database_t12::process(workbook, sheet, options),
        }?;
        self.validate(&mut extraction);
        Ok(extraction)
    }

    fn validate(&self, extraction: &mut Extraction) {
        let patterns: Vec<String> = self
            .expected_metrics()
            .iter()
            .map(|p| p.to_lowercase())
            .collect();
        let found = extraction.observations.iter().any(|o| {
            let name = o.metric_name.to_lowercase();
            patterns.iter().any(|p| name.contains(p))
        });
        if !found {
            extraction.issues.record(
                QualityIssue::new(
                    IssueKind::NoCommonMetrics,
                    format!("no common {} metrics found", self.name()),
                )
                .with_suggestion("Verify the workbook layout matches the selected format"),
            );
        }
    }
}

/// Output of a registry run: the observations and the processor that made them
#[derive(Debug)]
pub struct ProcessingRun {
    pub format: FormatKind,
    pub descriptor: FormatDescriptor,
    pub observations: Vec<MetricObservation>,
}

impl ProcessingRun {
    pub fn issues(&self) -> &[QualityIssue] {
        &self.descriptor.quality_issues
    }
}

/// Ordered set of processors, constructed once and passed by reference
#[derive(Debug, Clone, Default)]
pub struct FormatRegistry {
    formats: Vec<FormatKind>,
}

impl FormatRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Monthly-column T12, then the standard workbook, then the property database
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        for kind in FormatKind::ALL {
            registry.register(kind);
        }
        registry
    }

    /// Adds a processor at the end of the probe order.
    ///
    /// Returns false (and changes nothing) when it is already registered.
    pub fn register(&mut self, kind: FormatKind) -> bool {
        if self.formats.contains(&kind) {
            warn!("Format {} is already registered", kind.name());
            return false;
        }
        self.formats.push(kind);
        true
    }

    pub fn formats(&self) -> &[FormatKind] {
        &self.formats
    }

    pub fn list_formats(&self) -> Vec<&'static str> {
        self.formats.iter().map(|k| k.name()).collect()
    }

    fn available(&self) -> Vec<String> {
        self.list_formats().into_iter().map(String::from).collect()
    }

    pub fn lookup(&self, name: &str) -> Result<FormatKind, IngestError> {
        FormatKind::from_name(name)
            .filter(|k| self.formats.contains(k))
            .ok_or_else(|| IngestError::UnknownFormat {
                name: name.to_string(),
                available: self.available(),
            })
    }

    pub fn descriptor(&self, name: &str) -> Option<FormatDescriptor> {
        self.lookup(name).ok().map(|k| k.descriptor())
    }

    /// First registered processor whose probe claims the workbook
    pub fn detect(&self, workbook: &Workbook, sheet: Option<&str>) -> Option<FormatKind> {
        self.claimants(workbook, sheet).into_iter().next()
    }

    /// Every processor whose probe claims the workbook, in registration order
    pub fn claimants(&self, workbook: &Workbook, sheet: Option<&str>) -> Vec<FormatKind> {
        self.formats
            .iter()
            .copied()
            .filter(|k| k.can_process(workbook, sheet))
            .collect()
    }

    /// Whether the named processor claims the workbook
    pub fn validate_file_format(&self, workbook: &Workbook, name: &str) -> Result<bool, IngestError> {
        Ok(self.lookup(name)?.can_process(workbook, None))
    }

    /// Runs a forced processor, or detection followed by extraction.
    ///
    /// A forced processor's errors are fatal. Otherwise a claimant failing
    /// with `HeaderNotFound`/`EmptyResult` hands over to the next claimant.
    pub fn process(
        &self,
        workbook: &Workbook,
        format_name: Option<&str>,
        sheet: Option<&str>,
        options: &IngestOptions,
    ) -> Result<ProcessingRun, IngestError> {
        if let Some(name) = format_name {
            let kind = self.lookup(name)?;
            info!("Using forced format: {}", kind.name());
            let extraction = kind.process(workbook, sheet, options)?;
            return Ok(Self::finish(kind, extraction, QualityLog::new()));
        }

        let claimants = self.claimants(workbook, sheet);
        if claimants.is_empty() {
            return Err(IngestError::FormatDetectionFailure {
                available: self.available(),
            });
        }

        let mut carried = QualityLog::new();
        let mut attempted = Vec::new();
        for kind in claimants {
            info!("Detected format: {}", kind.name());
            attempted.push(kind.name().to_string());
            match kind.process(workbook, sheet, options) {
                Ok(extraction) => return Ok(Self::finish(kind, extraction, carried)),
                Err(e) if e.is_recoverable() => {
                    carried.record(QualityIssue::new(
                        if matches!(e, IngestError::HeaderNotFound { .. }) {
                            IssueKind::HeaderNotFound
                        } else {
                            IssueKind::EmptyResult
                        },
                        e.to_string(),
                    ));
                }
                Err(e) => return Err(e),
            }
        }

        Err(IngestError::NoPropertiesExtracted { attempted })
    }

    fn finish(kind: FormatKind, extraction: Extraction, carried: QualityLog) -> ProcessingRun {
        let mut log = carried;
        log.extend(extraction.issues);
        let mut descriptor = kind.descriptor();
        descriptor.quality_issues = log.issues().to_vec();
        info!(
            "{}: {} observations, {} quality issue(s)",
            kind.name(),
            extraction.observations.len(),
            descriptor.quality_issues.len()
        );
        ProcessingRun {
            format: kind,
            descriptor,
            observations: extraction.observations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workbook::{Cell, Sheet};

    fn options() -> IngestOptions {
        IngestOptions::default().with_as_of(NaiveDate::from_ymd_opt(2025, 1, 31).unwrap())
    }

    fn monthly_workbook() -> Workbook {
        Workbook::from_sheets(vec![Sheet::new(
            "Maple",
            true,
            vec![
                vec![Cell::text("Metric"), Cell::text("Nov 2024"), Cell::text("Dec 2024")],
                vec![Cell::text("EBITDA (NOI)"), Cell::Number(10.0), Cell::Number(12.0)],
            ],
        )])
    }

    #[test]
    fn test_builtin_order_and_duplicate_registration() {
        let mut registry = FormatRegistry::with_builtin();
        assert_eq!(
            registry.list_formats(),
            vec![
                "T12_Monthly_Financial",
                "Standard_T12_Workbook",
                "Database_T12_Workbook"
            ]
        );
        assert!(!registry.register(FormatKind::StandardT12));
        assert_eq!(registry.formats().len(), 3);
    }

    #[test]
    fn test_detection_failure_lists_available_formats() {
        let registry = FormatRegistry::with_builtin();
        let wb = Workbook::from_sheets(vec![Sheet::new("S", true, vec![vec![Cell::text("hello")]])]);
        match registry.process(&wb, None, None, &options()) {
            Err(IngestError::FormatDetectionFailure { available }) => assert_eq!(available.len(), 3),
            other => panic!("unexpected result: {:?}", other.map(|r| r.format)),
        }
    }

    #[test]
    fn test_detect_and_process_monthly() {
        let registry = FormatRegistry::with_builtin();
        let wb = monthly_workbook();
        assert_eq!(registry.detect(&wb, None), Some(FormatKind::MonthlyT12));

        let run = registry.process(&wb, None, None, &options()).unwrap();
        assert_eq!(run.format, FormatKind::MonthlyT12);
        assert_eq!(run.descriptor.format_name, "T12_Monthly_Financial");
        assert_eq!(run.observations.len(), 2);
    }

    #[test]
    fn test_forced_format_errors_are_fatal() {
        let registry = FormatRegistry::with_builtin();
        let wb = monthly_workbook();
        let err = registry
            .process(&wb, Some("Database_T12_Workbook"), None, &options())
            .unwrap_err();
        assert!(matches!(err, IngestError::EmptyResult { .. }));

        let err = registry.process(&wb, Some("Weekly"), None, &options()).unwrap_err();
        assert!(matches!(err, IngestError::UnknownFormat { .. }));
    }

    #[test]
    fn test_unregistered_format_is_unknown() {
        let mut registry = FormatRegistry::new();
        registry.register(FormatKind::MonthlyT12);
        assert!(registry.descriptor("Standard_T12_Workbook").is_none());
        assert!(registry
            .validate_file_format(&monthly_workbook(), "T12_Monthly_Financial")
            .unwrap());
    }

    #[test]
    fn test_no_common_metrics_is_recorded() {
        let registry = FormatRegistry::with_builtin();
        let wb = Workbook::from_sheets(vec![Sheet::new(
            "S",
            true,
            vec![
                vec![Cell::text("Metric"), Cell::text("Dec 2024")],
                vec![Cell::text("Widgets"), Cell::Number(3.0)],
            ],
        )]);
        let run = registry
            .process(&wb, Some("T12_Monthly_Financial"), None, &options())
            .unwrap();
        assert!(run.issues().iter().any(|i| i.kind == IssueKind::NoCommonMetrics));
    }
}
