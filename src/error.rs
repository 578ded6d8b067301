//! Error handling for T12 Ledger
//!
//! Defines the typed errors raised by ingestion and analysis, and establishes
//! a unified Result type using anyhow for the CLI layer.

use thiserror::Error;

/// Fatal conditions raised while turning a workbook into canonical rows.
///
/// Non-fatal problems (unparseable cells, overflow sentinels, skipped sheets)
/// never show up here; they are recorded as quality issues on the run.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("no registered format can parse this workbook (available formats: {})", .available.join(", "))]
    FormatDetectionFailure { available: Vec<String> },

    #[error("no format registered under '{name}' (available formats: {})", .available.join(", "))]
    UnknownFormat { name: String, available: Vec<String> },

    #[error("{format}: header row not found in sheet '{sheet}'")]
    HeaderNotFound { format: &'static str, sheet: String },

    #[error("{format}: no usable metric rows in {scope}")]
    EmptyResult { format: &'static str, scope: String },

    #[error("no properties could be extracted (tried: {})", .attempted.join(", "))]
    NoPropertiesExtracted { attempted: Vec<String> },

    #[error("failed to read workbook: {0}")]
    Workbook(#[from] calamine::Error),

    #[error("io error")]
    Io(#[from] std::io::Error),
}

impl IngestError {
    /// Errors that only mean "this processor cannot handle this input".
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            IngestError::HeaderNotFound { .. } | IngestError::EmptyResult { .. }
        )
    }
}

/// Errors raised when selecting a property slice for analysis
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("no data for property '{name}' (available: {})", .available.join(", "))]
    UnknownProperty { name: String, available: Vec<String> },

    #[error("property '{0}' has no monthly rows")]
    NoMonthlyData(String),

    #[error("no data for '{property}' in {period} (available: {})", .available.join(", "))]
    PeriodNotAvailable {
        property: String,
        period: String,
        available: Vec<String>,
    },
}

/// Result type alias for CLI operations
pub type Result<T> = anyhow::Result<T>;
