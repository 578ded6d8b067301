//! T12 Ledger - property T12 workbook normalization and variance analytics
//!
//! This library reads trailing-twelve-month property financial workbooks in
//! several layouts, normalizes them into one canonical long-format time
//! series and computes budget, month-over-month and rolling-average variance
//! analytics per property.

pub mod cli;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod importers;
pub mod models;
pub mod reports;
pub mod timeseries;
pub mod utils;
pub mod workbook;

pub use config::Settings;
pub use error::{AnalysisError, IngestError};
pub use importers::{FormatKind, FormatRegistry, IngestOptions};
pub use models::MetricObservation;
pub use reports::{KpiSummary, PropertyAnalysisResult, PropertyAnalyzer};
pub use timeseries::{ingest_workbook, CanonicalTimeSeries, IngestReport};
pub use workbook::Workbook;
