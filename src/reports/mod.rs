// Reports module - variance analytics and KPI summaries over the canonical table

pub mod analysis;
pub mod kpi_summary;
pub mod payload;
pub mod stats;

pub use analysis::PropertyAnalyzer;
pub use kpi_summary::{KpiSection, KpiSummary};
pub use payload::{MinimalAnalysis, PropertyAnalysisResult};
