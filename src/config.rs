//! Runtime settings loaded from TOML
//!
//! Every field carries a default, so a missing file or a partial file is
//! valid. Thresholds that used to be hand-picked constants (trend band,
//! benchmark rates, metric watch-lists) live here.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const APP_DIR: &str = "t12-ledger";
const CONFIG_FILENAME: &str = "config.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub ingest: IngestSettings,
    pub analysis: AnalysisSettings,
}

/// Knobs for the extraction pipeline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IngestSettings {
    /// Magnitude beyond which a numeric cell is treated as a blank sentinel
    pub overflow_limit: f64,
    /// Length of the trailing window kept per sheet
    pub t12_months: u32,
    /// Budgets are nulled for every row after the first row containing this
    pub budget_cutoff_marker: String,
    /// Metrics whose non-zero actuals mark a month as reported
    pub core_metrics: Vec<String>,
    /// Summary/template sheets the standard workbook never treats as properties
    pub excluded_sheets: Vec<String>,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            overflow_limit: 1e15,
            t12_months: 12,
            budget_cutoff_marker: "monthly cash flow".to_string(),
            core_metrics: strings(&[
                "Net Eff. Gross Income",
                "Net Income",
                "Total Expense",
                "Total Expenses",
                "EBITDA (NOI)",
                "NOI",
                "Net Operating Income",
            ]),
            excluded_sheets: strings(&["Portfolio Summary", "Total Portfolio", "TEMPLATE"]),
        }
    }
}

/// Knobs for the analytics engine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalysisSettings {
    /// Half-over-half change (percent) beyond which a trend is not "stable"
    pub trend_threshold_pct: f64,
    /// Number of valid prior months averaged for the rolling anomaly check
    pub rolling_window: usize,
    /// Take the absolute value of loss/expense numerators before computing ratios
    pub absolute_loss_numerators: bool,
    /// Metrics whose latest non-zero actual defines the report period
    pub period_metrics: Vec<String>,
    pub key_metrics: Vec<String>,
    pub mom_metrics: Vec<String>,
    pub trend_metrics: Vec<String>,
    pub ytd_metrics: Vec<String>,
    pub budget_metrics: Vec<String>,
    pub rolling_metrics: Vec<String>,
    pub series_metrics: Vec<String>,
    pub benchmarks: Benchmarks,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            trend_threshold_pct: 5.0,
            rolling_window: 3,
            absolute_loss_numerators: true,
            period_metrics: strings(&["Net Eff. Gross Income", "Total Expense", "EBITDA (NOI)"]),
            key_metrics: strings(&[
                "Property Asking Rent",
                "Loss to lease",
                "Gross Scheduled Rent",
                "Vacancy",
                "Non Revenue Units",
                "Concessions",
                "Delinquency",
                "Effective Rental Income",
                "Net Eff. Gross Income",
                "Total Expense",
                "EBITDA (NOI)",
                "Monthly Cash Flow",
                "Debt Service",
            ]),
            mom_metrics: strings(&[
                "Net Eff. Gross Income",
                "Total Expense",
                "EBITDA (NOI)",
                "Delinquency",
                "Vacancy",
                "Effective Rental Income",
            ]),
            trend_metrics: strings(&[
                "Net Eff. Gross Income",
                "Total Expense",
                "EBITDA (NOI)",
                "Effective Rental Income",
                "Vacancy",
                "Delinquency",
                "Property Asking Rent",
            ]),
            ytd_metrics: strings(&[
                "Net Eff. Gross Income",
                "Total Expense",
                "EBITDA (NOI)",
                "Property Asking Rent",
                "Effective Rental Income",
                "Monthly Cash Flow",
            ]),
            budget_metrics: strings(&[
                "Net Eff. Gross Income",
                "Total Expense",
                "EBITDA (NOI)",
                "Property Asking Rent",
                "Effective Rental Income",
            ]),
            rolling_metrics: strings(&[
                "Total Expense",
                "Net Eff. Gross Income",
                "EBITDA (NOI)",
                "Property Asking Rent",
            ]),
            series_metrics: strings(&[
                "Net Eff. Gross Income",
                "Total Expense",
                "EBITDA (NOI)",
                "Vacancy",
                "Delinquency",
                "Property Asking Rent",
                "Effective Rental Income",
            ]),
            benchmarks: Benchmarks::default(),
        }
    }
}

/// Reference rates echoed into the analysis payload for the narrative layer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Benchmarks {
    pub typical_vacancy_rate: f64,
    pub high_vacancy_rate: f64,
    pub typical_delinquency_rate: f64,
    pub high_delinquency_rate: f64,
    pub typical_expense_ratio: f64,
    pub high_expense_ratio: f64,
}

impl Default for Benchmarks {
    fn default() -> Self {
        Self {
            typical_vacancy_rate: 5.0,
            high_vacancy_rate: 10.0,
            typical_delinquency_rate: 2.0,
            high_delinquency_rate: 5.0,
            typical_expense_ratio: 45.0,
            high_expense_ratio: 55.0,
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

pub fn default_config_path() -> Option<PathBuf> {
    dir_spec::config_home().map(|dir| dir.join(APP_DIR).join(CONFIG_FILENAME))
}

impl Settings {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).context("Failed to parse settings TOML")
    }

    pub fn load_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let settings = Self::from_toml_str(&text)?;
        info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Explicit path first, then the per-user config file, then defaults.
    ///
    /// An explicit path that does not exist is an error; a missing per-user
    /// file is not.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_file(path);
        }

        match default_config_path() {
            Some(path) if path.exists() => Self::load_file(&path),
            _ => {
                debug!("No config file found, using built-in defaults");
                Ok(Self::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings = Settings::from_toml_str(
            r#"
            [analysis]
            trend_threshold_pct = 10.0

            [analysis.benchmarks]
            high_vacancy_rate = 12.5
            "#,
        )
        .unwrap();

        assert_eq!(settings.analysis.trend_threshold_pct, 10.0);
        assert_eq!(settings.analysis.rolling_window, 3);
        assert_eq!(settings.analysis.benchmarks.high_vacancy_rate, 12.5);
        assert_eq!(settings.analysis.benchmarks.typical_vacancy_rate, 5.0);
        assert_eq!(settings.ingest, IngestSettings::default());
    }

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(Settings::from_toml_str("").unwrap(), Settings::default());
    }

    #[test]
    fn test_load_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[ingest]\nt12_months = 6").unwrap();

        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.ingest.t12_months, 6);
        assert_eq!(settings.ingest.overflow_limit, 1e15);
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(Settings::load(Some(&missing)).is_err());
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        assert!(Settings::from_toml_str("[analysis]\nrolling_window = \"three\"").is_err());
    }
}
