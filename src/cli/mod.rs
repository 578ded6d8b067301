use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod formatters;

#[derive(Parser, Debug)]
#[command(name = "t12-ledger")]
#[command(
    version,
    about = "Normalize property T12 workbooks and analyze budget and trend variances"
)]
#[command(
    long_about = "Reads trailing-twelve-month property financial workbooks in any of the supported layouts, normalizes them into one canonical time series and computes month-over-month, budget and rolling-average variance analytics per property."
)]
pub struct Cli {
    /// Disable colorized/ANSI output
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,

    /// Output results in JSON format
    #[arg(long = "json", global = true)]
    pub json: bool,

    /// Settings file (defaults to the per-user config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Treat this date as today when rejecting future months (YYYY-MM-DD)
    #[arg(long = "as-of", global = true, value_name = "DATE", value_parser = parse_date_arg)]
    pub as_of: Option<NaiveDate>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the registered workbook formats
    Formats,

    /// Show sheets, dimensions and which formats claim a workbook
    Inspect {
        /// Path to the workbook
        file: PathBuf,
    },

    /// Normalize a workbook into the canonical time series
    Process {
        /// Path to the workbook
        file: PathBuf,

        /// Force a format by name instead of detecting it
        #[arg(short, long)]
        format: Option<String>,

        /// Only process this sheet (or property, for database workbooks)
        #[arg(short, long)]
        sheet: Option<String>,

        /// Write the canonical table to this CSV file
        #[arg(long, value_name = "OUT")]
        csv: Option<PathBuf>,
    },

    /// Compute variance analytics for one or all properties
    Analyze {
        /// Path to the workbook
        file: PathBuf,

        /// Property to analyze (all properties when omitted)
        #[arg(short, long)]
        property: Option<String>,

        /// Report period instead of the detected latest month (YYYY-MM)
        #[arg(long, value_parser = parse_month_arg)]
        period: Option<NaiveDate>,

        /// Only budget variances and trailing anomalies
        #[arg(long)]
        minimal: bool,

        /// Force a format by name instead of detecting it
        #[arg(short, long)]
        format: Option<String>,
    },

    /// Category-grouped KPI summary of the latest month
    Summary {
        /// Path to the workbook
        file: PathBuf,

        /// Property to summarize (all properties when omitted)
        #[arg(short, long)]
        property: Option<String>,

        /// Force a format by name instead of detecting it
        #[arg(short, long)]
        format: Option<String>,
    },
}

/// Parse `YYYY-MM-DD`
pub fn parse_date_arg(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| format!("Invalid date '{}'. Use YYYY-MM-DD", s))
}

/// Parse `YYYY-MM` into the first day of that month
pub fn parse_month_arg(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(&format!("{}-01", s.trim()), "%Y-%m-%d")
        .map_err(|_| format!("Invalid period '{}'. Use YYYY-MM", s))
}
