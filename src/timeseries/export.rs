//! CSV export and fingerprinting of the canonical table

use anyhow::{Context, Result};
use csv::WriterBuilder;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tracing::info;

use super::{CanonicalRow, CanonicalTimeSeries};

pub const CSV_HEADER: [&str; 11] = [
    "Property",
    "Sheet",
    "Metric",
    "Period",
    "PeriodParsed",
    "IsYTD",
    "Value",
    "BudgetValue",
    "Year",
    "Month_Name",
    "Is_Negative",
];

fn optional_number(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn record(row: &CanonicalRow) -> [String; 11] {
    let obs = &row.observation;
    [
        obs.property.clone(),
        obs.sheet.clone(),
        obs.metric_name.clone(),
        obs.period.clone(),
        obs.period_parsed
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default(),
        obs.is_ytd.to_string(),
        optional_number(obs.actual_value),
        optional_number(obs.budget_value),
        row.year.map(|y| y.to_string()).unwrap_or_default(),
        row.month_name.clone().unwrap_or_default(),
        row.is_negative.to_string(),
    ]
}

impl CanonicalTimeSeries {
    /// Writes the table as CSV with the canonical header
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv_writer = WriterBuilder::new().from_writer(writer);
        csv_writer.write_record(CSV_HEADER)?;
        for row in self.rows() {
            csv_writer.write_record(record(row))?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    pub fn to_csv_bytes(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        self.write_csv(&mut buffer)?;
        Ok(buffer)
    }

    pub fn export_csv(&self, path: &Path) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create CSV file {}", path.display()))?;
        self.write_csv(file)?;
        info!("Exported {} rows to {}", self.len(), path.display());
        Ok(())
    }

    /// blake3 digest of the CSV rendering; equal tables give equal digests
    pub fn fingerprint(&self) -> Result<String> {
        let bytes = self.to_csv_bytes()?;
        Ok(blake3::hash(&bytes).to_hex().to_string())
    }
}
