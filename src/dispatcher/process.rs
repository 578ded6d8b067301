use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use std::path::Path;

use super::Context;
use crate::cli::formatters::{format_process_summary, to_json};
use crate::importers::QualityIssue;
use crate::timeseries::CanonicalRow;

pub fn dispatch_process(
    ctx: &Context,
    file: &Path,
    format: Option<&str>,
    sheet: Option<&str>,
    csv: Option<&Path>,
) -> Result<()> {
    #[derive(Serialize)]
    struct JsonProcess<'a> {
        format: &'static str,
        fingerprint: String,
        quality_issues: &'a [QualityIssue],
        rows: &'a [CanonicalRow],
    }

    let report = ctx.ingest(file, format, sheet)?;
    let fingerprint = report.table.fingerprint()?;

    if let Some(path) = csv {
        report.table.export_csv(path)?;
    }

    if ctx.json {
        let payload = JsonProcess {
            format: report.format.name(),
            fingerprint,
            quality_issues: report.issues(),
            rows: report.table.rows(),
        };
        println!("{}", to_json(&payload));
        return Ok(());
    }

    print!("{}", format_process_summary(&report, &fingerprint));
    if let Some(path) = csv {
        println!(
            "{} Wrote {} rows to {}",
            "✓".green().bold(),
            report.table.len(),
            path.display().to_string().green()
        );
    }
    Ok(())
}
