use anyhow::{Context as _, Result};
use chrono::NaiveDate;
use colored::Colorize;
use std::path::Path;
use tracing::warn;

use super::Context;
use crate::cli::formatters::{format_analysis, format_kpi_summary, format_minimal, to_json};
use crate::error::AnalysisError;
use crate::reports::{KpiSummary, PropertyAnalyzer};
use crate::timeseries::CanonicalTimeSeries;

/// Runs `build` for the named property, or for every property in the table.
///
/// A named property that fails is an error; in the all-properties case a
/// failing property is reported and skipped.
fn for_properties<T>(
    table: &CanonicalTimeSeries,
    property: Option<&str>,
    mut build: impl FnMut(&str) -> Result<T, AnalysisError>,
) -> Result<Vec<T>> {
    if let Some(name) = property {
        let item = build(name).with_context(|| format!("Failed to analyze property '{}'", name))?;
        return Ok(vec![item]);
    }

    let mut items = Vec::new();
    for name in table.properties() {
        match build(&name) {
            Ok(item) => items.push(item),
            Err(e) => {
                warn!("Skipping property '{}': {}", name, e);
                eprintln!("{} Skipping {}: {}", "⚠️".yellow(), name.yellow(), e);
            }
        }
    }
    Ok(items)
}

pub fn dispatch_analyze(
    ctx: &Context,
    file: &Path,
    format: Option<&str>,
    property: Option<&str>,
    period: Option<NaiveDate>,
    minimal: bool,
) -> Result<()> {
    let report = ctx.ingest(file, format, None)?;
    let analyzer = PropertyAnalyzer::new(&report.table, &ctx.settings.analysis);
    let results = for_properties(&report.table, property, |name| analyzer.analyze(name, period))?;

    if minimal {
        let minimized: Vec<_> = results.iter().map(|r| r.minimized()).collect();
        if ctx.json {
            match (property, minimized.as_slice()) {
                (Some(_), [single]) => println!("{}", to_json(single)),
                _ => println!("{}", to_json(&minimized)),
            }
        } else {
            for result in &minimized {
                print!("{}", format_minimal(result));
            }
        }
        return Ok(());
    }

    if ctx.json {
        match (property, results.as_slice()) {
            (Some(_), [single]) => println!("{}", to_json(single)),
            _ => println!("{}", to_json(&results)),
        }
    } else {
        for result in &results {
            print!("{}", format_analysis(result));
        }
    }
    Ok(())
}

pub fn dispatch_summary(
    ctx: &Context,
    file: &Path,
    format: Option<&str>,
    property: Option<&str>,
) -> Result<()> {
    let report = ctx.ingest(file, format, None)?;
    let summaries = for_properties(&report.table, property, |name| {
        KpiSummary::build(&report.table, name, &ctx.settings.analysis)
    })?;

    if ctx.json {
        println!("{}", to_json(&summaries));
    } else {
        for summary in &summaries {
            print!("{}", format_kpi_summary(summary));
        }
    }
    Ok(())
}
