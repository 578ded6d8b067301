//! Output formatting module for CLI display
//!
//! This module handles all terminal output formatting, separating
//! the concerns of data calculation from presentation.

use colored::Colorize;
use itertools::Itertools;
use serde::Serialize;
use tabled::{
    settings::{object::Columns, Alignment, Style},
    Table, Tabled,
};

use crate::importers::{FormatDescriptor, FormatKind, QualityIssue};
use crate::reports::payload::{BudgetVariances, RollingVariance};
use crate::reports::{KpiSummary, MinimalAnalysis, PropertyAnalysisResult};
use crate::timeseries::IngestReport;
use crate::utils::{format_currency_opt, format_percent, format_signed_percent};
use crate::workbook::Workbook;
use std::collections::BTreeMap;

/// Pretty JSON, or an error object when serialization fails
pub fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| format!(r#"{{"error": "JSON serialization failed: {}"}}"#, e))
}

fn colored_percent(value: Option<f64>) -> String {
    let text = format_signed_percent(value);
    match value {
        Some(v) if v > 0.0 => text.green().to_string(),
        Some(v) if v < 0.0 => text.red().to_string(),
        _ => text,
    }
}

/// Format the registered formats
pub fn format_formats_table(descriptors: &[FormatDescriptor]) -> String {
    #[derive(Tabled)]
    struct FormatRow {
        #[tabled(rename = "Format")]
        name: String,
        #[tabled(rename = "Description")]
        description: String,
        #[tabled(rename = "Expected Metrics")]
        metrics: String,
    }

    let rows: Vec<FormatRow> = descriptors
        .iter()
        .map(|d| FormatRow {
            name: d.format_name.to_string(),
            description: d.description.to_string(),
            metrics: d.expected_metric_patterns.join(", "),
        })
        .collect();

    let mut table = Table::new(&rows);
    table.with(Style::rounded());
    format!(
        "\n{} {} registered format(s)\n\n{}\n",
        "📚".cyan().bold(),
        descriptors.len(),
        table
    )
}

/// Format sheet dimensions and the format probe results for a workbook
pub fn format_inspect(file: &str, workbook: &Workbook, probes: &[(FormatKind, bool)]) -> String {
    #[derive(Tabled)]
    struct SheetRow {
        #[tabled(rename = "Sheet")]
        name: String,
        #[tabled(rename = "Rows")]
        rows: usize,
        #[tabled(rename = "Columns")]
        columns: usize,
        #[tabled(rename = "Visible")]
        visible: String,
    }

    #[derive(Tabled)]
    struct ProbeRow {
        #[tabled(rename = "Format")]
        name: String,
        #[tabled(rename = "Claims Workbook")]
        claims: String,
    }

    let sheets: Vec<SheetRow> = workbook
        .sheets()
        .iter()
        .map(|s| SheetRow {
            name: s.name.clone(),
            rows: s.height(),
            columns: s.width(),
            visible: if s.visible { "yes" } else { "no" }.to_string(),
        })
        .collect();

    let probe_rows: Vec<ProbeRow> = probes
        .iter()
        .map(|(kind, claims)| ProbeRow {
            name: kind.name().to_string(),
            claims: if *claims {
                "yes".green().to_string()
            } else {
                "no".bright_black().to_string()
            },
        })
        .collect();

    let mut sheet_table = Table::new(&sheets);
    sheet_table.with(Style::modern());
    sheet_table.modify(Columns::new(1..3), Alignment::right());

    let mut probe_table = Table::new(&probe_rows);
    probe_table.with(Style::modern());

    format!(
        "\n{} Inspecting file: {}\n\n{} Found {} sheet(s):\n{}\n\n{} Format detection:\n{}\n",
        "📊".cyan().bold(),
        file.green(),
        "📄".cyan().bold(),
        sheets.len(),
        sheet_table,
        "🔎".cyan().bold(),
        probe_table
    )
}

/// Format per-property counts of an ingest run
pub fn format_process_summary(report: &IngestReport, fingerprint: &str) -> String {
    #[derive(Tabled)]
    struct PropertyRow {
        #[tabled(rename = "Property")]
        property: String,
        #[tabled(rename = "Sheets")]
        sheets: String,
        #[tabled(rename = "Monthly Rows")]
        monthly: usize,
        #[tabled(rename = "YTD Rows")]
        ytd: usize,
        #[tabled(rename = "Months")]
        months: usize,
        #[tabled(rename = "Latest")]
        latest: String,
    }

    let table_data = &report.table;
    let rows: Vec<PropertyRow> = table_data
        .properties()
        .iter()
        .filter_map(|p| table_data.property_slice(p).ok())
        .map(|slice| {
            let months = slice.months();
            PropertyRow {
                property: slice.property.clone(),
                sheets: slice
                    .rows
                    .iter()
                    .map(|r| r.observation.sheet.as_str())
                    .unique()
                    .join(", "),
                monthly: slice.monthly().count(),
                ytd: slice.ytd().count(),
                months: months.len(),
                latest: months
                    .last()
                    .map(|m| m.format("%b %Y").to_string())
                    .unwrap_or_else(|| "N/A".to_string()),
            }
        })
        .collect();

    let mut table = Table::new(&rows);
    table.with(Style::modern());
    table.modify(Columns::new(2..5), Alignment::right());

    let mut output = format!(
        "\n{} Format: {}\n{} {} canonical rows across {} propert{}\n\n{}\n",
        "✓".green().bold(),
        report.format.name().bold(),
        "✓".green().bold(),
        report.table.len(),
        rows.len(),
        if rows.len() == 1 { "y" } else { "ies" },
        table
    );
    output.push_str(&format_issues(report.issues()));
    output.push_str(&format!("\n{} {}\n", "Fingerprint:".bold(), fingerprint.bright_black()));
    output
}

/// Format quality issues, or a one-line confirmation when there are none
pub fn format_issues(issues: &[QualityIssue]) -> String {
    if issues.is_empty() {
        return format!("\n{} No quality issues\n", "✓".green().bold());
    }

    #[derive(Tabled)]
    struct IssueRow {
        #[tabled(rename = "Kind")]
        kind: String,
        #[tabled(rename = "Sheet")]
        sheet: String,
        #[tabled(rename = "Message")]
        message: String,
    }

    let rows: Vec<IssueRow> = issues
        .iter()
        .map(|i| IssueRow {
            kind: i.kind.label().to_string(),
            sheet: i.sheet.clone().unwrap_or_else(|| "-".to_string()),
            message: match &i.suggestion {
                Some(s) => format!("{} ({})", i.message, s),
                None => i.message.clone(),
            },
        })
        .collect();

    let mut table = Table::new(&rows);
    table.with(Style::modern());
    format!(
        "\n{} {} quality issue(s)\n{}\n",
        "⚠️".yellow(),
        issues.len(),
        table
    )
}

fn budget_table(variances: &BudgetVariances) -> String {
    #[derive(Tabled)]
    struct VarianceRow {
        #[tabled(rename = "Scope")]
        scope: String,
        #[tabled(rename = "Metric")]
        metric: String,
        #[tabled(rename = "Actual")]
        actual: String,
        #[tabled(rename = "Budget")]
        budget: String,
        #[tabled(rename = "Variance")]
        variance: String,
        #[tabled(rename = "Variance %")]
        variance_pct: String,
    }

    let rows: Vec<VarianceRow> = [("Monthly", &variances.monthly), ("YTD", &variances.ytd)]
        .into_iter()
        .flat_map(|(scope, map)| {
            map.iter().map(move |(metric, v)| VarianceRow {
                scope: scope.to_string(),
                metric: metric.clone(),
                actual: format_currency_opt(v.actual),
                budget: format_currency_opt(v.budget),
                variance: format_currency_opt(v.variance_abs),
                variance_pct: colored_percent(v.variance_pct),
            })
        })
        .collect();

    if rows.is_empty() {
        return "  No budget data\n".to_string();
    }
    let mut table = Table::new(&rows);
    table.with(Style::modern());
    table.modify(Columns::new(2..), Alignment::right());
    format!("{}\n", table)
}

fn anomaly_table(anomalies: &BTreeMap<String, RollingVariance>) -> String {
    #[derive(Tabled)]
    struct AnomalyRow {
        #[tabled(rename = "Metric")]
        metric: String,
        #[tabled(rename = "Current")]
        current: String,
        #[tabled(rename = "Prior Avg")]
        prior_avg: String,
        #[tabled(rename = "Months")]
        months: usize,
        #[tabled(rename = "Variance %")]
        variance_pct: String,
    }

    let rows: Vec<AnomalyRow> = anomalies
        .iter()
        .map(|(metric, v)| AnomalyRow {
            metric: metric.clone(),
            current: format_currency_opt(v.current),
            prior_avg: format_currency_opt(v.prior_avg),
            months: v.prior_months,
            variance_pct: colored_percent(v.variance_pct),
        })
        .collect();

    if rows.is_empty() {
        return "  Not enough prior months\n".to_string();
    }
    let mut table = Table::new(&rows);
    table.with(Style::modern());
    table.modify(Columns::new(1..), Alignment::right());
    format!("{}\n", table)
}

/// Format the analysis payload for terminal display
pub fn format_analysis(result: &PropertyAnalysisResult) -> String {
    #[derive(Tabled)]
    struct MomRow {
        #[tabled(rename = "Metric")]
        metric: String,
        #[tabled(rename = "Current")]
        current: String,
        #[tabled(rename = "Prior")]
        prior: String,
        #[tabled(rename = "Change")]
        change: String,
        #[tabled(rename = "Change %")]
        change_pct: String,
    }

    let mut output = format!(
        "\n{} {} - {} (prior: {})\n",
        "🏢".cyan().bold(),
        result.property_name.bold(),
        result.report_period,
        result.prior_period
    );
    output.push_str(&format!(
        "{}\n",
        result.diagnostics.reason.bright_black()
    ));
    if result.diagnostics.detection.is_weak() {
        output.push_str(&format!(
            "{} Report period is a weak guess, check the workbook\n",
            "⚠️".yellow()
        ));
    }

    let mom: Vec<MomRow> = result
        .mom_changes
        .iter()
        .map(|(metric, c)| MomRow {
            metric: metric.clone(),
            current: format_currency_opt(c.current),
            prior: format_currency_opt(c.prior),
            change: format_currency_opt(c.change_abs),
            change_pct: colored_percent(c.change_pct),
        })
        .collect();
    output.push_str(&format!("\n{}\n", "Month over month".bold()));
    if mom.is_empty() {
        output.push_str("  No prior month\n");
    } else {
        let mut table = Table::new(&mom);
        table.with(Style::modern());
        table.modify(Columns::new(1..), Alignment::right());
        output.push_str(&format!("{}\n", table));
    }

    output.push_str(&format!("\n{}\n", "Budget variances".bold()));
    output.push_str(&budget_table(&result.budget_variances));

    output.push_str(&format!("\n{}\n", "Rolling average anomalies".bold()));
    output.push_str(&anomaly_table(&result.rolling_average_variances));

    let ratios = &result.key_ratios;
    output.push_str(&format!("\n{}\n", "Key ratios".bold()));
    for (label, value) in [
        ("Collection rate", ratios.collection_rate_pct),
        ("Vacancy rate", ratios.vacancy_rate_pct),
        ("Delinquency rate", ratios.delinquency_rate_pct),
        ("Expense ratio", ratios.expense_ratio_pct),
        ("Loss-to-lease rate", ratios.loss_to_lease_rate_pct),
        ("Economic occupancy", ratios.economic_occupancy_pct),
        ("NOI margin", ratios.noi_margin_pct),
    ] {
        output.push_str(&format!("  {:<20} {}\n", label, format_percent(value)));
    }

    output
}

/// Format the minimized payload for terminal display
pub fn format_minimal(result: &MinimalAnalysis) -> String {
    format!(
        "\n{} {} - {}\n\n{}\n{}\n{}\n{}",
        "🏢".cyan().bold(),
        result.property_name.bold(),
        result.report_period,
        "Budget variances".bold(),
        budget_table(&result.budget_variances),
        "Trailing anomalies".bold(),
        anomaly_table(&result.trailing_anomalies)
    )
}

/// Format a KPI summary with styled section headings
pub fn format_kpi_summary(summary: &KpiSummary) -> String {
    let mut output = format!(
        "\n{}\n{} {}\n{} {}\n",
        format!("=== {} ===", summary.heading()).cyan().bold(),
        "Property:".bold(),
        summary.property,
        "Sheet:".bold(),
        summary.sheet
    );
    for section in &summary.sections {
        output.push_str(&format!("\n{}\n", format!("=== {} ===", section.title).bold()));
        for line in &section.lines {
            output.push_str(line);
            output.push('\n');
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::importers::IssueKind;

    #[test]
    fn test_formats_table_lists_every_format() {
        colored::control::set_override(false);
        let descriptors: Vec<FormatDescriptor> =
            FormatKind::ALL.iter().map(|k| k.descriptor()).collect();
        let text = format_formats_table(&descriptors);
        assert!(text.contains("3 registered format(s)"));
        for kind in FormatKind::ALL {
            assert!(text.contains(kind.name()));
        }
    }

    #[test]
    fn test_issue_table() {
        colored::control::set_override(false);
        assert!(format_issues(&[]).contains("No quality issues"));

        let issues = vec![QualityIssue::new(IssueKind::SheetSkipped, "no month header")
            .on_sheet("Notes")
            .with_suggestion("remove the sheet")];
        let text = format_issues(&issues);
        assert!(text.contains("sheet_skipped"));
        assert!(text.contains("Notes"));
        assert!(text.contains("no month header (remove the sheet)"));
    }

    #[test]
    fn test_to_json_is_pretty() {
        let json = to_json(&serde_json::json!({"a": 1}));
        assert_eq!(json, "{\n  \"a\": 1\n}");
    }
}
