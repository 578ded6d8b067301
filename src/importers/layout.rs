//! Extraction steps shared by every layout
//!
//! A processor locates its header and decides which columns hold actuals and
//! budgets. Everything after that is common: reading metric labels, the
//! actual/budget outer join, the budget cutoff, the trailing window and the
//! final row filter.

use chrono::{Datelike, Months, NaiveDate};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;
use unicode_normalization::UnicodeNormalization;

use super::scalars::{first_of_month, NumericGuard, PeriodToken};
use super::validation::{IssueKind, QualityIssue, QualityLog};
use super::IngestOptions;
use crate::models::MetricObservation;
use crate::workbook::{Cell, Sheet};

/// A metric row located beneath a header
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRow {
    /// Absolute row index in the sheet
    pub row: usize,
    /// Unique label within the sheet
    pub name: String,
}

/// Trims, NFKC-normalizes and collapses internal whitespace
pub fn normalize_label(raw: &str) -> String {
    let nfkc: String = raw.nfkc().collect();
    nfkc.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercase alphanumerics only, for loose metric comparisons
pub fn metric_fingerprint(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// Label for a metric cell.
///
/// Bare decimals in (0, 1) are cap-rate rows and become
/// `Valuation p/unit N%`.
pub fn metric_label(cell: &Cell) -> Option<String> {
    match cell {
        Cell::Empty => None,
        Cell::Number(n) if *n > 0.0 && *n < 1.0 => {
            let pct = ((n * 100.0) * 100.0).round() / 100.0;
            let pct_str = if pct.fract() == 0.0 {
                format!("{}", pct as i64)
            } else {
                format!("{}", pct)
            };
            Some(format!("Valuation p/unit {}%", pct_str))
        }
        other => {
            let label = normalize_label(&other.display());
            if label.is_empty() {
                None
            } else {
                Some(label)
            }
        }
    }
}

/// Reads metric labels below `header_row` from column 0.
///
/// Blank labels and rows accepted by `is_repeated_header` are dropped.
/// Duplicate labels become `"<name> (2)"`, `"<name> (3)"` and are reported.
pub fn read_metric_rows<F>(
    sheet: &Sheet,
    header_row: usize,
    is_repeated_header: F,
    issues: &mut QualityLog,
) -> Vec<MetricRow>
where
    F: Fn(&[Cell]) -> bool,
{
    let mut rows = Vec::new();
    let mut seen: HashMap<String, usize> = HashMap::new();

    for row_idx in (header_row + 1)..sheet.height() {
        let cells = sheet.row(row_idx);
        let Some(label) = metric_label(sheet.cell(row_idx, 0)) else {
            continue;
        };
        if is_repeated_header(cells) {
            debug!("Skipping repeated header at row {} of '{}'", row_idx + 1, sheet.name);
            continue;
        }

        let count = seen.entry(label.clone()).or_insert(0);
        *count += 1;
        let name = if *count > 1 {
            let renamed = format!("{} ({})", label, count);
            issues.record(
                QualityIssue::new(
                    IssueKind::DuplicateMetric,
                    format!(
                        "metric '{}' repeated at row {}, kept as '{}'",
                        label,
                        row_idx + 1,
                        renamed
                    ),
                )
                .on_sheet(&sheet.name),
            );
            renamed
        } else {
            label
        };

        rows.push(MetricRow { row: row_idx, name });
    }

    rows
}

/// For each metric row, whether it may carry a budget.
///
/// Every row after the first one whose name contains `marker`
/// (case-insensitive) is a below-the-line item and is never budgeted.
pub fn budget_allowed(rows: &[MetricRow], marker: &str) -> Vec<bool> {
    let marker = marker.to_lowercase();
    let cutoff = rows
        .iter()
        .position(|r| r.name.to_lowercase().contains(&marker));
    (0..rows.len())
        .map(|idx| match cutoff {
            Some(c) => idx <= c,
            None => true,
        })
        .collect()
}

/// Columns of a header row that hold periods, plus the ones that do not parse
pub fn scan_period_columns<I>(sheet: &Sheet, header_row: usize, columns: I) -> (Vec<(usize, PeriodToken)>, Vec<String>)
where
    I: IntoIterator<Item = usize>,
{
    let mut periods = Vec::new();
    let mut rejected = Vec::new();
    for col in columns {
        let cell = sheet.cell(header_row, col);
        if cell.is_empty() {
            continue;
        }
        match super::scalars::period_from_cell(cell) {
            Some(token) => periods.push((col, token)),
            None => rejected.push(cell.display()),
        }
    }
    (periods, rejected)
}

pub fn record_unparseable_periods(sheet: &str, rejected: &[String], issues: &mut QualityLog) {
    if rejected.is_empty() {
        return;
    }
    issues.record(
        QualityIssue::new(
            IssueKind::UnparseablePeriod,
            format!(
                "{} header cell(s) are not periods and were skipped: {}",
                rejected.len(),
                rejected.join(", ")
            ),
        )
        .on_sheet(sheet),
    );
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Pair {
    actual: Option<f64>,
    budget: Option<f64>,
}

/// Inclusive range of months kept for a sheet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Window {
    pub fn ending_at(end: NaiveDate, months: u32) -> Self {
        let span = months.saturating_sub(1);
        let start = end.checked_sub_months(Months::new(span)).unwrap_or(end);
        Self { start, end }
    }

    pub fn contains(&self, month: NaiveDate) -> bool {
        month >= self.start && month <= self.end
    }
}

/// Outer join of actual and budget values keyed by (metric, period)
#[derive(Debug, Default)]
pub struct JoinedTable {
    metrics: Vec<String>,
    index: HashMap<String, usize>,
    cells: BTreeMap<(usize, PeriodToken), Pair>,
}

impl JoinedTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn metric_index(&mut self, metric: &str) -> usize {
        if let Some(idx) = self.index.get(metric) {
            return *idx;
        }
        let idx = self.metrics.len();
        self.metrics.push(metric.to_string());
        self.index.insert(metric.to_string(), idx);
        idx
    }

    pub fn put_actual(&mut self, metric: &str, period: PeriodToken, value: Option<f64>) {
        let idx = self.metric_index(metric);
        self.cells.entry((idx, period)).or_default().actual = value;
    }

    pub fn put_budget(&mut self, metric: &str, period: PeriodToken, value: Option<f64>) {
        let idx = self.metric_index(metric);
        self.cells.entry((idx, period)).or_default().budget = value;
    }

    /// Reads a block of value columns for every metric row into one side
    /// of the join.
    pub fn load_block(
        &mut self,
        sheet: &Sheet,
        rows: &[MetricRow],
        columns: &[(usize, PeriodToken)],
        side: Side,
        allowed: Option<&[bool]>,
        guard: &mut NumericGuard,
    ) {
        for (row_pos, metric) in rows.iter().enumerate() {
            let budget_ok = allowed
                .and_then(|a| a.get(row_pos).copied())
                .unwrap_or(true);
            for (col, period) in columns {
                let value = guard.read(sheet.cell(metric.row, *col));
                match side {
                    Side::Actual => self.put_actual(&metric.name, *period, value),
                    Side::Budget => {
                        let value = if budget_ok { value } else { None };
                        self.put_budget(&metric.name, *period, value)
                    }
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Months present in the join, ascending
    pub fn months(&self) -> Vec<NaiveDate> {
        let mut months: Vec<NaiveDate> = self
            .cells
            .keys()
            .filter_map(|(_, p)| p.month())
            .collect();
        months.sort();
        months.dedup();
        months
    }

    fn latest_nonzero_month<F>(&self, ceiling: NaiveDate, include: F) -> Option<NaiveDate>
    where
        F: Fn(&str) -> bool,
    {
        self.cells
            .iter()
            .filter_map(|((idx, period), pair)| {
                let month = period.month()?;
                let nonzero = pair.actual.map(|v| v != 0.0).unwrap_or(false);
                (month <= ceiling && nonzero && include(&self.metrics[*idx])).then_some(month)
            })
            .max()
    }

    /// Locates the trailing window.
    ///
    /// The boundary is the latest month, not after `as_of`, in which a core
    /// metric has a non-zero actual. Without one, any metric with a non-zero
    /// actual counts, and as a last resort the latest month present.
    pub fn t12_window(&self, options: &IngestOptions) -> Option<Window> {
        let ceiling = first_of_month(options.as_of);
        let core: Vec<String> = options
            .settings
            .core_metrics
            .iter()
            .map(|m| metric_fingerprint(m))
            .collect();

        let boundary = self
            .latest_nonzero_month(ceiling, |name| core.contains(&metric_fingerprint(name)))
            .or_else(|| self.latest_nonzero_month(ceiling, |_| true))
            .or_else(|| self.months().into_iter().filter(|m| *m <= ceiling).max())?;

        Some(Window::ending_at(boundary, options.settings.t12_months))
    }

    /// Adds YTD rows summing the months of the boundary year up to the
    /// boundary month. The budget total is `None` when no month had a budget.
    pub fn synthesize_ytd(&mut self, boundary: NaiveDate) {
        let mut totals: BTreeMap<usize, Pair> = BTreeMap::new();
        for ((idx, period), pair) in &self.cells {
            let Some(month) = period.month() else {
                continue;
            };
            if month.year() != boundary.year() || month > boundary {
                continue;
            }
            let total = totals.entry(*idx).or_default();
            if let Some(a) = pair.actual {
                total.actual = Some(total.actual.unwrap_or(0.0) + a);
            }
            if let Some(b) = pair.budget {
                total.budget = Some(total.budget.unwrap_or(0.0) + b);
            }
        }
        for (idx, mut total) in totals {
            if total.actual.is_none() {
                total.actual = Some(0.0);
            }
            self.cells.insert((idx, PeriodToken::Ytd), total);
        }
    }

    /// Emits observations for months inside `window` and every YTD cell,
    /// dropping rows whose actual and budget are both null or zero.
    pub fn into_observations(
        self,
        property: &str,
        sheet: &str,
        window: Option<Window>,
    ) -> Vec<MetricObservation> {
        let mut out = Vec::new();
        for ((idx, period), pair) in self.cells {
            let blank = |v: Option<f64>| v.map(|x| x == 0.0).unwrap_or(true);
            if blank(pair.actual) && blank(pair.budget) {
                continue;
            }
            let metric = &self.metrics[idx];
            match period {
                PeriodToken::Month(month) => {
                    if window.map(|w| w.contains(month)).unwrap_or(false) {
                        out.push(MetricObservation::monthly(
                            property,
                            sheet,
                            metric,
                            month,
                            pair.actual,
                            pair.budget,
                        ));
                    }
                }
                PeriodToken::Ytd => out.push(MetricObservation::ytd(
                    property,
                    sheet,
                    metric,
                    pair.actual,
                    pair.budget,
                )),
            }
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Actual,
    Budget,
}

/// Turns the guard's counters into one issue each
pub fn record_guard_counters(sheet: &str, guard: &NumericGuard, issues: &mut QualityLog) {
    if guard.parse_failures > 0 {
        issues.record(
            QualityIssue::new(
                IssueKind::NumericParseFailure,
                format!("{} cell(s) could not be parsed as numbers and were left blank", guard.parse_failures),
            )
            .on_sheet(sheet),
        );
    }
    if guard.overflow_sentinels > 0 {
        issues.record(
            QualityIssue::new(
                IssueKind::OverflowSentinel,
                format!("{} out-of-range value(s) treated as blank sentinels and set to 0", guard.overflow_sentinels),
            )
            .on_sheet(sheet)
            .with_suggestion("Check the source workbook for formula errors or placeholder values"),
        );
    }
}

/// Records how many metric rows carried no value in any period column
pub fn record_missing_values(
    sheet: &str,
    rows: &[MetricRow],
    observations: &[MetricObservation],
    issues: &mut QualityLog,
) {
    let missing = rows
        .iter()
        .filter(|r| !observations.iter().any(|o| o.metric_name == r.name))
        .count();
    if missing > 0 {
        issues.record(
            QualityIssue::new(
                IssueKind::MissingValues,
                format!("{} metric row(s) had no non-zero values and were dropped", missing),
            )
            .on_sheet(sheet),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IngestSettings;

    fn d(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).unwrap()
    }

    fn options(as_of: NaiveDate) -> IngestOptions {
        IngestOptions {
            settings: IngestSettings::default(),
            as_of,
        }
    }

    fn rows(names: &[&str]) -> Vec<MetricRow> {
        names
            .iter()
            .enumerate()
            .map(|(i, n)| MetricRow {
                row: i + 1,
                name: n.to_string(),
            })
            .collect()
    }

    #[test]
    fn test_metric_label_valuation_rows() {
        assert_eq!(
            metric_label(&Cell::Number(0.065)).as_deref(),
            Some("Valuation p/unit 6.5%")
        );
        assert_eq!(
            metric_label(&Cell::Number(0.07)).as_deref(),
            Some("Valuation p/unit 7%")
        );
        assert_eq!(metric_label(&Cell::Number(1200.0)).as_deref(), Some("1200"));
        assert_eq!(
            metric_label(&Cell::text("  Net   Eff. Gross Income ")).as_deref(),
            Some("Net Eff. Gross Income")
        );
        assert_eq!(metric_label(&Cell::Empty), None);
    }

    #[test]
    fn test_budget_cutoff_after_monthly_cash_flow() {
        let r = rows(&["A", "B", "Monthly Cash Flow", "C", "D"]);
        assert_eq!(
            budget_allowed(&r, "monthly cash flow"),
            vec![true, true, true, false, false]
        );
        assert_eq!(budget_allowed(&rows(&["A", "B"]), "monthly cash flow"), vec![true, true]);
    }

    #[test]
    fn test_read_metric_rows_disambiguates_duplicates() {
        let sheet = Sheet::new(
            "S",
            true,
            vec![
                vec![Cell::text("Metric"), Cell::text("Jul 2024")],
                vec![Cell::text("Repairs"), Cell::Number(1.0)],
                vec![Cell::Empty, Cell::Number(2.0)],
                vec![Cell::text("Metric"), Cell::text("Jul 2024")],
                vec![Cell::text("Repairs"), Cell::Number(3.0)],
            ],
        );
        let mut issues = QualityLog::new();
        let found = read_metric_rows(
            &sheet,
            0,
            |cells| cells.iter().any(|c| c.as_text() == Some("Jul 2024")),
            &mut issues,
        );
        let names: Vec<&str> = found.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Repairs", "Repairs (2)"]);
        assert!(issues.has(IssueKind::DuplicateMetric));
    }

    #[test]
    fn test_window_ending_at() {
        let w = Window::ending_at(d(2024, 7), 12);
        assert_eq!(w.start, d(2023, 8));
        assert!(w.contains(d(2024, 7)));
        assert!(!w.contains(d(2024, 8)));
        assert!(!w.contains(d(2023, 7)));
    }

    #[test]
    fn test_t12_window_uses_core_metric_and_ignores_future() {
        let mut table = JoinedTable::new();
        for m in 1..=12 {
            table.put_actual("EBITDA (NOI)", PeriodToken::Month(d(2024, m)), Some(if m <= 9 { 100.0 } else { 0.0 }));
            table.put_actual("Other Income", PeriodToken::Month(d(2024, m)), Some(5.0));
        }
        table.put_actual("EBITDA (NOI)", PeriodToken::Month(d(2025, 3)), Some(50.0));

        let w = table.t12_window(&options(d(2024, 12))).unwrap();
        assert_eq!(w.end, d(2024, 9));
        assert_eq!(w.start, d(2023, 10));
    }

    #[test]
    fn test_t12_window_falls_back_to_any_metric() {
        let mut table = JoinedTable::new();
        table.put_actual("Other Income", PeriodToken::Month(d(2024, 4)), Some(5.0));
        table.put_actual("Other Income", PeriodToken::Month(d(2024, 5)), Some(0.0));
        let w = table.t12_window(&options(d(2025, 1))).unwrap();
        assert_eq!(w.end, d(2024, 4));
    }

    #[test]
    fn test_into_observations_drops_blank_pairs() {
        let mut table = JoinedTable::new();
        table.put_actual("A", PeriodToken::Month(d(2024, 1)), Some(0.0));
        table.put_budget("A", PeriodToken::Month(d(2024, 1)), None);
        table.put_actual("B", PeriodToken::Month(d(2024, 1)), None);
        table.put_budget("B", PeriodToken::Month(d(2024, 1)), Some(10.0));
        table.put_actual("B", PeriodToken::Ytd, Some(7.0));

        let window = Some(Window::ending_at(d(2024, 1), 12));
        let obs = table.into_observations("P", "P", window);
        assert_eq!(obs.len(), 2);
        assert_eq!(obs[0].metric_name, "B");
        assert_eq!(obs[0].budget_value, Some(10.0));
        assert!(obs[1].is_ytd);
    }

    #[test]
    fn test_synthesize_ytd_sums_boundary_year() {
        let mut table = JoinedTable::new();
        table.put_actual("NOI", PeriodToken::Month(d(2023, 12)), Some(1000.0));
        table.put_actual("NOI", PeriodToken::Month(d(2024, 1)), Some(10.0));
        table.put_actual("NOI", PeriodToken::Month(d(2024, 2)), Some(20.0));
        table.put_actual("NOI", PeriodToken::Month(d(2024, 3)), Some(99.0));
        table.put_budget("NOI", PeriodToken::Month(d(2024, 1)), Some(15.0));

        table.synthesize_ytd(d(2024, 2));
        let obs = table.into_observations("P", "P-Fin", None);
        let ytd = obs.iter().find(|o| o.is_ytd).unwrap();
        assert_eq!(ytd.actual_value, Some(30.0));
        assert_eq!(ytd.budget_value, Some(15.0));
    }

    #[test]
    fn test_synthesize_ytd_budget_none_without_budgets() {
        let mut table = JoinedTable::new();
        table.put_actual("NOI", PeriodToken::Month(d(2024, 1)), Some(10.0));
        table.synthesize_ytd(d(2024, 1));
        let obs = table.into_observations("P", "P-Fin", None);
        assert_eq!(obs.len(), 1);
        assert_eq!(obs[0].budget_value, None);
    }

    #[test]
    fn test_metric_fingerprint() {
        assert_eq!(metric_fingerprint("EBITDA (NOI)"), "ebitdanoi");
        assert_eq!(metric_fingerprint("Net Eff. Gross Income"), "neteffgrossincome");
    }
}
