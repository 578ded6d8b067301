//! Per-property variance analytics
//!
//! Works on one property's slice of the canonical table: detects the report
//! period, then computes month-over-month moves, trailing statistics, budget
//! variances, rolling-average anomalies and key ratios.

use chrono::NaiveDate;
use itertools::Itertools;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use super::payload::{
    ActualBudget, BudgetVariances, DataHighlights, Detection, Diagnostics, KeyRatios, MomChange,
    MomMove, PeriodValues, PropertyAnalysisResult, RollingVariance, SeriesPoint, T12Stats,
    ValidationInfo, Variance, YtdAggregates,
};
use super::stats::{
    classify_trend, mean, pct_change_or_zero, pct_of, round2, round_opt, safe_div, std_dev,
    trailing_mean,
};
use crate::config::AnalysisSettings;
use crate::error::AnalysisError;
use crate::importers::scalars::first_of_month;
use crate::importers::{IssueKind, QualityIssue};
use crate::timeseries::{CanonicalRow, CanonicalTimeSeries};
use crate::utils::metric_key;

pub const ASKING_RENT: &str = "Property Asking Rent";
pub const NET_EFFECTIVE_INCOME: &str = "Net Eff. Gross Income";
pub const GROSS_SCHEDULED_RENT: &str = "Gross Scheduled Rent";
pub const VACANCY: &str = "Vacancy";
pub const DELINQUENCY: &str = "Delinquency";
pub const TOTAL_EXPENSE: &str = "Total Expense";
pub const LOSS_TO_LEASE: &str = "Loss to lease";
pub const NOI: &str = "EBITDA (NOI)";

const TOP_MOM_MOVES: usize = 5;

fn month_label(month: NaiveDate) -> String {
    month.format("%B %Y").to_string()
}

fn has_actual(row: &CanonicalRow) -> bool {
    row.actual().is_some_and(|v| v != 0.0)
}

fn same_metric(row: &CanonicalRow, lower: &str) -> bool {
    row.metric().trim().to_lowercase() == lower
}

fn contains_metric(row: &CanonicalRow, lower: &str) -> bool {
    row.metric().to_lowercase().contains(lower)
}

/// First row whose metric equals `name` case-insensitively, else the first
/// whose metric contains it
pub(crate) fn find_row<'r>(rows: &[&'r CanonicalRow], name: &str) -> Option<&'r CanonicalRow> {
    let lower = name.trim().to_lowercase();
    rows.iter()
        .copied()
        .find(|r| same_metric(r, &lower))
        .or_else(|| rows.iter().copied().find(|r| contains_metric(r, &lower)))
}

/// `numerator / denominator` in percent, rounded
fn ratio(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    round_opt(safe_div(numerator? * 100.0, denominator?))
}

fn period_values(row: &CanonicalRow) -> Option<PeriodValues> {
    let actual = row.actual()?;
    let budget = row.budget();
    Some(PeriodValues {
        actual: round2(actual),
        budget: round_opt(budget),
        variance_abs: budget.and_then(|b| round2(actual - b)),
        variance_pct: budget.and_then(|b| round_opt(pct_of(actual - b, b))),
    })
}

fn variance(row: &CanonicalRow) -> Option<Variance> {
    let actual = row.actual()?;
    let budget = row.budget()?;
    Some(Variance {
        actual: round2(actual),
        budget: round2(budget),
        variance_abs: round2(actual - budget),
        variance_pct: round2(pct_change_or_zero(actual, budget)),
    })
}

/// Monthly and YTD rows of one property with metric lookups
struct MetricView<'a> {
    monthly: Vec<&'a CanonicalRow>,
    ytd: Vec<&'a CanonicalRow>,
}

impl<'a> MetricView<'a> {
    fn at(&self, name: &str, month: NaiveDate) -> Option<&'a CanonicalRow> {
        let rows: Vec<&CanonicalRow> = self
            .monthly
            .iter()
            .copied()
            .filter(|r| r.month() == Some(month))
            .collect();
        find_row(&rows, name)
    }

    fn actual_at(&self, name: &str, month: NaiveDate) -> Option<f64> {
        self.at(name, month).and_then(|r| r.actual())
    }

    fn ytd(&self, name: &str) -> Option<&'a CanonicalRow> {
        find_row(&self.ytd, name)
    }

    /// Every monthly row of the metric `name` resolves to, ordered by month
    fn series(&self, name: &str) -> Vec<&'a CanonicalRow> {
        match find_row(&self.monthly, name) {
            Some(resolved) => self.rows_of(resolved.metric()),
            None => Vec::new(),
        }
    }

    /// Like `series` but without the substring fallback
    fn exact_series(&self, name: &str) -> Vec<&'a CanonicalRow> {
        let lower = name.trim().to_lowercase();
        self.monthly
            .iter()
            .copied()
            .filter(|r| same_metric(r, &lower))
            .sorted_by_key(|r| r.month())
            .collect()
    }

    fn rows_of(&self, metric: &str) -> Vec<&'a CanonicalRow> {
        self.monthly
            .iter()
            .copied()
            .filter(|r| r.metric() == metric)
            .sorted_by_key(|r| r.month())
            .collect()
    }
}

/// Builds `PropertyAnalysisResult`s from an assembled table
pub struct PropertyAnalyzer<'a> {
    table: &'a CanonicalTimeSeries,
    settings: &'a AnalysisSettings,
}

impl<'a> PropertyAnalyzer<'a> {
    pub fn new(table: &'a CanonicalTimeSeries, settings: &'a AnalysisSettings) -> Self {
        Self { table, settings }
    }

    /// Analyzes one property at the detected report period, or at `period`
    /// when one is requested (any day of the wanted month).
    pub fn analyze(
        &self,
        property: &str,
        period: Option<NaiveDate>,
    ) -> Result<PropertyAnalysisResult, AnalysisError> {
        let slice = self.table.property_slice(property)?;
        let view = MetricView {
            monthly: slice.monthly().collect(),
            ytd: slice.ytd().collect(),
        };
        let months = slice.months();
        let Some(&latest) = months.last() else {
            return Err(AnalysisError::NoMonthlyData(slice.property.clone()));
        };

        let (current, detection, reason) = match period {
            Some(requested) => {
                let wanted = first_of_month(requested);
                if !months.contains(&wanted) {
                    return Err(AnalysisError::PeriodNotAvailable {
                        property: slice.property.clone(),
                        period: wanted.format("%Y-%m").to_string(),
                        available: months.iter().map(|m| m.format("%Y-%m").to_string()).collect(),
                    });
                }
                (
                    wanted,
                    Detection::Requested,
                    format!("Report period {} was requested", month_label(wanted)),
                )
            }
            None => self.detect_period(&view, latest),
        };
        let prior = months.iter().copied().filter(|m| *m < current).max();
        info!(
            "Analyzing '{}' for {} ({:?})",
            slice.property,
            month_label(current),
            detection
        );

        let mut quality_issues = Vec::new();
        if detection.is_weak() {
            warn!("{}: {}", slice.property, reason);
            quality_issues.push(
                QualityIssue::new(IssueKind::WeakPeriodDetection, reason.clone())
                    .with_suggestion("Check that the workbook carries actual values for reported months"),
            );
        }

        let key_ratios = self.key_ratios(&view, current);
        let budget_variances = self.budget_variances(&view, current);
        let data_highlights = self.data_highlights(&view, current, prior, &key_ratios, &budget_variances);

        Ok(PropertyAnalysisResult {
            property_name: slice.property.clone(),
            report_period: month_label(current),
            prior_period: prior.map(month_label).unwrap_or_else(|| "N/A".to_string()),
            industry_benchmarks: self.settings.benchmarks.clone(),
            validation: ValidationInfo {
                property_selected: slice.property.clone(),
                monthly_rows: view.monthly.len(),
                ytd_rows: view.ytd.len(),
                months_available: months.iter().map(|m| m.format("%Y-%m").to_string()).collect(),
                metrics_count: view.monthly.iter().map(|r| r.metric()).unique().count(),
            },
            current_period_metrics: self.period_metrics(&view, Some(current)),
            prior_period_metrics: self.period_metrics(&view, prior),
            mom_changes: self.mom_changes(&view, current, prior),
            t12_trends: self.t12_trends(&view),
            ytd_aggregates: self.ytd_aggregates(&view),
            key_ratios,
            budget_variances,
            rolling_average_variances: self.rolling_variances(&view, current),
            data_highlights,
            all_metrics_current: all_metrics_at(&view, current),
            monthly_time_series: self.monthly_time_series(&view),
            diagnostics: Diagnostics {
                detected_month: current.format("%Y-%m-%d").to_string(),
                detection,
                reason,
                quality_issues,
            },
        })
    }

    /// Latest month with a non-zero core metric, else any non-zero metric,
    /// else the calendar maximum
    fn detect_period(&self, view: &MetricView, latest: NaiveDate) -> (NaiveDate, Detection, String) {
        let core: Vec<String> = self
            .settings
            .period_metrics
            .iter()
            .map(|m| m.trim().to_lowercase())
            .collect();

        let core_month = view
            .monthly
            .iter()
            .filter(|r| core.contains(&r.metric().trim().to_lowercase()))
            .filter(|r| has_actual(r))
            .filter_map(|r| r.month())
            .max();
        if let Some(month) = core_month {
            let reason = format!("Found data for core metrics up to {}", month_label(month));
            return (month, Detection::CoreMetrics, reason);
        }

        let any_month = view
            .monthly
            .iter()
            .filter(|r| has_actual(r))
            .filter_map(|r| r.month())
            .max();
        if let Some(month) = any_month {
            let reason = format!("No core metrics, found other data up to {}", month_label(month));
            return (month, Detection::AnyMetric, reason);
        }

        let reason = "No actual values found; falling back to the calendar maximum".to_string();
        (latest, Detection::CalendarMaximum, reason)
    }

    fn period_metrics(&self, view: &MetricView, month: Option<NaiveDate>) -> BTreeMap<String, PeriodValues> {
        let Some(month) = month else {
            return BTreeMap::new();
        };
        self.settings
            .key_metrics
            .iter()
            .filter_map(|name| {
                let values = view.at(name, month).and_then(period_values)?;
                Some((metric_key(name), values))
            })
            .collect()
    }

    fn mom_changes(
        &self,
        view: &MetricView,
        current: NaiveDate,
        prior: Option<NaiveDate>,
    ) -> BTreeMap<String, MomChange> {
        let Some(prior) = prior else {
            debug!("No prior month, skipping month-over-month changes");
            return BTreeMap::new();
        };
        self.settings
            .mom_metrics
            .iter()
            .filter_map(|name| {
                let now = view.actual_at(name, current)?;
                let before = view.actual_at(name, prior)?;
                let change = MomChange {
                    current: round2(now),
                    prior: round2(before),
                    change_abs: round2(now - before),
                    change_pct: round2(pct_change_or_zero(now, before)),
                };
                Some((metric_key(name), change))
            })
            .collect()
    }

    fn t12_trends(&self, view: &MetricView) -> BTreeMap<String, T12Stats> {
        self.settings
            .trend_metrics
            .iter()
            .filter_map(|name| {
                let stats = self.t12_stats(&view.series(name))?;
                Some((metric_key(name), stats))
            })
            .collect()
    }

    fn t12_stats(&self, rows: &[&CanonicalRow]) -> Option<T12Stats> {
        let points: Vec<(NaiveDate, f64)> = rows
            .iter()
            .filter_map(|r| Some((r.month()?, r.actual()?)))
            .collect();
        if points.len() < 2 {
            return None;
        }
        let values: Vec<f64> = points.iter().map(|(_, v)| *v).collect();
        let (min_month, min) = points.iter().copied().min_by(|a, b| a.1.total_cmp(&b.1))?;
        let (max_month, max) = points.iter().copied().max_by(|a, b| a.1.total_cmp(&b.1))?;
        let trend = classify_trend(&values, self.settings.trend_threshold_pct);
        let start = values[0];
        let end = values[values.len() - 1];

        Some(T12Stats {
            months_of_data: values.len(),
            average: round_opt(mean(&values)),
            total: round2(values.iter().sum()),
            min: round2(min),
            min_month: month_label(min_month),
            max: round2(max),
            max_month: month_label(max_month),
            std_dev: round_opt(std_dev(&values)),
            rolling_3mo_avg: round_opt(trailing_mean(&values, 3)),
            rolling_6mo_avg: round_opt(trailing_mean(&values, 6)),
            trend_direction: trend.map(|(direction, _)| direction),
            trend_magnitude_pct: trend.and_then(|(_, pct)| round2(pct)),
            period_start_value: round2(start),
            period_end_value: round2(end),
            total_change_pct: round_opt(pct_of(end - start, start)),
        })
    }

    fn loss(&self, value: f64) -> f64 {
        if self.settings.absolute_loss_numerators {
            value.abs()
        } else {
            value
        }
    }

    fn ytd_aggregates(&self, view: &MetricView) -> YtdAggregates {
        let metrics = self
            .settings
            .ytd_metrics
            .iter()
            .filter_map(|name| {
                let values = view.ytd(name).and_then(period_values)?;
                Some((metric_key(name), values))
            })
            .collect();

        let income = view.ytd(NET_EFFECTIVE_INCOME).and_then(|r| r.actual());
        let expense = view.ytd(TOTAL_EXPENSE).and_then(|r| r.actual());
        YtdAggregates {
            metrics,
            expense_ratio_pct: ratio(expense.map(|v| self.loss(v)), income),
        }
    }

    fn key_ratios(&self, view: &MetricView, month: NaiveDate) -> KeyRatios {
        let asking = view.actual_at(ASKING_RENT, month);
        let income = view.actual_at(NET_EFFECTIVE_INCOME, month);
        let gross = view.actual_at(GROSS_SCHEDULED_RENT, month);
        let vacancy = view.actual_at(VACANCY, month);
        let delinquency = view.actual_at(DELINQUENCY, month);
        let expense = view.actual_at(TOTAL_EXPENSE, month);
        let loss_to_lease = view.actual_at(LOSS_TO_LEASE, month);
        let noi = view.actual_at(NOI, month);

        KeyRatios {
            collection_rate_pct: ratio(income, asking),
            vacancy_rate_pct: ratio(vacancy.map(|v| self.loss(v)), asking),
            delinquency_rate_pct: ratio(delinquency.map(|v| self.loss(v)), income.map(f64::abs)),
            expense_ratio_pct: ratio(expense.map(|v| self.loss(v)), income),
            loss_to_lease_rate_pct: ratio(loss_to_lease.map(|v| self.loss(v)), asking),
            economic_occupancy_pct: ratio(income, gross),
            noi_margin_pct: ratio(noi, income),
        }
    }

    fn budget_variances(&self, view: &MetricView, month: NaiveDate) -> BudgetVariances {
        let mut variances = BudgetVariances::default();
        for name in &self.settings.budget_metrics {
            if let Some(v) = view.at(name, month).and_then(variance) {
                variances.monthly.insert(metric_key(name), v);
            }
            if let Some(v) = view.ytd(name).and_then(variance) {
                variances.ytd.insert(metric_key(name), v);
            }
        }
        variances
    }

    /// Current month against the mean of the trailing valid prior months.
    ///
    /// Priors are non-null and non-zero; a metric with none is left out.
    fn rolling_variances(&self, view: &MetricView, current: NaiveDate) -> BTreeMap<String, RollingVariance> {
        let window = self.settings.rolling_window.max(1);
        let mut variances = BTreeMap::new();

        for name in &self.settings.rolling_metrics {
            let rows = view.exact_series(name);
            let Some(now) = rows
                .iter()
                .find(|r| r.month() == Some(current))
                .and_then(|r| r.actual())
            else {
                continue;
            };

            let valid: Vec<f64> = rows
                .iter()
                .filter(|r| r.month().is_some_and(|m| m < current))
                .filter_map(|r| r.actual())
                .filter(|v| *v != 0.0)
                .collect();
            let priors = &valid[valid.len().saturating_sub(window)..];
            let Some(average) = mean(priors) else {
                debug!("{}: no valid prior months for rolling average", name);
                continue;
            };

            variances.insert(
                metric_key(name),
                RollingVariance {
                    current: round2(now),
                    prior_avg: round2(average),
                    prior_months: priors.len(),
                    variance_abs: round2(now - average),
                    variance_pct: round2(pct_change_or_zero(now, average)),
                },
            );
        }
        variances
    }

    fn data_highlights(
        &self,
        view: &MetricView,
        current: NaiveDate,
        prior: Option<NaiveDate>,
        ratios: &KeyRatios,
        budget: &BudgetVariances,
    ) -> DataHighlights {
        let noi_key = metric_key(NOI);

        let mut moves: Vec<MomMove> = match prior {
            Some(prior) => self
                .settings
                .mom_metrics
                .iter()
                .filter_map(|name| {
                    let now = view.actual_at(name, current)?;
                    let before = view.actual_at(name, prior).filter(|v| *v != 0.0)?;
                    Some(MomMove {
                        metric: name.clone(),
                        current: round2(now),
                        prior: round2(before),
                        change_abs: round2(now - before),
                        change_pct: round_opt(pct_of(now - before, before)),
                    })
                })
                .collect(),
            None => Vec::new(),
        };
        let magnitude = |m: &MomMove| m.change_pct.map(f64::abs).unwrap_or(0.0);
        moves.sort_by(|a, b| magnitude(b).total_cmp(&magnitude(a)));
        moves.truncate(TOP_MOM_MOVES);

        let zero_value_metrics = self
            .settings
            .key_metrics
            .iter()
            .filter(|name| view.actual_at(name, current) == Some(0.0))
            .cloned()
            .collect();

        let months_with_data = view
            .monthly
            .iter()
            .filter(|r| has_actual(r))
            .filter_map(|r| r.month())
            .unique()
            .count();

        DataHighlights {
            vacancy_rate_pct: ratios.vacancy_rate_pct,
            delinquency_rate_pct: ratios.delinquency_rate_pct,
            expense_ratio_pct: ratios.expense_ratio_pct,
            monthly_noi_variance_pct: budget.monthly.get(&noi_key).and_then(|v| v.variance_pct),
            ytd_noi_variance_pct: budget.ytd.get(&noi_key).and_then(|v| v.variance_pct),
            largest_mom_changes: moves,
            zero_value_metrics,
            months_with_data,
        }
    }

    fn monthly_time_series(&self, view: &MetricView) -> BTreeMap<String, Vec<SeriesPoint>> {
        self.settings
            .series_metrics
            .iter()
            .filter_map(|name| {
                let points: Vec<SeriesPoint> = view
                    .series(name)
                    .into_iter()
                    .filter_map(|r| {
                        let month = r.month()?;
                        Some(SeriesPoint {
                            month: month.format("%Y-%m").to_string(),
                            month_name: month_label(month),
                            value: round_opt(r.actual()),
                        })
                    })
                    .collect();
                (!points.is_empty()).then(|| (metric_key(name), points))
            })
            .collect()
    }
}

fn all_metrics_at(view: &MetricView, month: NaiveDate) -> BTreeMap<String, ActualBudget> {
    view.monthly
        .iter()
        .filter(|r| r.month() == Some(month))
        .filter(|r| r.actual().is_some() || r.budget().is_some())
        .map(|r| {
            (
                r.metric().to_string(),
                ActualBudget {
                    actual: round_opt(r.actual()),
                    budget: round_opt(r.budget()),
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::importers::QualityLog;
    use crate::models::MetricObservation;
    use crate::reports::stats::TrendDirection;

    fn m(month: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, month, 1).unwrap()
    }

    fn obs(metric: &str, month: u32, actual: Option<f64>, budget: Option<f64>) -> MetricObservation {
        MetricObservation::monthly("Maple", "Maple CRES", metric, m(month), actual, budget)
    }

    fn table(observations: Vec<MetricObservation>) -> CanonicalTimeSeries {
        let mut issues = QualityLog::new();
        CanonicalTimeSeries::assemble(observations, &mut issues)
    }

    fn sample() -> CanonicalTimeSeries {
        let mut rows = vec![
            obs(TOTAL_EXPENSE, 4, Some(100.0), None),
            obs(TOTAL_EXPENSE, 5, Some(100.0), None),
            obs(TOTAL_EXPENSE, 6, Some(100.0), None),
            obs(TOTAL_EXPENSE, 7, Some(500.0), Some(400.0)),
            obs(NOI, 6, Some(0.0), Some(50.0)),
            obs(NOI, 7, Some(100.0), Some(80.0)),
            obs(NET_EFFECTIVE_INCOME, 6, Some(850.0), None),
            obs(NET_EFFECTIVE_INCOME, 7, Some(900.0), Some(1000.0)),
            obs(ASKING_RENT, 7, Some(1000.0), Some(0.0)),
            obs(VACANCY, 7, Some(-50.0), None),
            obs(DELINQUENCY, 7, Some(-18.0), None),
            obs("Concessions", 7, Some(0.0), None),
        ];
        rows.push(MetricObservation::ytd(
            "Maple",
            "Maple CRES",
            NET_EFFECTIVE_INCOME,
            Some(3500.0),
            Some(4000.0),
        ));
        rows.push(MetricObservation::ytd("Maple", "Maple CRES", TOTAL_EXPENSE, Some(800.0), Some(0.0)));
        table(rows)
    }

    fn analyze(table: &CanonicalTimeSeries, settings: &AnalysisSettings) -> PropertyAnalysisResult {
        PropertyAnalyzer::new(table, settings).analyze("Maple", None).unwrap()
    }

    #[test]
    fn test_detects_latest_core_month_and_prior() {
        let settings = AnalysisSettings::default();
        let result = analyze(&sample(), &settings);
        assert_eq!(result.report_period, "July 2024");
        assert_eq!(result.prior_period, "June 2024");
        assert_eq!(result.diagnostics.detection, Detection::CoreMetrics);
        assert_eq!(result.diagnostics.detected_month, "2024-07-01");
        assert!(result.diagnostics.quality_issues.is_empty());
        assert_eq!(
            result.validation.months_available,
            vec!["2024-04", "2024-05", "2024-06", "2024-07"]
        );
        assert_eq!(result.validation.ytd_rows, 2);
    }

    #[test]
    fn test_mom_change_with_zero_prior_is_zero() {
        let settings = AnalysisSettings::default();
        let result = analyze(&sample(), &settings);
        let noi = &result.mom_changes["ebitda_noi"];
        assert_eq!(noi.current, Some(100.0));
        assert_eq!(noi.prior, Some(0.0));
        assert_eq!(noi.change_abs, Some(100.0));
        assert_eq!(noi.change_pct, Some(0.0));

        let expense = &result.mom_changes["total_expense"];
        assert_eq!(expense.change_pct, Some(400.0));
    }

    #[test]
    fn test_budget_variance_percent() {
        let settings = AnalysisSettings::default();
        let result = analyze(&sample(), &settings);
        let income = &result.budget_variances.monthly["net_eff_gross_income"];
        assert_eq!(income.variance_abs, Some(-100.0));
        assert_eq!(income.variance_pct, Some(-10.0));

        // zero budget is reported with a zero percent
        let rent = &result.budget_variances.monthly["property_asking_rent"];
        assert_eq!(rent.variance_pct, Some(0.0));

        assert_eq!(result.budget_variances.ytd["net_eff_gross_income"].variance_pct, Some(-12.5));
        assert_eq!(result.data_highlights.monthly_noi_variance_pct, Some(25.0));
    }

    #[test]
    fn test_rolling_average_anomaly() {
        let settings = AnalysisSettings::default();
        let result = analyze(&sample(), &settings);
        let expense = &result.rolling_average_variances["total_expense"];
        assert_eq!(expense.prior_avg, Some(100.0));
        assert_eq!(expense.prior_months, 3);
        assert_eq!(expense.variance_pct, Some(400.0));

        // NOI has only a zero prior and asking rent none at all
        assert!(!result.rolling_average_variances.contains_key("ebitda_noi"));
        assert!(!result.rolling_average_variances.contains_key("property_asking_rent"));
    }

    #[test]
    fn test_key_ratios_and_sign_convention() {
        let table = sample();
        let settings = AnalysisSettings::default();
        let ratios = analyze(&table, &settings).key_ratios;
        assert_eq!(ratios.collection_rate_pct, Some(90.0));
        assert_eq!(ratios.vacancy_rate_pct, Some(5.0));
        assert_eq!(ratios.delinquency_rate_pct, Some(2.0));
        assert_eq!(ratios.expense_ratio_pct, Some(55.56));
        assert_eq!(ratios.loss_to_lease_rate_pct, None);
        assert_eq!(ratios.economic_occupancy_pct, None);

        let signed = AnalysisSettings {
            absolute_loss_numerators: false,
            ..AnalysisSettings::default()
        };
        let ratios = analyze(&table, &signed).key_ratios;
        assert_eq!(ratios.vacancy_rate_pct, Some(-5.0));
    }

    #[test]
    fn test_t12_statistics() {
        let settings = AnalysisSettings::default();
        let result = analyze(&sample(), &settings);
        let expense = &result.t12_trends["total_expense"];
        assert_eq!(expense.months_of_data, 4);
        assert_eq!(expense.average, Some(200.0));
        assert_eq!(expense.total, Some(800.0));
        assert_eq!(expense.min_month, "April 2024");
        assert_eq!(expense.max, Some(500.0));
        assert_eq!(expense.max_month, "July 2024");
        assert_eq!(expense.std_dev, Some(173.21));
        assert_eq!(expense.rolling_3mo_avg, Some(233.33));
        assert_eq!(expense.rolling_6mo_avg, None);
        assert_eq!(expense.trend_direction, Some(TrendDirection::Increasing));
        assert_eq!(expense.total_change_pct, Some(400.0));

        // a single month is not a trend
        assert!(!result.t12_trends.contains_key("vacancy"));
    }

    #[test]
    fn test_highlights_and_ytd() {
        let settings = AnalysisSettings::default();
        let result = analyze(&sample(), &settings);
        let highlights = &result.data_highlights;
        assert_eq!(highlights.largest_mom_changes[0].metric, TOTAL_EXPENSE);
        assert!(highlights.largest_mom_changes.iter().all(|m| m.metric != NOI));
        assert_eq!(highlights.zero_value_metrics, vec!["Concessions"]);
        assert_eq!(highlights.months_with_data, 4);

        assert_eq!(result.ytd_aggregates.expense_ratio_pct, Some(22.86));
        let ytd_expense = &result.ytd_aggregates.metrics["total_expense"];
        assert_eq!(ytd_expense.variance_pct, None);
        assert_eq!(ytd_expense.variance_abs, Some(800.0));
    }

    #[test]
    fn test_requested_period() {
        let table = sample();
        let settings = AnalysisSettings::default();
        let analyzer = PropertyAnalyzer::new(&table, &settings);

        let june = analyzer
            .analyze("Maple", NaiveDate::from_ymd_opt(2024, 6, 15))
            .unwrap();
        assert_eq!(june.report_period, "June 2024");
        assert_eq!(june.prior_period, "May 2024");
        assert_eq!(june.diagnostics.detection, Detection::Requested);

        match analyzer.analyze("Maple", NaiveDate::from_ymd_opt(2023, 1, 1)) {
            Err(AnalysisError::PeriodNotAvailable { period, available, .. }) => {
                assert_eq!(period, "2023-01");
                assert_eq!(available.len(), 4);
            }
            other => panic!("unexpected: {:?}", other.map(|r| r.report_period)),
        }
    }

    #[test]
    fn test_weak_detection_fallbacks() {
        let settings = AnalysisSettings::default();

        let other_only = table(vec![
            obs(VACANCY, 5, Some(-10.0), None),
            obs(VACANCY, 6, Some(0.0), None),
            obs(NOI, 6, Some(0.0), None),
        ]);
        let result = analyze(&other_only, &settings);
        assert_eq!(result.diagnostics.detection, Detection::AnyMetric);
        assert_eq!(result.report_period, "May 2024");

        let all_zero = table(vec![obs(VACANCY, 5, Some(0.0), None), obs(VACANCY, 6, None, None)]);
        let result = analyze(&all_zero, &settings);
        assert_eq!(result.diagnostics.detection, Detection::CalendarMaximum);
        assert_eq!(result.report_period, "June 2024");
        assert_eq!(
            result.diagnostics.quality_issues[0].kind,
            IssueKind::WeakPeriodDetection
        );
    }

    #[test]
    fn test_undefined_values_serialize_as_null() {
        let settings = AnalysisSettings::default();
        let result = analyze(&sample(), &settings);
        let json = serde_json::to_value(&result).unwrap();
        assert!(json["key_ratios"]["economic_occupancy_pct"].is_null());
        assert!(json["current_period_metrics"]["property_asking_rent"]["variance_pct"].is_null());
        assert_eq!(json["prior_period"], "June 2024");

        let text = serde_json::to_string(&result).unwrap();
        assert!(!text.contains("NaN"));
        assert!(!text.contains("Infinity"));
    }

    #[test]
    fn test_minimized_payload() {
        let settings = AnalysisSettings::default();
        let minimal = analyze(&sample(), &settings).minimized();
        assert_eq!(minimal.property_name, "Maple");
        assert!(minimal.trailing_anomalies.contains_key("total_expense"));
        let json = serde_json::to_value(&minimal).unwrap();
        assert_eq!(json.as_object().unwrap().len(), 4);
    }

    #[test]
    fn test_property_without_months_is_an_error() {
        let only_ytd = table(vec![MetricObservation::ytd("Birch", "Birch", NOI, Some(1.0), None)]);
        let settings = AnalysisSettings::default();
        let err = PropertyAnalyzer::new(&only_ytd, &settings)
            .analyze("Birch", None)
            .unwrap_err();
        assert!(matches!(err, AnalysisError::NoMonthlyData(_)));
    }
}
