//! Serializable analysis payload
//!
//! Every number here has already been through `round2`, so a value that could
//! not be computed is `None` and serializes as `null`.

use serde::Serialize;
use std::collections::BTreeMap;

use super::stats::TrendDirection;
use crate::config::Benchmarks;
use crate::importers::QualityIssue;

/// Actual and budget of one metric at one period, with the variance when both exist
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PeriodValues {
    pub actual: Option<f64>,
    pub budget: Option<f64>,
    pub variance_abs: Option<f64>,
    /// `None` when the budget is zero
    pub variance_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MomChange {
    pub current: Option<f64>,
    pub prior: Option<f64>,
    pub change_abs: Option<f64>,
    /// 0 when the prior value is zero
    pub change_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct T12Stats {
    pub months_of_data: usize,
    pub average: Option<f64>,
    pub total: Option<f64>,
    pub min: Option<f64>,
    pub min_month: String,
    pub max: Option<f64>,
    pub max_month: String,
    pub std_dev: Option<f64>,
    pub rolling_3mo_avg: Option<f64>,
    pub rolling_6mo_avg: Option<f64>,
    pub trend_direction: Option<TrendDirection>,
    pub trend_magnitude_pct: Option<f64>,
    pub period_start_value: Option<f64>,
    pub period_end_value: Option<f64>,
    pub total_change_pct: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct YtdAggregates {
    pub metrics: BTreeMap<String, PeriodValues>,
    pub expense_ratio_pct: Option<f64>,
}

/// Ratios at the report period, each in percent
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KeyRatios {
    pub collection_rate_pct: Option<f64>,
    pub vacancy_rate_pct: Option<f64>,
    pub delinquency_rate_pct: Option<f64>,
    pub expense_ratio_pct: Option<f64>,
    pub loss_to_lease_rate_pct: Option<f64>,
    pub economic_occupancy_pct: Option<f64>,
    pub noi_margin_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Variance {
    pub actual: Option<f64>,
    pub budget: Option<f64>,
    pub variance_abs: Option<f64>,
    /// 0 when the budget is zero
    pub variance_pct: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BudgetVariances {
    pub monthly: BTreeMap<String, Variance>,
    pub ytd: BTreeMap<String, Variance>,
}

/// Current month against the mean of its trailing valid prior months
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RollingVariance {
    pub current: Option<f64>,
    pub prior_avg: Option<f64>,
    pub prior_months: usize,
    pub variance_abs: Option<f64>,
    pub variance_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MomMove {
    pub metric: String,
    pub current: Option<f64>,
    pub prior: Option<f64>,
    pub change_abs: Option<f64>,
    pub change_pct: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DataHighlights {
    pub vacancy_rate_pct: Option<f64>,
    pub delinquency_rate_pct: Option<f64>,
    pub expense_ratio_pct: Option<f64>,
    pub monthly_noi_variance_pct: Option<f64>,
    pub ytd_noi_variance_pct: Option<f64>,
    pub largest_mom_changes: Vec<MomMove>,
    pub zero_value_metrics: Vec<String>,
    pub months_with_data: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActualBudget {
    pub actual: Option<f64>,
    pub budget: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    /// `YYYY-MM`
    pub month: String,
    pub month_name: String,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationInfo {
    pub property_selected: String,
    pub monthly_rows: usize,
    pub ytd_rows: usize,
    pub months_available: Vec<String>,
    pub metrics_count: usize,
}

/// How the report period was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Detection {
    CoreMetrics,
    AnyMetric,
    CalendarMaximum,
    Requested,
}

impl Detection {
    /// Calendar maximum means no month carried a non-zero actual
    pub fn is_weak(&self) -> bool {
        matches!(self, Detection::CalendarMaximum)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostics {
    /// `YYYY-MM-DD`
    pub detected_month: String,
    pub detection: Detection,
    pub reason: String,
    pub quality_issues: Vec<QualityIssue>,
}

/// Everything computed for one property, ready to serialize
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyAnalysisResult {
    pub property_name: String,
    /// e.g. "July 2024"
    pub report_period: String,
    /// "N/A" when there is no earlier month
    pub prior_period: String,
    pub industry_benchmarks: Benchmarks,
    pub validation: ValidationInfo,
    pub current_period_metrics: BTreeMap<String, PeriodValues>,
    pub prior_period_metrics: BTreeMap<String, PeriodValues>,
    pub mom_changes: BTreeMap<String, MomChange>,
    pub t12_trends: BTreeMap<String, T12Stats>,
    pub ytd_aggregates: YtdAggregates,
    pub key_ratios: KeyRatios,
    pub budget_variances: BudgetVariances,
    pub rolling_average_variances: BTreeMap<String, RollingVariance>,
    pub data_highlights: DataHighlights,
    pub all_metrics_current: BTreeMap<String, ActualBudget>,
    pub monthly_time_series: BTreeMap<String, Vec<SeriesPoint>>,
    pub diagnostics: Diagnostics,
}

/// The subset handed to a narrative layer that only needs the exceptions
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MinimalAnalysis {
    pub property_name: String,
    pub report_period: String,
    pub budget_variances: BudgetVariances,
    pub trailing_anomalies: BTreeMap<String, RollingVariance>,
}

impl PropertyAnalysisResult {
    pub fn minimized(&self) -> MinimalAnalysis {
        MinimalAnalysis {
            property_name: self.property_name.clone(),
            report_period: self.report_period.clone(),
            budget_variances: self.budget_variances.clone(),
            trailing_anomalies: self.rolling_average_variances.clone(),
        }
    }
}
