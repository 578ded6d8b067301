use chrono::NaiveDate;
use serde::Serialize;

/// Label used for the cumulative column in the `Period` field
pub const YTD_LABEL: &str = "YTD";

/// One fact extracted from a workbook: a metric's actual and budget for a
/// period of one property.
///
/// `period_parsed` is `None` exactly when `is_ytd` is set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricObservation {
    pub property: String,
    pub sheet: String,
    pub metric_name: String,
    pub period: String,
    pub period_parsed: Option<NaiveDate>,
    pub is_ytd: bool,
    pub actual_value: Option<f64>,
    pub budget_value: Option<f64>,
}

impl MetricObservation {
    pub fn monthly(
        property: impl Into<String>,
        sheet: impl Into<String>,
        metric_name: impl Into<String>,
        month: NaiveDate,
        actual_value: Option<f64>,
        budget_value: Option<f64>,
    ) -> Self {
        Self {
            property: property.into(),
            sheet: sheet.into(),
            metric_name: metric_name.into(),
            period: month.format("%b %Y").to_string(),
            period_parsed: Some(month),
            is_ytd: false,
            actual_value,
            budget_value,
        }
    }

    pub fn ytd(
        property: impl Into<String>,
        sheet: impl Into<String>,
        metric_name: impl Into<String>,
        actual_value: Option<f64>,
        budget_value: Option<f64>,
    ) -> Self {
        Self {
            property: property.into(),
            sheet: sheet.into(),
            metric_name: metric_name.into(),
            period: YTD_LABEL.to_string(),
            period_parsed: None,
            is_ytd: true,
            actual_value,
            budget_value,
        }
    }

    /// Uniqueness key within a canonical table
    pub fn key(&self) -> (&str, &str, &str, bool) {
        (
            self.property.as_str(),
            self.metric_name.as_str(),
            self.period.as_str(),
            self.is_ytd,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monthly_and_ytd_constructors() {
        let jul = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
        let m = MetricObservation::monthly("Maple", "Maple", "Vacancy", jul, Some(-10.0), None);
        assert_eq!(m.period, "Jul 2024");
        assert_eq!(m.period_parsed, Some(jul));
        assert!(!m.is_ytd);

        let y = MetricObservation::ytd("Maple", "Maple", "Vacancy", Some(-50.0), Some(-40.0));
        assert_eq!(y.period, "YTD");
        assert_eq!(y.period_parsed, None);
        assert!(y.is_ytd);
        assert_ne!(m.key(), y.key());
    }
}
