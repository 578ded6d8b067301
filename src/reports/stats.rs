//! Guarded arithmetic for the analytics payload
//!
//! Every division goes through `safe_div` or `pct_change_or_zero`, so no NaN
//! or infinity can reach the payload. `round2` is the last step before a
//! number is stored and maps anything non-finite to `None`.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

/// `numerator / denominator`, or `None` when the result would not be finite
pub fn safe_div(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator == 0.0 || !numerator.is_finite() || !denominator.is_finite() {
        return None;
    }
    let result = numerator / denominator;
    result.is_finite().then_some(result)
}

/// `value / |base| * 100`, or `None` when `base` is zero
pub fn pct_of(value: f64, base: f64) -> Option<f64> {
    safe_div(value * 100.0, base.abs())
}

/// `(current - base) / |base| * 100`, defined as 0 when `base` is zero
pub fn pct_change_or_zero(current: f64, base: f64) -> f64 {
    pct_of(current - base, base).unwrap_or(0.0)
}

/// Rounds half away from zero to two decimals
pub fn round2(value: f64) -> Option<f64> {
    if !value.is_finite() {
        return None;
    }
    Decimal::from_f64(value)
        .map(|d| d.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|d| d.to_f64())
}

pub fn round_opt(value: Option<f64>) -> Option<f64> {
    value.and_then(round2)
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    safe_div(values.iter().sum(), values.len() as f64)
}

/// Population standard deviation
pub fn std_dev(values: &[f64]) -> Option<f64> {
    let avg = mean(values)?;
    let variance = values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / values.len() as f64;
    variance.is_finite().then(|| variance.sqrt())
}

/// Mean of the last `n` values, when at least `n` exist
pub fn trailing_mean(values: &[f64], n: usize) -> Option<f64> {
    if n == 0 || values.len() < n {
        return None;
    }
    mean(&values[values.len() - n..])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
    Unknown,
}

impl TrendDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendDirection::Increasing => "increasing",
            TrendDirection::Decreasing => "decreasing",
            TrendDirection::Stable => "stable",
            TrendDirection::Unknown => "unknown",
        }
    }
}

/// Compares the mean of the first half of `values` with the second half.
///
/// Needs at least three values. Returns the direction and the percentage
/// change; a zero first-half mean is `Unknown` with a change of 0.
pub fn classify_trend(values: &[f64], threshold_pct: f64) -> Option<(TrendDirection, f64)> {
    if values.len() < 3 {
        return None;
    }
    let mid = values.len() / 2;
    let first = mean(&values[..mid])?;
    let second = mean(&values[mid..])?;

    match pct_of(second - first, first) {
        Some(change) => {
            let direction = if change > threshold_pct {
                TrendDirection::Increasing
            } else if change < -threshold_pct {
                TrendDirection::Decreasing
            } else {
                TrendDirection::Stable
            };
            Some((direction, change))
        }
        None => Some((TrendDirection::Unknown, 0.0)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_div_guards_zero_and_non_finite() {
        assert_eq!(safe_div(10.0, 4.0), Some(2.5));
        assert_eq!(safe_div(10.0, 0.0), None);
        assert_eq!(safe_div(f64::NAN, 1.0), None);
        assert_eq!(safe_div(f64::MAX, 1e-300), None);
    }

    #[test]
    fn test_pct_change_guard() {
        assert_eq!(pct_change_or_zero(100.0, 0.0), 0.0);
        assert_eq!(pct_change_or_zero(90.0, 100.0), -10.0);
        assert_eq!(pct_change_or_zero(500.0, 100.0), 400.0);
        assert_eq!(pct_change_or_zero(-50.0, -100.0), 50.0);
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(1.125), Some(1.13));
        assert_eq!(round2(-2.125), Some(-2.13));
        assert_eq!(round2(3.0), Some(3.0));
        assert_eq!(round2(f64::NAN), None);
        assert_eq!(round2(f64::INFINITY), None);
    }

    #[test]
    fn test_mean_and_std_dev() {
        assert_eq!(mean(&[]), None);
        assert_eq!(mean(&[1.0, 2.0, 3.0]), Some(2.0));
        assert_eq!(std_dev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]), Some(2.0));
        assert_eq!(trailing_mean(&[1.0, 2.0, 3.0, 4.0], 3), Some(3.0));
        assert_eq!(trailing_mean(&[1.0, 2.0], 3), None);
    }

    #[test]
    fn test_classify_trend() {
        let (dir, pct) = classify_trend(&[100.0, 100.0, 120.0, 120.0], 5.0).unwrap();
        assert_eq!(dir, TrendDirection::Increasing);
        assert_eq!(pct, 20.0);

        let (dir, _) = classify_trend(&[100.0, 100.0, 80.0, 80.0], 5.0).unwrap();
        assert_eq!(dir, TrendDirection::Decreasing);

        let (dir, _) = classify_trend(&[100.0, 101.0, 102.0], 5.0).unwrap();
        assert_eq!(dir, TrendDirection::Stable);

        assert_eq!(
            classify_trend(&[0.0, 5.0, 10.0], 5.0),
            Some((TrendDirection::Unknown, 0.0))
        );
        assert_eq!(classify_trend(&[1.0, 2.0], 5.0), None);
    }
}
