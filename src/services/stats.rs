//! Descriptive statistics over plain `f64` slices.
//!
//! Every helper ignores non-finite input so a NaN cell in a log file can never
//! leak into a mean or percentile.

use crate::models::metrics::BaselineStats;

pub fn finite(values: &[f64]) -> Vec<f64> {
    values.iter().copied().filter(|v| v.is_finite()).collect()
}

pub fn mean(values: &[f64]) -> Option<f64> {
    let vals = finite(values);
    if vals.is_empty() {
        return None;
    }
    Some(vals.iter().sum::<f64>() / vals.len() as f64)
}

/// Population standard deviation (divides by n).
pub fn std_dev(values: &[f64]) -> Option<f64> {
    let vals = finite(values);
    let mean = mean(&vals)?;
    let variance = vals.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / vals.len() as f64;
    Some(variance.sqrt())
}

fn sorted_finite(values: &[f64]) -> Vec<f64> {
    let mut vals = finite(values);
    vals.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    vals
}

/// Linear interpolation between closest ranks; `pct` is in `[0, 100]`.
/// `values` must already be sorted.
pub fn percentile_sorted(values: &[f64], pct: f64) -> Option<f64> {
    if values.is_empty() || !pct.is_finite() {
        return None;
    }
    if values.len() == 1 {
        return Some(values[0]);
    }
    let p = (pct / 100.0).clamp(0.0, 1.0);
    let pos = p * ((values.len() - 1) as f64);
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let lo_v = values.get(lo).copied()?;
    let hi_v = values.get(hi).copied()?;
    Some(lo_v + (hi_v - lo_v) * (pos - lo as f64))
}

pub fn percentile(values: &[f64], pct: f64) -> Option<f64> {
    percentile_sorted(&sorted_finite(values), pct)
}

pub fn median(values: &[f64]) -> Option<f64> {
    percentile(values, 50.0)
}

/// Least-squares slope of `values` against their index.
pub fn linear_slope(values: &[f64]) -> Option<f64> {
    let vals = finite(values);
    let n = vals.len();
    if n < 2 {
        return None;
    }
    let x_mean = (n - 1) as f64 / 2.0;
    let y_mean = vals.iter().sum::<f64>() / n as f64;

    let mut num = 0.0;
    let mut den = 0.0;
    for (i, y) in vals.iter().enumerate() {
        let dx = i as f64 - x_mean;
        num += dx * (y - y_mean);
        den += dx * dx;
    }
    if den == 0.0 {
        return None;
    }
    Some(num / den)
}

/// Full descriptive summary, or `None` when nothing finite remains.
pub fn describe(values: &[f64]) -> Option<BaselineStats> {
    let sorted = sorted_finite(values);
    if sorted.is_empty() {
        return None;
    }

    let count = sorted.len();
    let mean = sorted.iter().sum::<f64>() / count as f64;
    let variance = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count as f64;
    let q25 = percentile_sorted(&sorted, 25.0)?;
    let q75 = percentile_sorted(&sorted, 75.0)?;

    Some(BaselineStats {
        count,
        mean,
        median: percentile_sorted(&sorted, 50.0)?,
        std: variance.sqrt(),
        min: sorted[0],
        max: sorted[count - 1],
        q25,
        q75,
        iqr: q75 - q25,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_describe_one_to_ten() {
        let values: Vec<f64> = (1..=10).map(|v| v as f64).collect();
        let stats = describe(&values).unwrap();

        assert_eq!(stats.count, 10);
        assert!(approx(stats.mean, 5.5));
        assert!(approx(stats.median, 5.5));
        assert!(approx(stats.min, 1.0));
        assert!(approx(stats.max, 10.0));
        assert!(approx(stats.q25, 3.25));
        assert!(approx(stats.q75, 7.75));
        assert!(approx(stats.iqr, 4.5));
        assert!(approx(stats.std, 8.25f64.sqrt()));
    }

    #[test]
    fn test_describe_skips_non_finite() {
        let stats = describe(&[1.0, f64::NAN, 3.0, f64::INFINITY]).unwrap();
        assert_eq!(stats.count, 2);
        assert!(approx(stats.mean, 2.0));
        assert!(stats.std.is_finite());
    }

    #[test]
    fn test_describe_empty_or_all_nan() {
        assert!(describe(&[]).is_none());
        assert!(describe(&[f64::NAN, f64::NAN]).is_none());
        assert!(mean(&[]).is_none());
        assert!(std_dev(&[f64::NAN]).is_none());
    }

    #[test]
    fn test_percentile_single_value() {
        assert_eq!(percentile(&[42.0], 75.0), Some(42.0));
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
    }

    #[test]
    fn test_linear_slope() {
        let rising: Vec<f64> = (0..100).map(|i| 60.0 + i as f64 * 0.2).collect();
        assert!(approx(linear_slope(&rising).unwrap(), 0.2));

        let flat = vec![5.0; 20];
        assert!(approx(linear_slope(&flat).unwrap(), 0.0));

        assert!(linear_slope(&[1.0]).is_none());
    }
}
