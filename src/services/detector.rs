//! Anomaly detection over a single metric series.
//!
//! Three strategies are available: z-score and IQR judge a point against the
//! series' own distribution, while the threshold strategy compares it with
//! fixed domain limits. Points flagged by several strategies are reported once,
//! with the worst severity any strategy assigned.

use crate::models::config::{AnalysisConfig, MetricThresholds};
use crate::models::metrics::{AnomalyEvent, DetectionMethod, ExpectedRange, Severity};
use crate::services::stats;
use chrono::NaiveDateTime;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Distance beyond the expected range, in units of spread (standard
/// deviations or IQRs), at which severity steps up.
const MODERATE_BREAKPOINT: f64 = 1.0;
const SEVERE_BREAKPOINT: f64 = 2.0;

/// One point flagged by one strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct Flag {
    pub index: usize,
    pub severity: Severity,
    pub expected_range: ExpectedRange,
    pub method: DetectionMethod,
    pub description: String,
}

/// Result of running the configured strategies over a series.
#[derive(Debug, Clone, Default)]
pub struct Detection {
    pub events: Vec<AnomalyEvent>,
    /// Indices into the analysed points, in ascending order.
    pub flagged: BTreeSet<usize>,
    pub methods_applied: Vec<DetectionMethod>,
    /// Set when the series was too short for the statistical strategies.
    pub low_confidence: bool,
    pub sample_count: usize,
}

impl Detection {
    pub fn worst_severity(&self) -> Option<Severity> {
        self.events.iter().map(|e| e.severity).max()
    }

    pub fn count_at(&self, severity: Severity) -> usize {
        self.events.iter().filter(|e| e.severity == severity).count()
    }

    pub fn anomaly_ratio(&self) -> f64 {
        if self.sample_count == 0 {
            0.0
        } else {
            self.flagged.len() as f64 / self.sample_count as f64
        }
    }
}

fn severity_for_excess(excess: f64) -> Severity {
    if excess >= SEVERE_BREAKPOINT {
        Severity::Severe
    } else if excess >= MODERATE_BREAKPOINT {
        Severity::Moderate
    } else {
        Severity::Minor
    }
}

/// Flags points whose distance from the mean exceeds `threshold` standard
/// deviations. A series without variance flags nothing.
pub fn z_score(values: &[f64], threshold: f64) -> Vec<Flag> {
    let (Some(mean), Some(std)) = (stats::mean(values), stats::std_dev(values)) else {
        return Vec::new();
    };
    if std <= f64::EPSILON {
        return Vec::new();
    }

    let expected_range = ExpectedRange {
        lower: mean - threshold * std,
        upper: mean + threshold * std,
    };

    values
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .filter_map(|(index, &value)| {
            let z = (value - mean) / std;
            if z.abs() <= threshold {
                return None;
            }
            Some(Flag {
                index,
                severity: severity_for_excess(z.abs() - threshold),
                expected_range,
                method: DetectionMethod::ZScore,
                description: format!(
                    "Value {:.1} is {:.1} standard deviations from the mean of {:.1}",
                    value,
                    z.abs(),
                    mean
                ),
            })
        })
        .collect()
}

/// Flags points outside `[Q1 - k*IQR, Q3 + k*IQR]`. With a zero IQR the fence
/// collapses to `[Q1, Q3]` and severity is measured in standard deviations
/// instead, so quantised readings one step off the mode stay minor.
pub fn iqr(values: &[f64], multiplier: f64) -> Vec<Flag> {
    let Some(summary) = stats::describe(values) else {
        return Vec::new();
    };
    let spread = if summary.iqr > f64::EPSILON {
        summary.iqr
    } else {
        summary.std.max(f64::EPSILON)
    };

    let expected_range = ExpectedRange {
        lower: summary.q25 - multiplier * summary.iqr,
        upper: summary.q75 + multiplier * summary.iqr,
    };

    values
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .filter_map(|(index, &value)| {
            if expected_range.contains(value) {
                return None;
            }
            let distance = if value < expected_range.lower {
                expected_range.lower - value
            } else {
                value - expected_range.upper
            };
            Some(Flag {
                index,
                severity: severity_for_excess(distance / spread),
                expected_range,
                method: DetectionMethod::Iqr,
                description: format!(
                    "Value {:.1} is outside the interquartile fence [{:.1}, {:.1}]",
                    value, expected_range.lower, expected_range.upper
                ),
            })
        })
        .collect()
}

/// Flags points above the warning limit; points at or above the critical
/// limit are severe, the rest moderate.
pub fn threshold(values: &[f64], limits: &MetricThresholds) -> Vec<Flag> {
    let expected_range = ExpectedRange {
        lower: 0.0_f64.min(limits.warning),
        upper: limits.warning,
    };

    values
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite() && **v > limits.warning)
        .map(|(index, &value)| {
            let (severity, limit_name, limit) = if value >= limits.critical {
                (Severity::Severe, "critical", limits.critical)
            } else {
                (Severity::Moderate, "warning", limits.warning)
            };
            Flag {
                index,
                severity,
                expected_range,
                method: DetectionMethod::Threshold,
                description: format!(
                    "Value {:.1} crossed the {} limit of {:.1}",
                    value, limit_name, limit
                ),
            }
        })
        .collect()
}

pub struct AnomalyDetector<'a> {
    config: &'a AnalysisConfig,
    limits: Option<&'a MetricThresholds>,
}

impl<'a> AnomalyDetector<'a> {
    pub fn new(config: &'a AnalysisConfig, limits: Option<&'a MetricThresholds>) -> Self {
        Self { config, limits }
    }

    /// Strategies that will run for a series of `len` points.
    pub fn plan(&self, len: usize) -> (Vec<DetectionMethod>, bool) {
        let low_confidence = len < self.config.min_samples;
        let methods = [
            DetectionMethod::ZScore,
            DetectionMethod::Iqr,
            DetectionMethod::Threshold,
        ]
        .into_iter()
        .filter(|method| self.config.uses(*method))
        .filter(|method| match method {
            DetectionMethod::ZScore | DetectionMethod::Iqr => !low_confidence,
            DetectionMethod::Threshold => self.limits.is_some(),
        })
        .collect();
        (methods, low_confidence)
    }

    fn run(&self, method: DetectionMethod, values: &[f64]) -> Vec<Flag> {
        match method {
            DetectionMethod::ZScore => z_score(values, self.config.z_score_threshold),
            DetectionMethod::Iqr => iqr(values, self.config.iqr_multiplier),
            DetectionMethod::Threshold => match self.limits {
                Some(limits) => threshold(values, limits),
                None => Vec::new(),
            },
        }
    }

    /// Runs every applicable strategy over `points`, which must hold finite
    /// values in time order.
    pub fn detect(&self, points: &[(NaiveDateTime, f64)]) -> Detection {
        if points.is_empty() {
            return Detection::default();
        }

        let values: Vec<f64> = points.iter().map(|(_, v)| *v).collect();
        let (methods, low_confidence) = self.plan(values.len());

        let mut worst: BTreeMap<usize, Flag> = BTreeMap::new();
        for method in &methods {
            for flag in self.run(*method, &values) {
                match worst.get(&flag.index) {
                    Some(existing) if existing.severity >= flag.severity => {}
                    _ => {
                        worst.insert(flag.index, flag);
                    }
                }
            }
        }

        let events = worst
            .values()
            .map(|flag| {
                let (timestamp, value) = points[flag.index];
                AnomalyEvent {
                    timestamp,
                    value,
                    severity: flag.severity,
                    description: flag.description.clone(),
                    expected_range: flag.expected_range,
                    method: flag.method,
                }
            })
            .collect();

        debug!(
            samples = values.len(),
            flagged = worst.len(),
            low_confidence,
            "anomaly detection finished"
        );

        Detection {
            events,
            flagged: worst.keys().copied().collect(),
            methods_applied: methods,
            low_confidence,
            sample_count: values.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn points(values: &[f64]) -> Vec<(NaiveDateTime, f64)> {
        let base = NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, v)| (base + Duration::minutes(i as i64 * 5), *v))
            .collect()
    }

    /// Thirty readings jittering around 65 with one spike to 200.
    fn spiky_temperatures() -> Vec<f64> {
        let mut values: Vec<f64> = (0..30).map(|i| 64.0 + (i % 5) as f64 * 0.5).collect();
        values.push(200.0);
        values
    }

    fn cpu_limits() -> MetricThresholds {
        MetricThresholds::new(80.0, 90.0, 70.0)
    }

    #[test]
    fn test_constant_series_flags_nothing() {
        let values = vec![65.0; 40];
        assert!(z_score(&values, 3.0).is_empty());
        assert!(iqr(&values, 1.5).is_empty());

        let config = AnalysisConfig::default();
        let detection = AnomalyDetector::new(&config, None).detect(&points(&values));
        assert!(detection.events.is_empty());
        assert!(!detection.low_confidence);
    }

    #[test]
    fn test_outlier_flagged_by_z_score_and_iqr() {
        let values = spiky_temperatures();

        let z = z_score(&values, 3.0);
        assert_eq!(z.len(), 1);
        assert_eq!(z[0].index, 30);

        let fence = iqr(&values, 1.5);
        assert_eq!(fence.len(), 1);
        assert_eq!(fence[0].index, 30);
        assert_eq!(fence[0].severity, Severity::Severe);
    }

    #[test]
    fn test_iqr_zero_spread_still_flags_spike() {
        let mut values = vec![65.0; 30];
        values.push(200.0);

        let fence = iqr(&values, 1.5);
        assert_eq!(fence.len(), 1);
        assert_eq!(fence[0].index, 30);
        assert_eq!(fence[0].severity, Severity::Severe);
        assert_eq!(fence[0].expected_range.lower, 65.0);
        assert_eq!(fence[0].expected_range.upper, 65.0);
    }

    #[test]
    fn test_iqr_quantised_readings() {
        let mut values = vec![65.0; 20];
        values.extend([64.0; 5]);
        values.extend([66.0; 5]);
        values.push(150.0);

        let fence = iqr(&values, 1.5);
        let spike = fence.iter().find(|f| f.index == 30).unwrap();
        assert_eq!(spike.severity, Severity::Severe);
        assert!(fence
            .iter()
            .filter(|f| f.index != 30)
            .all(|f| f.severity == Severity::Minor));
    }

    #[test]
    fn test_iqr_catches_extreme_outliers() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 100.0, 200.0];
        let flagged: Vec<usize> = iqr(&values, 1.5).iter().map(|f| f.index).collect();
        assert_eq!(flagged, vec![9, 10]);
    }

    #[test]
    fn test_threshold_severity() {
        let values = vec![60.0, 70.0, 80.0, 85.0, 90.0, 100.0];
        let flags = threshold(&values, &cpu_limits());
        let summary: Vec<(usize, Severity)> = flags.iter().map(|f| (f.index, f.severity)).collect();
        assert_eq!(
            summary,
            vec![
                (3, Severity::Moderate),
                (4, Severity::Severe),
                (5, Severity::Severe)
            ]
        );
        assert!(flags.iter().all(|f| f.expected_range.upper == 80.0));
    }

    #[test]
    fn test_z_score_severity_breakpoints() {
        assert_eq!(severity_for_excess(0.2), Severity::Minor);
        assert_eq!(severity_for_excess(1.0), Severity::Moderate);
        assert_eq!(severity_for_excess(1.9), Severity::Moderate);
        assert_eq!(severity_for_excess(2.0), Severity::Severe);
    }

    #[test]
    fn test_short_series_falls_back_to_threshold_only() {
        let config = AnalysisConfig::default();
        let limits = cpu_limits();
        let detector = AnomalyDetector::new(&config, Some(&limits));

        let detection = detector.detect(&points(&[60.0, 61.0, 95.0, 62.0]));
        assert!(detection.low_confidence);
        assert_eq!(detection.methods_applied, vec![DetectionMethod::Threshold]);
        assert_eq!(detection.events.len(), 1);
        assert_eq!(detection.events[0].value, 95.0);
        assert_eq!(detection.events[0].method, DetectionMethod::Threshold);
    }

    #[test]
    fn test_short_series_without_limits_runs_nothing() {
        let config = AnalysisConfig::default();
        let detection = AnomalyDetector::new(&config, None).detect(&points(&[1.0, 500.0]));
        assert!(detection.low_confidence);
        assert!(detection.methods_applied.is_empty());
        assert!(detection.events.is_empty());
    }

    #[test]
    fn test_unknown_limits_use_statistics_only() {
        let config = AnalysisConfig::default();
        let detection = AnomalyDetector::new(&config, None).detect(&points(&spiky_temperatures()));
        assert_eq!(
            detection.methods_applied,
            vec![DetectionMethod::ZScore, DetectionMethod::Iqr]
        );
        assert_eq!(detection.flagged.iter().copied().collect::<Vec<_>>(), vec![30]);
    }

    #[test]
    fn test_merged_event_keeps_worst_severity() {
        let config = AnalysisConfig::default();
        let limits = cpu_limits();
        let detection =
            AnomalyDetector::new(&config, Some(&limits)).detect(&points(&spiky_temperatures()));

        assert_eq!(detection.events.len(), 1);
        let event = &detection.events[0];
        assert_eq!(event.value, 200.0);
        assert_eq!(event.severity, Severity::Severe);
        assert_eq!(detection.worst_severity(), Some(Severity::Severe));
        assert_eq!(detection.count_at(Severity::Severe), 1);
    }

    #[test]
    fn test_empty_input() {
        let config = AnalysisConfig::default();
        let detection = AnomalyDetector::new(&config, None).detect(&[]);
        assert!(detection.events.is_empty());
        assert_eq!(detection.sample_count, 0);
        assert_eq!(detection.anomaly_ratio(), 0.0);
    }
}
