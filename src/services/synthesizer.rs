//! Turns detection results into human-readable insights.

use crate::models::config::{AnalysisConfig, MetricThresholds};
use crate::models::metrics::{
    BaselineStats, Insight, InsightLevel, MetricSeries, MetricType, Period, Severity,
};
use crate::services::detector::Detection;
use chrono::Utc;
use std::collections::BTreeMap;
use uuid::Uuid;

pub const RELIABILITY_TITLE: &str = "Data Reliability Warning";

/// Fixed advice per metric and level. Same inputs, same list, always.
pub fn recommendations(metric: MetricType, level: InsightLevel) -> Vec<String> {
    use InsightLevel::*;
    use MetricType::*;

    let items: &[&str] = match (metric, level) {
        (CpuTemp, Critical) => &[
            "Check cooling system",
            "Monitor workload",
            "Shut down intensive applications until temperature recovers",
            "Clean dust from heatsinks and fans",
        ],
        (CpuTemp, Warning) => &[
            "Clean CPU cooler and heatsink",
            "Reapply thermal paste",
            "Check CPU cooler mounting",
            "Improve case airflow to lower temperature",
        ],
        (CpuTemp, Info) => &[
            "Monitor CPU temperature for recurring spikes",
            "Check for background processes causing load spikes",
        ],
        (GpuTemp, Critical) => &[
            "Check cooling system",
            "Monitor workload",
            "Reduce graphics load until temperature recovers",
            "Clean GPU heatsink and fans",
        ],
        (GpuTemp, Warning) => &[
            "Clean GPU heatsink and fans",
            "Check GPU fan speeds",
            "Improve case ventilation to lower temperature",
            "Consider an aftermarket GPU cooler",
        ],
        (GpuTemp, Info) => &[
            "Monitor GPU temperature during gaming or rendering sessions",
            "Check GPU fan curve settings",
        ],
        (CpuTemp | GpuTemp, Success) => &[
            "Maintain current cooling setup",
            "Keep the regular cleaning schedule",
            "Continue monitoring for changes",
        ],
        (CpuUsage | GpuUsage, Critical | Warning) => &[
            "Identify resource-intensive applications",
            "Close unnecessary background processes",
            "Consider a hardware upgrade if usage is consistently high",
        ],
        (MemoryUsage, Critical | Warning) => &[
            "Identify applications with high memory consumption",
            "Close unused browser tabs and background applications",
            "Consider adding more RAM",
        ],
        (CpuUsage | GpuUsage | MemoryUsage, Info) => &[
            "Monitor for patterns in usage",
            "Check for scheduled tasks or applications causing spikes",
        ],
        (CpuUsage | GpuUsage | MemoryUsage, Success) => &[
            "Current workload is well within capacity",
            "Continue monitoring for changes",
        ],
        (FanSpeed, Critical | Warning) => &[
            "Inspect fans for dust build-up or obstruction",
            "Check fan curve configuration",
            "Listen for bearing noise that may indicate a failing fan",
        ],
        (FanSpeed, Info | Success) => &["Continue monitoring fan behaviour"],
        (DiskUsage, Critical | Warning) => &[
            "Free up disk space by removing unused files",
            "Move large files to external storage",
            "Consider a larger drive",
        ],
        (DiskUsage, Info | Success) => &["Continue monitoring disk usage"],
    };

    items.iter().map(|s| s.to_string()).collect()
}

/// Level for a series given its anomalies and the largest reading.
pub fn classify_level(
    detection: &Detection,
    max_value: Option<f64>,
    limits: Option<&MetricThresholds>,
    minor_tolerance: usize,
) -> InsightLevel {
    // Same comparisons as the threshold detector: above warning, at or above critical.
    let (above_warning, at_critical) = match (max_value, limits) {
        (Some(max), Some(l)) => (max > l.warning, max >= l.critical),
        _ => (false, false),
    };
    let worst = detection.worst_severity();

    if worst == Some(Severity::Severe) || at_critical {
        InsightLevel::Critical
    } else if worst == Some(Severity::Moderate) || above_warning {
        InsightLevel::Warning
    } else if detection.events.len() > minor_tolerance {
        InsightLevel::Info
    } else {
        InsightLevel::Success
    }
}

/// Common constructor for every insight the engine emits.
pub fn new_insight(
    title: impl Into<String>,
    description: impl Into<String>,
    level: InsightLevel,
    metric_type: MetricType,
    component: impl Into<String>,
    period: Period,
) -> Insight {
    Insight {
        id: Uuid::new_v4().to_string(),
        title: title.into(),
        description: description.into(),
        level,
        metric_type,
        component: component.into(),
        timestamp: Utc::now().naive_utc(),
        recommendations: Vec::new(),
        data: BTreeMap::new(),
        events: Vec::new(),
        period_start: period.start,
        period_end: period.end,
        anomaly_count: 0,
        baseline_stats: None,
        reliability_warning: None,
    }
}

pub struct Synthesizer<'a> {
    config: &'a AnalysisConfig,
    limits: Option<&'a MetricThresholds>,
}

impl<'a> Synthesizer<'a> {
    pub fn new(config: &'a AnalysisConfig, limits: Option<&'a MetricThresholds>) -> Self {
        Self { config, limits }
    }

    /// Insights for one series already restricted to `period`. Returns nothing
    /// for an empty series.
    pub fn synthesize(
        &self,
        series: &MetricSeries,
        detection: &Detection,
        baseline: Option<&BaselineStats>,
        period: Period,
    ) -> Vec<Insight> {
        if series.is_empty() {
            return Vec::new();
        }

        let max_value = series
            .values
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |m| m.max(v))));

        let level = classify_level(
            detection,
            max_value,
            self.limits,
            self.config.minor_anomaly_tolerance,
        );

        let name = series.metric_type.display_name();
        let unit = &series.unit;
        let count = detection.events.len();

        let title = match level {
            InsightLevel::Critical => format!("Critical {} Anomalies", name),
            InsightLevel::Warning => format!("{} Anomalies Detected", name),
            InsightLevel::Info => format!("Minor {} Fluctuations", name),
            InsightLevel::Success => format!("{} Healthy", name),
        };

        let description = match (level, baseline) {
            (InsightLevel::Success, Some(b)) => format!(
                "{} stayed within its normal range ({:.1} to {:.1}{}, mean {:.1}{}) across {} readings.",
                name, b.min, b.max, unit, b.mean, unit, detection.sample_count
            ),
            (InsightLevel::Success, None) => format!("{} shows no anomalies.", name),
            (_, _) if count == 0 => format!(
                "{} peaked at {:.1}{}, above its configured limits, without any isolated anomaly.",
                name,
                max_value.unwrap_or_default(),
                unit
            ),
            (_, baseline) => {
                let peak = detection
                    .events
                    .iter()
                    .map(|e| e.value)
                    .fold(f64::NEG_INFINITY, f64::max);
                let normal = baseline
                    .map(|b| format!(" against a baseline mean of {:.1}{}", b.mean, unit))
                    .unwrap_or_default();
                format!(
                    "{} anomalous {} reading{} ({} severe, {} moderate, {} minor), peaking at {:.1}{}{}.",
                    count,
                    name.to_lowercase(),
                    if count == 1 { "" } else { "s" },
                    detection.count_at(Severity::Severe),
                    detection.count_at(Severity::Moderate),
                    detection.count_at(Severity::Minor),
                    peak,
                    unit,
                    normal
                )
            }
        };

        let mut primary = new_insight(
            title,
            description,
            level,
            series.metric_type,
            series.component.clone(),
            period,
        );
        primary.recommendations = recommendations(series.metric_type, level);
        primary.events = detection.events.clone();
        primary.anomaly_count = count;
        primary.baseline_stats = baseline.copied();
        if detection.low_confidence {
            primary.reliability_warning = Some(format!(
                "Only {} readings in this period; at least {} are needed for statistical detection, so only fixed limits were checked.",
                detection.sample_count, self.config.min_samples
            ));
        }

        let mut insights = vec![primary];

        if !detection.low_confidence && detection.anomaly_ratio() > self.config.max_anomaly_ratio {
            let mut warning = new_insight(
                RELIABILITY_TITLE,
                format!(
                    "{:.0}% of {} readings were flagged as anomalous. The baseline may not represent normal operation for this period.",
                    detection.anomaly_ratio() * 100.0,
                    name.to_lowercase()
                ),
                InsightLevel::Info,
                series.metric_type,
                series.component.clone(),
                period,
            );
            warning.recommendations = vec![
                "Verify sensor readings in the source logs".to_string(),
                "Widen the analysis period to establish a reliable baseline".to_string(),
            ];
            warning
                .data
                .insert("flagged_ratio".to_string(), detection.anomaly_ratio().into());
            warning.baseline_stats = baseline.copied();
            insights.push(warning);
        }

        insights
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::metrics::{AnomalyEvent, DetectionMethod, ExpectedRange};
    use crate::services::detector::AnomalyDetector;
    use crate::services::{baseline, stats};
    use chrono::{Duration, NaiveDate, NaiveDateTime};

    fn base() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn period() -> Period {
        Period::new(base(), base() + Duration::days(1))
    }

    fn series(metric: MetricType, values: &[f64]) -> MetricSeries {
        MetricSeries::from_points(
            metric,
            "test",
            values
                .iter()
                .enumerate()
                .map(|(i, v)| (base() + Duration::minutes(i as i64 * 5), *v)),
        )
    }

    fn run(metric: MetricType, values: &[f64], limits: Option<MetricThresholds>) -> Vec<Insight> {
        let config = AnalysisConfig::default();
        let series = series(metric, values);
        let points = series.finite_points();
        let detection = AnomalyDetector::new(&config, limits.as_ref()).detect(&points);
        let baseline = baseline::compute(&series.values, &detection.flagged);
        Synthesizer::new(&config, limits.as_ref()).synthesize(
            &series,
            &detection,
            baseline.as_ref(),
            period(),
        )
    }

    fn event(severity: Severity) -> AnomalyEvent {
        AnomalyEvent {
            timestamp: base(),
            value: 1.0,
            severity,
            description: String::new(),
            expected_range: ExpectedRange {
                lower: 0.0,
                upper: 1.0,
            },
            method: DetectionMethod::ZScore,
        }
    }

    fn detection_with(severities: &[Severity]) -> Detection {
        Detection {
            events: severities.iter().map(|s| event(*s)).collect(),
            sample_count: 100,
            ..Detection::default()
        }
    }

    #[test]
    fn test_healthy_series_yields_single_success() {
        let values: Vec<f64> = (0..50).map(|i| 55.0 + (i % 7) as f64).collect();
        let limits = MetricThresholds::new(80.0, 90.0, 70.0);
        let insights = run(MetricType::CpuTemp, &values, Some(limits));

        assert_eq!(insights.len(), 1);
        let insight = &insights[0];
        assert_eq!(insight.level, InsightLevel::Success);
        assert_eq!(insight.anomaly_count, 0);
        assert!(insight.events.is_empty());
        assert!(insight.reliability_warning.is_none());
        assert_eq!(insight.baseline_stats, stats::describe(&values));
    }

    #[test]
    fn test_severe_anomaly_is_critical_with_recommendations() {
        let mut values: Vec<f64> = (0..30).map(|i| 64.0 + (i % 5) as f64 * 0.5).collect();
        values.push(200.0);
        let insights = run(MetricType::CpuTemp, &values, None);

        let primary = &insights[0];
        assert_eq!(primary.level, InsightLevel::Critical);
        assert!(!primary.recommendations.is_empty());
        assert_eq!(primary.anomaly_count, 1);
        assert_eq!(primary.events[0].value, 200.0);
        let baseline = primary.baseline_stats.unwrap();
        assert!(baseline.max < 100.0);
    }

    #[test]
    fn test_classify_level_policy() {
        let limits = MetricThresholds::new(80.0, 90.0, 70.0);

        assert_eq!(
            classify_level(&detection_with(&[]), Some(60.0), Some(&limits), 2),
            InsightLevel::Success
        );
        assert_eq!(
            classify_level(&detection_with(&[Severity::Minor; 2]), Some(60.0), Some(&limits), 2),
            InsightLevel::Success
        );
        assert_eq!(
            classify_level(&detection_with(&[Severity::Minor; 3]), Some(60.0), Some(&limits), 2),
            InsightLevel::Info
        );
        assert_eq!(
            classify_level(
                &detection_with(&[Severity::Minor, Severity::Moderate]),
                Some(60.0),
                Some(&limits),
                2
            ),
            InsightLevel::Warning
        );
        assert_eq!(
            classify_level(&detection_with(&[Severity::Severe]), Some(60.0), None, 2),
            InsightLevel::Critical
        );
        assert_eq!(
            classify_level(&detection_with(&[]), Some(91.0), Some(&limits), 2),
            InsightLevel::Critical
        );
        assert_eq!(
            classify_level(&detection_with(&[]), Some(82.0), Some(&limits), 2),
            InsightLevel::Warning
        );
        assert_eq!(
            classify_level(&detection_with(&[]), Some(90.0), Some(&limits), 2),
            InsightLevel::Critical
        );
    }

    #[test]
    fn test_reading_at_warning_limit_stays_healthy() {
        let limits = MetricThresholds::new(80.0, 90.0, 70.0);
        assert_eq!(
            classify_level(&detection_with(&[]), Some(80.0), Some(&limits), 2),
            InsightLevel::Success
        );

        let values: Vec<f64> = (0..20).map(|i| 60.0 + (i % 5) as f64 * 5.0).collect();
        let insights = run(MetricType::CpuTemp, &values, Some(limits));
        assert_eq!(insights[0].anomaly_count, 0);
        assert_eq!(insights[0].level, InsightLevel::Success);
    }

    #[test]
    fn test_recommendation_lookup_is_deterministic() {
        let first = recommendations(MetricType::CpuTemp, InsightLevel::Critical);
        let second = recommendations(MetricType::CpuTemp, InsightLevel::Critical);
        assert_eq!(first, second);
        assert_eq!(&first[..2], &["Check cooling system", "Monitor workload"]);

        for metric in MetricType::ALL {
            for level in [
                InsightLevel::Critical,
                InsightLevel::Warning,
                InsightLevel::Info,
                InsightLevel::Success,
            ] {
                assert!(!recommendations(metric, level).is_empty());
            }
        }
    }

    #[test]
    fn test_recommendation_content() {
        let temp = recommendations(MetricType::CpuTemp, InsightLevel::Warning);
        assert!(temp.iter().any(|r| r.to_lowercase().contains("temperature")));

        let usage = recommendations(MetricType::CpuUsage, InsightLevel::Warning);
        assert!(usage.iter().any(|r| r.to_lowercase().contains("application")));
    }

    #[test]
    fn test_short_series_carries_reliability_warning() {
        let limits = MetricThresholds::new(80.0, 90.0, 70.0);
        let insights = run(MetricType::CpuTemp, &[60.0, 61.0, 62.0], Some(limits));

        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].level, InsightLevel::Success);
        let warning = insights[0].reliability_warning.as_deref().unwrap();
        assert!(warning.contains("Only 3 readings"));
    }

    #[test]
    fn test_mostly_anomalous_series_adds_reliability_insight() {
        let mut values = vec![100.0; 15];
        values.extend([60.0, 61.0, 62.0, 63.0, 64.0]);
        let limits = MetricThresholds::new(80.0, 90.0, 70.0);
        let insights = run(MetricType::CpuTemp, &values, Some(limits));

        assert_eq!(insights[0].level, InsightLevel::Critical);
        let reliability: Vec<_> = insights
            .iter()
            .filter(|i| i.title == RELIABILITY_TITLE)
            .collect();
        assert_eq!(reliability.len(), 1);
        assert_eq!(reliability[0].level, InsightLevel::Info);
        assert_eq!(reliability[0].anomaly_count, 0);
        assert_eq!(reliability[0].data["flagged_ratio"], 1.0);
    }

    #[test]
    fn test_empty_series_yields_nothing() {
        assert!(run(MetricType::CpuTemp, &[], None).is_empty());
        assert!(run(MetricType::CpuTemp, &[f64::NAN, f64::NAN], None).is_empty());
    }

    #[test]
    fn test_insight_carries_period() {
        let insights = run(MetricType::MemoryUsage, &[40.0; 12], None);
        assert_eq!(insights[0].period_start, period().start);
        assert_eq!(insights[0].period_end, period().end);
        assert_eq!(insights[0].metric_type, MetricType::MemoryUsage);
    }
}
