use crate::models::config::{AnalysisConfig, ThresholdsConfig};
use crate::models::metrics::{
    HealthSummary, Insight, InsightCounts, InsightLevel, MetricSeries, MetricType, Period,
};
use crate::services::detector::AnomalyDetector;
use crate::services::synthesizer::{new_insight, recommendations, Synthesizer};
use crate::services::{baseline, stats};
use chrono::NaiveDateTime;
use std::collections::HashMap;
use tracing::{debug, info};

/// CPU and GPU mean temperatures above which both count as running hot.
const HOT_CPU_MEAN: f64 = 75.0;
const HOT_GPU_MEAN: f64 = 80.0;
/// CPU load above which a sample counts as "under load" for throttling checks.
const THROTTLE_LOAD: f64 = 80.0;
const THROTTLE_TEMP: f64 = 85.0;

/// Stateless analysis pass over the series of one period.
pub struct InsightsEngine<'a> {
    analysis: &'a AnalysisConfig,
    thresholds: &'a ThresholdsConfig,
}

impl<'a> InsightsEngine<'a> {
    pub fn new(analysis: &'a AnalysisConfig, thresholds: &'a ThresholdsConfig) -> Self {
        Self {
            analysis,
            thresholds,
        }
    }

    /// Every insight for `period`. Each series is cut down to the period
    /// before anything is computed, so no reading outside it can influence
    /// a baseline or show up as an event.
    pub fn analyze(&self, series: &[MetricSeries], period: Period) -> Vec<Insight> {
        let scoped: Vec<MetricSeries> = series
            .iter()
            .map(|s| s.restrict_to(period.start, period.end))
            .filter(|s| !s.is_empty())
            .collect();

        let mut insights = Vec::new();
        for s in &scoped {
            insights.extend(self.analyze_series(s, period));
        }
        insights.extend(self.cross_metric_insights(&scoped, period));
        insights.extend(self.trend_insights(&scoped, period));

        info!(
            series = scoped.len(),
            insights = insights.len(),
            start = %period.start,
            end = %period.end,
            "analysis complete"
        );
        insights
    }

    /// Detection, baseline and synthesis for one series, plus load,
    /// optimal temperature and variability patterns.
    pub fn analyze_series(&self, series: &MetricSeries, period: Period) -> Vec<Insight> {
        let scoped = series.restrict_to(period.start, period.end);
        let points = scoped.finite_points();
        if points.is_empty() {
            return Vec::new();
        }

        let limits = self.thresholds.for_metric(scoped.metric_type);
        let detection = AnomalyDetector::new(self.analysis, limits).detect(&points);
        let values: Vec<f64> = points.iter().map(|(_, v)| *v).collect();
        let baseline = baseline::compute(&values, &detection.flagged);

        debug!(
            metric = %scoped.metric_type,
            component = %scoped.component,
            samples = values.len(),
            anomalies = detection.events.len(),
            "series analysed"
        );

        let mut insights = Synthesizer::new(self.analysis, limits).synthesize(
            &scoped,
            &detection,
            baseline.as_ref(),
            period,
        );

        if detection.low_confidence {
            return insights;
        }

        let (Some(mean), Some(std)) = (stats::mean(&values), stats::std_dev(&values)) else {
            return insights;
        };
        let name = scoped.metric_type.display_name();

        if let Some(limits) = limits {
            if scoped.metric_type.is_usage() && mean >= limits.warning {
                let mut insight = new_insight(
                    format!("Sustained High {}", name),
                    format!(
                        "Average {} is {:.1}{}, indicating sustained high system load.",
                        name.to_lowercase(),
                        mean,
                        scoped.unit
                    ),
                    InsightLevel::Warning,
                    scoped.metric_type,
                    scoped.component.clone(),
                    period,
                );
                insight.recommendations = recommendations(scoped.metric_type, InsightLevel::Warning);
                insight.baseline_stats = baseline;
                insights.push(insight);
            }

            if scoped.metric_type.is_temperature() && mean <= limits.optimal_max {
                let mut insight = new_insight(
                    format!("Optimal {}", name),
                    format!(
                        "Average {} of {:.1}{} is within the optimal range (at most {:.0}{}).",
                        name.to_lowercase(),
                        mean,
                        scoped.unit,
                        limits.optimal_max,
                        scoped.unit
                    ),
                    InsightLevel::Success,
                    scoped.metric_type,
                    scoped.component.clone(),
                    period,
                );
                insight.recommendations = recommendations(scoped.metric_type, InsightLevel::Success);
                insight.baseline_stats = baseline;
                insights.push(insight);
            }
        }

        if mean > 0.0 && std > mean * self.analysis.variability_ratio {
            let mut insight = new_insight(
                format!("Variable {}", name),
                format!(
                    "{} shows high variability (std: {:.1}). This may indicate an inconsistent workload or cooling issues.",
                    name, std
                ),
                InsightLevel::Info,
                scoped.metric_type,
                scoped.component.clone(),
                period,
            );
            insight.recommendations = recommendations(scoped.metric_type, InsightLevel::Info);
            insight.baseline_stats = baseline;
            insight.data.insert("std".to_string(), std.into());
            insight.data.insert("mean".to_string(), mean.into());
            insights.push(insight);
        }

        insights
    }

    /// Findings that need more than one metric: both processors running hot,
    /// and high CPU temperature while the CPU is under load.
    pub fn cross_metric_insights(&self, series: &[MetricSeries], period: Period) -> Vec<Insight> {
        let find = |metric: MetricType| series.iter().find(|s| s.metric_type == metric);
        let mut insights = Vec::new();

        let cpu_temp = find(MetricType::CpuTemp);
        let gpu_temp = find(MetricType::GpuTemp);
        let cpu_usage = find(MetricType::CpuUsage);

        if let (Some(cpu), Some(gpu)) = (cpu_temp, gpu_temp) {
            if let (Some(cpu_mean), Some(gpu_mean)) =
                (stats::mean(&cpu.values), stats::mean(&gpu.values))
            {
                if cpu_mean > HOT_CPU_MEAN && gpu_mean > HOT_GPU_MEAN {
                    let mut insight = new_insight(
                        "High System Temperatures",
                        format!(
                            "Both CPU ({:.1}°C) and GPU ({:.1}°C) are running at elevated average temperatures. This may indicate insufficient case airflow or cooling capacity.",
                            cpu_mean, gpu_mean
                        ),
                        InsightLevel::Warning,
                        MetricType::CpuTemp,
                        "system",
                        period,
                    );
                    insight.recommendations = vec![
                        "Improve case airflow with additional fans".to_string(),
                        "Check case ventilation and cable management".to_string(),
                        "Monitor ambient room temperature".to_string(),
                    ];
                    insights.push(insight);
                }
            }
        }

        if let (Some(temp), Some(usage)) = (cpu_temp, cpu_usage) {
            let load: HashMap<NaiveDateTime, f64> = usage.finite_points().into_iter().collect();
            let loaded_temps: Vec<f64> = temp
                .finite_points()
                .into_iter()
                .filter(|(ts, _)| load.get(ts).is_some_and(|u| *u > THROTTLE_LOAD))
                .map(|(_, v)| v)
                .collect();

            if let Some(loaded_mean) = stats::mean(&loaded_temps) {
                if loaded_mean > THROTTLE_TEMP {
                    let mut insight = new_insight(
                        "Potential Thermal Throttling",
                        format!(
                            "CPU temperature averages {:.1}°C while CPU load is above {:.0}%. This may cause performance throttling.",
                            loaded_mean, THROTTLE_LOAD
                        ),
                        InsightLevel::Warning,
                        MetricType::CpuTemp,
                        temp.component.clone(),
                        period,
                    );
                    insight.recommendations = vec![
                        "Upgrade CPU cooler".to_string(),
                        "Apply high-quality thermal paste".to_string(),
                        "Check for proper cooler mounting".to_string(),
                        "Consider undervolting if supported".to_string(),
                    ];
                    insight
                        .data
                        .insert("loaded_samples".to_string(), loaded_temps.len().into());
                    insights.push(insight);
                }
            }
        }

        insights
    }

    /// Temperature drift over the period, from a least-squares fit over the
    /// readings in order.
    pub fn trend_insights(&self, series: &[MetricSeries], period: Period) -> Vec<Insight> {
        let mut insights = Vec::new();

        for s in series.iter().filter(|s| s.metric_type.is_temperature()) {
            let values = stats::finite(&s.values);
            if values.len() < self.analysis.trend_min_samples {
                continue;
            }
            let Some(slope) = stats::linear_slope(&values) else {
                continue;
            };
            let name = s.metric_type.display_name();
            let threshold = self.analysis.trend_slope_threshold;

            let mut insight = if slope > threshold {
                let mut insight = new_insight(
                    format!("Increasing {} Trend", name),
                    format!(
                        "{} shows an increasing trend over the period. This may indicate deteriorating cooling performance.",
                        name
                    ),
                    InsightLevel::Warning,
                    s.metric_type,
                    s.component.clone(),
                    period,
                );
                insight.recommendations = vec![
                    "Clean dust from cooling components".to_string(),
                    "Check thermal paste condition".to_string(),
                    "Monitor fan speeds and noise".to_string(),
                ];
                insight
            } else if slope < -threshold {
                let mut insight = new_insight(
                    format!("Improving {}", name),
                    format!(
                        "{} shows a decreasing trend over the period. Cooling changes appear to be working.",
                        name
                    ),
                    InsightLevel::Success,
                    s.metric_type,
                    s.component.clone(),
                    period,
                );
                insight.recommendations = vec![
                    "Continue current maintenance routine".to_string(),
                    "Monitor for sustained improvement".to_string(),
                ];
                insight
            } else {
                continue;
            };

            insight.data.insert("trend_slope".to_string(), slope.into());
            insights.push(insight);
        }

        insights
    }
}

/// Aggregate view over a set of insights.
pub fn health_summary(insights: &[Insight], period: Period) -> HealthSummary {
    let counts = InsightCounts::tally(insights);

    let overall_health = if counts.critical > 0 {
        "critical"
    } else if counts.warning > 0 {
        "warning"
    } else if counts.success > counts.info {
        "good"
    } else {
        "normal"
    };

    HealthSummary {
        overall_health: overall_health.to_string(),
        insight_counts: counts,
        total_insights: insights.len(),
        critical_issues: counts.critical,
        warnings: counts.warning,
        recommendations: insights
            .iter()
            .filter(|i| !i.recommendations.is_empty())
            .count(),
        total_anomalies: insights.iter().map(|i| i.anomaly_count).sum(),
        period,
    }
}

/// Health label for a group of insights: "critical", "warning", "good" or
/// "normal".
pub fn component_health<'b>(insights: impl IntoIterator<Item = &'b Insight>) -> &'static str {
    let levels: Vec<InsightLevel> = insights.into_iter().map(|i| i.level).collect();
    if levels.contains(&InsightLevel::Critical) {
        "critical"
    } else if levels.contains(&InsightLevel::Warning) {
        "warning"
    } else if levels.contains(&InsightLevel::Success) {
        "good"
    } else {
        "normal"
    }
}
