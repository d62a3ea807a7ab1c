use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    #[serde(rename = "cpu_temperature")]
    CpuTemp,
    #[serde(rename = "gpu_temperature")]
    GpuTemp,
    CpuUsage,
    GpuUsage,
    FanSpeed,
    MemoryUsage,
    DiskUsage,
}

impl MetricType {
    pub const ALL: [MetricType; 7] = [
        MetricType::CpuTemp,
        MetricType::GpuTemp,
        MetricType::CpuUsage,
        MetricType::GpuUsage,
        MetricType::FanSpeed,
        MetricType::MemoryUsage,
        MetricType::DiskUsage,
    ];

    /// Metrics shown on the dashboard when the caller does not pick any.
    pub const KEY: [MetricType; 4] = [
        MetricType::CpuTemp,
        MetricType::GpuTemp,
        MetricType::CpuUsage,
        MetricType::MemoryUsage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::CpuTemp => "cpu_temperature",
            MetricType::GpuTemp => "gpu_temperature",
            MetricType::CpuUsage => "cpu_usage",
            MetricType::GpuUsage => "gpu_usage",
            MetricType::FanSpeed => "fan_speed",
            MetricType::MemoryUsage => "memory_usage",
            MetricType::DiskUsage => "disk_usage",
        }
    }

    /// Title-cased label, e.g. "Cpu Temperature".
    pub fn display_name(&self) -> String {
        self.as_str()
            .split('_')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn unit(&self) -> &'static str {
        match self {
            MetricType::CpuTemp | MetricType::GpuTemp => "°C",
            MetricType::FanSpeed => "RPM",
            _ => "%",
        }
    }

    pub fn is_temperature(&self) -> bool {
        matches!(self, MetricType::CpuTemp | MetricType::GpuTemp)
    }

    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            MetricType::CpuUsage | MetricType::GpuUsage | MetricType::MemoryUsage
        )
    }
}

impl std::fmt::Display for MetricType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MetricType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetricType::ALL
            .into_iter()
            .find(|m| m.as_str() == s.trim())
            .ok_or_else(|| format!("unknown metric type '{}'", s))
    }
}

/// Time-ordered samples of one metric from one sensor column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSeries {
    pub timestamps: Vec<NaiveDateTime>,
    pub values: Vec<f64>,
    pub metric_type: MetricType,
    pub component: String,
    pub unit: String,
}

impl MetricSeries {
    pub fn new(metric_type: MetricType, component: impl Into<String>) -> Self {
        Self {
            timestamps: Vec::new(),
            values: Vec::new(),
            metric_type,
            component: component.into(),
            unit: metric_type.unit().to_string(),
        }
    }

    /// Builds a series from raw samples, dropping non-finite values, sorting
    /// by time and keeping the first sample of any repeated timestamp.
    pub fn from_points(
        metric_type: MetricType,
        component: impl Into<String>,
        points: impl IntoIterator<Item = (NaiveDateTime, f64)>,
    ) -> Self {
        let mut points: Vec<(NaiveDateTime, f64)> =
            points.into_iter().filter(|(_, v)| v.is_finite()).collect();
        points.sort_by_key(|(ts, _)| *ts);
        points.dedup_by_key(|(ts, _)| *ts);

        let mut series = Self::new(metric_type, component);
        for (ts, value) in points {
            series.timestamps.push(ts);
            series.values.push(value);
        }
        series
    }

    pub fn len(&self) -> usize {
        self.values.len().min(self.timestamps.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pairs with a finite value, in series order.
    pub fn finite_points(&self) -> Vec<(NaiveDateTime, f64)> {
        self.timestamps
            .iter()
            .zip(self.values.iter())
            .filter(|(_, v)| v.is_finite())
            .map(|(ts, v)| (*ts, *v))
            .collect()
    }

    /// Copy of the series holding only samples inside `[start, end]`.
    pub fn restrict_to(&self, start: NaiveDateTime, end: NaiveDateTime) -> Self {
        let mut restricted = Self::new(self.metric_type, self.component.clone());
        restricted.unit = self.unit.clone();
        for (ts, value) in self.timestamps.iter().zip(self.values.iter()) {
            if *ts >= start && *ts <= end {
                restricted.timestamps.push(*ts);
                restricted.values.push(*value);
            }
        }
        restricted
    }

    /// Evenly strided sample of at most `max_points` points; the last point
    /// is always kept so charts end on the latest reading.
    pub fn downsample(&self, max_points: usize) -> Self {
        let len = self.len();
        if max_points == 0 || len <= max_points {
            return self.clone();
        }

        let mut sampled = Self::new(self.metric_type, self.component.clone());
        sampled.unit = self.unit.clone();
        let step = len as f64 / max_points as f64;
        for i in 0..max_points {
            let idx = if i + 1 == max_points {
                len - 1
            } else {
                (i as f64 * step) as usize
            };
            sampled.timestamps.push(self.timestamps[idx]);
            sampled.values.push(self.values[idx]);
        }
        sampled
    }
}

/// Inclusive analysis window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Period {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self { start, end }
    }

    /// From the first second of `start` to the last second of `end`.
    pub fn from_dates(start: NaiveDate, end: NaiveDate) -> Self {
        let start = start.and_hms_opt(0, 0, 0).unwrap_or_default();
        let end = end.and_hms_opt(23, 59, 59).unwrap_or_default();
        Self { start, end }
    }

    pub fn contains(&self, ts: NaiveDateTime) -> bool {
        ts >= self.start && ts <= self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaselineStats {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub q25: f64,
    pub q75: f64,
    pub iqr: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Minor,
    Moderate,
    Severe,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Minor => write!(f, "minor"),
            Severity::Moderate => write!(f, "moderate"),
            Severity::Severe => write!(f, "severe"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    ZScore,
    Iqr,
    Threshold,
}

impl std::fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DetectionMethod::ZScore => write!(f, "z-score"),
            DetectionMethod::Iqr => write!(f, "IQR"),
            DetectionMethod::Threshold => write!(f, "threshold"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExpectedRange {
    pub lower: f64,
    pub upper: f64,
}

impl ExpectedRange {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyEvent {
    pub timestamp: NaiveDateTime,
    pub value: f64,
    pub severity: Severity,
    pub description: String,
    pub expected_range: ExpectedRange,
    pub method: DetectionMethod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightLevel {
    Critical,
    Warning,
    Info,
    Success,
}

impl InsightLevel {
    /// Sort key, most urgent first.
    pub fn rank(&self) -> u8 {
        match self {
            InsightLevel::Critical => 0,
            InsightLevel::Warning => 1,
            InsightLevel::Info => 2,
            InsightLevel::Success => 3,
        }
    }
}

impl std::fmt::Display for InsightLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InsightLevel::Critical => write!(f, "critical"),
            InsightLevel::Warning => write!(f, "warning"),
            InsightLevel::Info => write!(f, "info"),
            InsightLevel::Success => write!(f, "success"),
        }
    }
}

impl std::str::FromStr for InsightLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "critical" => Ok(InsightLevel::Critical),
            "warning" => Ok(InsightLevel::Warning),
            "info" => Ok(InsightLevel::Info),
            "success" => Ok(InsightLevel::Success),
            other => Err(format!("unknown insight level '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Insight {
    pub id: String,
    pub title: String,
    pub description: String,
    pub level: InsightLevel,
    pub metric_type: MetricType,
    pub component: String,
    pub timestamp: NaiveDateTime,
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub data: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub events: Vec<AnomalyEvent>,
    pub period_start: NaiveDateTime,
    pub period_end: NaiveDateTime,
    pub anomaly_count: usize,
    pub baseline_stats: Option<BaselineStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reliability_warning: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsightCounts {
    pub critical: usize,
    pub warning: usize,
    pub info: usize,
    pub success: usize,
}

impl InsightCounts {
    pub fn tally<'a>(insights: impl IntoIterator<Item = &'a Insight>) -> Self {
        let mut counts = Self::default();
        for insight in insights {
            match insight.level {
                InsightLevel::Critical => counts.critical += 1,
                InsightLevel::Warning => counts.warning += 1,
                InsightLevel::Info => counts.info += 1,
                InsightLevel::Success => counts.success += 1,
            }
        }
        counts
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSummary {
    pub overall_health: String,
    pub insight_counts: InsightCounts,
    pub total_insights: usize,
    pub critical_issues: usize,
    pub warnings: usize,
    pub recommendations: usize,
    pub total_anomalies: usize,
    pub period: Period,
}

/// Hardware description recovered from the newest log file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub cpu_model: Option<String>,
    pub cpu_cores: Option<usize>,
    pub gpu_model: Option<String>,
    pub gpu_memory: Option<String>,
    pub memory_usage_avg: Option<String>,
    pub last_update: NaiveDate,
}
