use crate::models::metrics::{DetectionMethod, MetricType};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

const CONFIG_ENV_PREFIX: &str = "HWMON";
const CONFIG_PATH_ENV: &str = "HWMON_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {field} {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub data: DataConfig,
    pub analysis: AnalysisConfig,
    pub thresholds: ThresholdsConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Reads `config.toml`/`config.json` (or the file named by `HWMON_CONFIG`)
    /// and layers `HWMON__SECTION__FIELD` environment variables on top.
    pub fn load() -> Result<Self, ConfigError> {
        let file = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "config".to_string());

        let settings = config::Config::builder()
            .add_source(config::File::with_name(&file).required(false))
            .add_source(
                config::Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: AppConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parses a TOML document; missing sections take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(content, config::FileFormat::Toml))
            .build()?;
        let config: AppConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.analysis.validate()?;
        if self.data.max_range_days == 0 {
            return Err(ConfigError::Invalid {
                field: "data.max_range_days",
                reason: "must be at least 1".to_string(),
            });
        }
        for metric in MetricType::ALL {
            if let Some(t) = self.thresholds.for_metric(metric) {
                if t.warning > t.critical {
                    return Err(ConfigError::Invalid {
                        field: "thresholds",
                        reason: format!(
                            "{} warning {} is above critical {}",
                            metric, t.warning, t.critical
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub directory: PathBuf,
    pub file_prefix: String,
    pub max_range_days: u32,
    pub default_range_days: u32,
    pub max_rows_per_file: usize,
    pub max_points_per_series: usize,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("data"),
            file_prefix: "OpenHardwareMonitorLog-".to_string(),
            max_range_days: 365,
            default_range_days: 7,
            max_rows_per_file: 100_000,
            max_points_per_series: 2_000,
        }
    }
}

/// Tuning for one analysis pass. Passed explicitly to every call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub methods: Vec<DetectionMethod>,
    pub z_score_threshold: f64,
    pub iqr_multiplier: f64,
    pub min_samples: usize,
    pub minor_anomaly_tolerance: usize,
    pub max_anomaly_ratio: f64,
    pub trend_min_samples: usize,
    pub trend_slope_threshold: f64,
    pub variability_ratio: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            methods: vec![
                DetectionMethod::ZScore,
                DetectionMethod::Iqr,
                DetectionMethod::Threshold,
            ],
            z_score_threshold: 3.0,
            iqr_multiplier: 1.5,
            min_samples: 10,
            minor_anomaly_tolerance: 2,
            max_anomaly_ratio: 0.25,
            trend_min_samples: 10,
            trend_slope_threshold: 0.1,
            variability_ratio: 0.3,
        }
    }
}

impl AnalysisConfig {
    pub fn uses(&self, method: DetectionMethod) -> bool {
        self.methods.contains(&method)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("analysis.z_score_threshold", self.z_score_threshold),
            ("analysis.iqr_multiplier", self.iqr_multiplier),
            ("analysis.max_anomaly_ratio", self.max_anomaly_ratio),
            ("analysis.trend_slope_threshold", self.trend_slope_threshold),
            ("analysis.variability_ratio", self.variability_ratio),
        ];
        for (field, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!("must be a positive number, got {}", value),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricThresholds {
    pub warning: f64,
    pub critical: f64,
    pub optimal_max: f64,
}

impl MetricThresholds {
    pub const fn new(warning: f64, critical: f64, optimal_max: f64) -> Self {
        Self {
            warning,
            critical,
            optimal_max,
        }
    }
}

/// Domain limits per metric. A metric without an entry gets no
/// threshold-based detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdsConfig {
    pub cpu_temperature: Option<MetricThresholds>,
    pub gpu_temperature: Option<MetricThresholds>,
    pub cpu_usage: Option<MetricThresholds>,
    pub gpu_usage: Option<MetricThresholds>,
    pub fan_speed: Option<MetricThresholds>,
    pub memory_usage: Option<MetricThresholds>,
    pub disk_usage: Option<MetricThresholds>,
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        Self {
            cpu_temperature: Some(MetricThresholds::new(80.0, 90.0, 70.0)),
            gpu_temperature: Some(MetricThresholds::new(85.0, 95.0, 75.0)),
            cpu_usage: Some(MetricThresholds::new(90.0, 95.0, 80.0)),
            gpu_usage: Some(MetricThresholds::new(95.0, 98.0, 85.0)),
            fan_speed: None,
            memory_usage: Some(MetricThresholds::new(85.0, 95.0, 75.0)),
            disk_usage: Some(MetricThresholds::new(85.0, 95.0, 80.0)),
        }
    }
}

impl ThresholdsConfig {
    pub fn for_metric(&self, metric: MetricType) -> Option<&MetricThresholds> {
        match metric {
            MetricType::CpuTemp => self.cpu_temperature.as_ref(),
            MetricType::GpuTemp => self.gpu_temperature.as_ref(),
            MetricType::CpuUsage => self.cpu_usage.as_ref(),
            MetricType::GpuUsage => self.gpu_usage.as_ref(),
            MetricType::FanSpeed => self.fan_speed.as_ref(),
            MetricType::MemoryUsage => self.memory_usage.as_ref(),
            MetricType::DiskUsage => self.disk_usage.as_ref(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub directory: PathBuf,
    pub json_file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: PathBuf::from("logs"),
            json_file: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.analysis.z_score_threshold, 3.0);
        assert_eq!(config.analysis.iqr_multiplier, 1.5);
        assert_eq!(config.analysis.min_samples, 10);
        assert!(config.analysis.uses(DetectionMethod::Threshold));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_thresholds_per_metric() {
        let thresholds = ThresholdsConfig::default();
        let cpu = thresholds.for_metric(MetricType::CpuTemp).unwrap();
        assert_eq!(cpu.warning, 80.0);
        assert_eq!(cpu.critical, 90.0);
        assert!(thresholds.for_metric(MetricType::FanSpeed).is_none());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            [analysis]
            z_score_threshold = 2.5
            methods = ["z_score", "iqr"]

            [data]
            directory = "/var/log/ohm"
            "#,
        )
        .unwrap();

        assert_eq!(config.analysis.z_score_threshold, 2.5);
        assert_eq!(config.analysis.iqr_multiplier, 1.5);
        assert!(!config.analysis.uses(DetectionMethod::Threshold));
        assert_eq!(config.data.directory, PathBuf::from("/var/log/ohm"));
        assert_eq!(config.data.max_range_days, 365);
        assert_eq!(config.server.port, 8000);
    }

    #[test]
    fn test_threshold_override() {
        let config = AppConfig::from_toml_str(
            r#"
            [thresholds.fan_speed]
            warning = 2500.0
            critical = 3200.0
            optimal_max = 1800.0
            "#,
        )
        .unwrap();
        let fan = config.thresholds.for_metric(MetricType::FanSpeed).unwrap();
        assert_eq!(fan.critical, 3200.0);
    }

    #[test]
    fn test_rejects_non_positive_multiplier() {
        let err = AppConfig::from_toml_str(
            r#"
            [analysis]
            iqr_multiplier = 0.0
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("analysis.iqr_multiplier"));
    }

    #[test]
    fn test_rejects_inverted_thresholds() {
        let mut config = AppConfig::default();
        config.thresholds.cpu_usage = Some(MetricThresholds::new(99.0, 90.0, 80.0));
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "thresholds", .. }));
    }
}
