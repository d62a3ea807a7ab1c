//! Reads the daily CSV logs written by Open Hardware Monitor.
//!
//! A log file starts with a row of sensor identifiers such as
//! `/amdcpu/0/temperature/0`, followed by a header row (`Time,CPU Core #1,...`)
//! and one row per sample. Column names repeat across sensor kinds, so the
//! identifier row is what tells a CPU temperature apart from a CPU load.

use crate::error::DataError;
use crate::models::config::DataConfig;
use crate::models::metrics::{BaselineStats, MetricSeries, MetricType, Period, SystemInfo};
use crate::services::stats;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use regex::Regex;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const TIMESTAMP_FORMATS: [&str; 4] = [
    "%m/%d/%Y %H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// Rows scanned for the `Time` header before giving up and treating the first
/// row as the header.
const HEADER_SCAN_ROWS: usize = 5;

pub fn parse_date(value: &str) -> Result<NaiveDate, DataError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|e| DataError::InvalidDate(format!("{} ({})", value, e)))
}

fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogColumn {
    pub name: String,
    pub identifier: Option<String>,
}

impl LogColumn {
    fn hardware(&self) -> Option<String> {
        self.identifier
            .as_deref()
            .and_then(|id| id.trim_start_matches('/').split('/').next())
            .map(|hw| hw.to_lowercase())
    }

    fn sensor(&self) -> Option<String> {
        let id = self.identifier.as_deref()?;
        let parts: Vec<&str> = id.trim_matches('/').split('/').collect();
        if parts.len() < 2 {
            return None;
        }
        Some(parts[parts.len() - 2].to_lowercase())
    }
}

/// One parsed daily log.
#[derive(Debug, Clone, Default)]
pub struct LogFrame {
    pub columns: Vec<LogColumn>,
    pub rows: Vec<(NaiveDateTime, Vec<Option<f64>>)>,
}

impl LogFrame {
    pub fn has_identifiers(&self) -> bool {
        self.columns.iter().any(|c| c.identifier.is_some())
    }

    pub fn column_values(&self, idx: usize) -> Vec<f64> {
        self.rows
            .iter()
            .filter_map(|(_, cells)| cells.get(idx).copied().flatten())
            .filter(|v| v.is_finite())
            .collect()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
}

/// Parses one log. `date` stamps rows at one-minute intervals when the file
/// carries no time column; at most `max_rows` samples are kept.
pub fn parse_log<R: Read>(reader: R, date: NaiveDate, max_rows: usize) -> Result<LogFrame, DataError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let records: Vec<csv::StringRecord> = csv_reader.records().collect::<Result<_, _>>()?;
    if records.is_empty() {
        return Ok(LogFrame::default());
    }

    let header_idx = records
        .iter()
        .take(HEADER_SCAN_ROWS)
        .position(|r| r.get(0).is_some_and(|cell| cell.contains("Time")));

    let (header, identifiers, data_start, has_time) = match header_idx {
        Some(idx) => {
            let identifiers = idx.checked_sub(1).map(|prev| &records[prev]);
            (&records[idx], identifiers, idx + 1, true)
        }
        None => (&records[0], None, 1, false),
    };

    let first_value_col = if has_time { 1 } else { 0 };
    let columns: Vec<LogColumn> = header
        .iter()
        .enumerate()
        .skip(first_value_col)
        .map(|(i, name)| LogColumn {
            name: name.to_string(),
            identifier: identifiers
                .and_then(|ids| ids.get(i))
                .filter(|id| id.starts_with('/'))
                .map(|id| id.to_string()),
        })
        .collect();

    let midnight = date.and_hms_opt(0, 0, 0).unwrap_or_default();
    let mut rows = Vec::new();
    let mut skipped = 0usize;

    for (n, record) in records.iter().skip(data_start).enumerate() {
        if rows.len() >= max_rows {
            warn!(date = %date, max_rows, "log truncated at row limit");
            break;
        }

        let timestamp = if has_time {
            match record.get(0).and_then(parse_timestamp) {
                Some(ts) => ts,
                None => {
                    skipped += 1;
                    continue;
                }
            }
        } else {
            midnight + Duration::minutes(n as i64)
        };

        let cells = (0..columns.len())
            .map(|i| {
                record
                    .get(i + first_value_col)
                    .and_then(|cell| cell.parse::<f64>().ok())
                    .filter(|v| v.is_finite())
            })
            .collect();
        rows.push((timestamp, cells));
    }

    if skipped > 0 {
        debug!(date = %date, skipped, "rows with unparsable timestamps skipped");
    }

    Ok(LogFrame { columns, rows })
}

/// How to find a metric's column in a log.
struct ColumnRule {
    /// Hardware segment of the identifier must contain one of these.
    hardware: &'static [&'static str],
    sensor: &'static str,
    /// Preferred names among matching columns, in order.
    preferred: &'static [&'static str],
    /// Names used when the log has no identifier row.
    fallback: &'static [&'static str],
}

fn column_rule(metric: MetricType) -> ColumnRule {
    match metric {
        MetricType::CpuTemp => ColumnRule {
            hardware: &["cpu"],
            sensor: "temperature",
            preferred: &["CPU Package", "CPU Core #1"],
            fallback: &["CPU Package"],
        },
        MetricType::GpuTemp => ColumnRule {
            hardware: &["gpu"],
            sensor: "temperature",
            preferred: &["GPU Core"],
            fallback: &["GPU Core"],
        },
        MetricType::CpuUsage => ColumnRule {
            hardware: &["cpu"],
            sensor: "load",
            preferred: &["CPU Total"],
            fallback: &["CPU Total"],
        },
        MetricType::GpuUsage => ColumnRule {
            hardware: &["gpu"],
            sensor: "load",
            preferred: &["GPU Core"],
            fallback: &["GPU Core"],
        },
        MetricType::FanSpeed => ColumnRule {
            hardware: &[],
            sensor: "fan",
            preferred: &["GPU Fan"],
            fallback: &["GPU Fan"],
        },
        MetricType::MemoryUsage => ColumnRule {
            hardware: &["ram"],
            sensor: "load",
            preferred: &["Memory"],
            fallback: &["Memory"],
        },
        MetricType::DiskUsage => ColumnRule {
            hardware: &["hdd"],
            sensor: "load",
            preferred: &["Used Space"],
            fallback: &["Used Space"],
        },
    }
}

/// Index of the column holding `metric`, if the log has one.
pub fn select_column(frame: &LogFrame, metric: MetricType) -> Option<usize> {
    let rule = column_rule(metric);

    if !frame.has_identifiers() {
        return rule.fallback.iter().find_map(|name| frame.position(name));
    }

    let candidates: Vec<usize> = frame
        .columns
        .iter()
        .enumerate()
        .filter(|(_, col)| {
            let hardware_ok = rule.hardware.is_empty()
                || col
                    .hardware()
                    .is_some_and(|hw| rule.hardware.iter().any(|h| hw.contains(h)));
            hardware_ok && col.sensor().as_deref() == Some(rule.sensor)
        })
        .map(|(i, _)| i)
        .collect();

    rule.preferred
        .iter()
        .find_map(|name| {
            candidates
                .iter()
                .copied()
                .find(|&i| frame.columns[i].name == *name)
        })
        .or_else(|| candidates.first().copied())
}

pub struct DataProcessor {
    config: DataConfig,
    file_pattern: Regex,
}

impl DataProcessor {
    pub fn new(config: DataConfig) -> Result<Self, DataError> {
        let pattern = format!(
            r"^(?:{})?(\d{{4}}-\d{{2}}-\d{{2}})\.csv$",
            regex::escape(&config.file_prefix)
        );
        let file_pattern = Regex::new(&pattern)?;
        Ok(Self {
            config,
            file_pattern,
        })
    }

    /// Dates with a log file on disk, oldest first.
    pub fn available_dates(&self) -> Result<Vec<NaiveDate>, DataError> {
        let dir = &self.config.directory;
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(directory = %dir.display(), "data directory does not exist");
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(DataError::Io {
                    path: dir.clone(),
                    source,
                })
            }
        };

        let mut dates = BTreeSet::new();
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(caps) = self.file_pattern.captures(&name) {
                if let Ok(date) = parse_date(&caps[1]) {
                    dates.insert(date);
                }
            }
        }
        Ok(dates.into_iter().collect())
    }

    fn path_for(&self, date: NaiveDate) -> Option<PathBuf> {
        let day = date.format("%Y-%m-%d").to_string();
        [
            format!("{}{}.csv", self.config.file_prefix, day),
            format!("{}.csv", day),
        ]
        .into_iter()
        .map(|name| self.config.directory.join(name))
        .find(|path| path.is_file())
    }

    pub fn load_day(&self, date: NaiveDate) -> Result<LogFrame, DataError> {
        let path = self.path_for(date).ok_or(DataError::FileNotFound(date))?;
        self.load_file(&path, date)
    }

    fn load_file(&self, path: &Path, date: NaiveDate) -> Result<LogFrame, DataError> {
        let file = File::open(path).map_err(|source| DataError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let frame = parse_log(file, date, self.config.max_rows_per_file)?;
        debug!(
            path = %path.display(),
            columns = frame.columns.len(),
            rows = frame.rows.len(),
            "log loaded"
        );
        Ok(frame)
    }

    /// Checks that `start <= end` and the span fits the configured maximum.
    pub fn validate_range(&self, start: NaiveDate, end: NaiveDate) -> Result<(), DataError> {
        if end < start {
            return Err(DataError::InvalidRange(format!(
                "end date {} is before start date {}",
                end, start
            )));
        }
        let days = (end - start).num_days() + 1;
        if days > i64::from(self.config.max_range_days) {
            return Err(DataError::InvalidRange(format!(
                "{} days requested, at most {} allowed",
                days, self.config.max_range_days
            )));
        }
        Ok(())
    }

    fn frames_for(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<LogFrame>, DataError> {
        self.validate_range(start, end)?;
        let mut frames = Vec::new();
        for date in start.iter_days().take_while(|d| *d <= end) {
            match self.load_day(date) {
                Ok(frame) => frames.push(frame),
                Err(DataError::FileNotFound(_)) => warn!(date = %date, "no data for date"),
                Err(e) => return Err(e),
            }
        }
        Ok(frames)
    }

    /// One series per requested metric found in the logs of `[start, end]`.
    /// Metrics with no readings in the period are left out.
    pub fn metrics_for_period(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        metric_types: &[MetricType],
    ) -> Result<Vec<MetricSeries>, DataError> {
        let frames = self.frames_for(start, end)?;
        let period = Period::from_dates(start, end);
        let metric_types: &[MetricType] = if metric_types.is_empty() {
            &MetricType::ALL
        } else {
            metric_types
        };

        let mut results = Vec::new();
        for &metric in metric_types {
            let mut component = None;
            let mut points = Vec::new();

            for frame in &frames {
                let Some(idx) = select_column(frame, metric) else {
                    continue;
                };
                component.get_or_insert_with(|| frame.columns[idx].name.clone());
                points.extend(frame.rows.iter().filter_map(|(ts, cells)| {
                    let value = cells.get(idx).copied().flatten()?;
                    period.contains(*ts).then_some((*ts, value))
                }));
            }

            if let Some(component) = component {
                let series = MetricSeries::from_points(metric, component, points);
                if !series.is_empty() {
                    results.push(series);
                }
            }
        }

        Ok(results)
    }

    /// Summary statistics of one metric over the period.
    pub fn statistics(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        metric: MetricType,
    ) -> Result<Option<BaselineStats>, DataError> {
        let series = self.metrics_for_period(start, end, &[metric])?;
        let values: Vec<f64> = series.iter().flat_map(|s| s.values.iter().copied()).collect();
        Ok(stats::describe(&values))
    }

    /// Hardware details taken from the newest log, or `None` when there are
    /// no logs.
    pub fn system_info(&self) -> Result<Option<SystemInfo>, DataError> {
        let Some(latest) = self.available_dates()?.last().copied() else {
            return Ok(None);
        };
        let frame = self.load_day(latest)?;
        Ok(Some(describe_system(&frame, latest)))
    }
}

fn describe_system(frame: &LogFrame, last_update: NaiveDate) -> SystemInfo {
    let hardware: BTreeSet<String> = frame.columns.iter().filter_map(|c| c.hardware()).collect();
    let has = |needle: &str| hardware.iter().any(|hw| hw.contains(needle));

    let cores: BTreeSet<&str> = frame
        .columns
        .iter()
        .filter(|c| c.name.starts_with("CPU Core #"))
        .map(|c| c.name.as_str())
        .collect();
    let cpu_cores = (!cores.is_empty()).then_some(cores.len());

    let cpu_vendor = if has("amdcpu") {
        Some("AMD")
    } else if has("intelcpu") {
        Some("Intel")
    } else {
        None
    };
    let cpu_model = cpu_vendor.map(|vendor| match cpu_cores {
        Some(n) => format!("{} CPU ({} cores)", vendor, n),
        None => format!("{} CPU", vendor),
    });

    let gpu_model = if has("nvidiagpu") {
        Some("NVIDIA GPU".to_string())
    } else if has("atigpu") {
        Some("AMD GPU".to_string())
    } else {
        None
    };

    let memory_usage_avg = select_column(frame, MetricType::MemoryUsage)
        .and_then(|idx| stats::mean(&frame.column_values(idx)))
        .map(|avg| format!("{:.1}%", avg));

    let gpu_memory = frame
        .position("GPU Memory Total")
        .and_then(|idx| frame.column_values(idx).first().copied())
        .map(|mb| format!("{:.1} GB", mb / 1024.0));

    SystemInfo {
        cpu_model,
        cpu_cores,
        gpu_model,
        gpu_memory,
        memory_usage_avg,
        last_update,
    }
}
