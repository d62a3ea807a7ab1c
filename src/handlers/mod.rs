use crate::error::{ApiError, ApiResult};
use crate::models::config::AppConfig;
use crate::models::metrics::{Insight, MetricSeries, MetricType, Period};
use crate::services::data_processor::{parse_date, DataProcessor};
use crate::services::insights::InsightsEngine;
use axum::{http::HeaderValue, response::IntoResponse, routing::get, Json, Router};
use chrono::{Duration, Local, NaiveDate};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

pub mod dashboard;
pub mod insights;
pub mod metrics;

pub const API_NAME: &str = "Open Hardware Monitor Dashboard API";
pub const API_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Days covered by `recent`-style endpoints when `days` is not given.
const DEFAULT_RECENT_DAYS: u32 = 7;
const MAX_RECENT_DAYS: u32 = 30;

// State
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

pub fn create_app(config: AppConfig) -> Router {
    let cors = cors_layer(&config.server.cors_origins);
    let state = AppState::new(config);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .nest("/api/v1/metrics", metrics::routes())
        .nest("/api/v1/insights", insights::routes())
        .nest("/api/v1/dashboard", dashboard::routes())
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(parsed))
}

// Routes
async fn root() -> impl IntoResponse {
    Json(json!({ "message": API_NAME, "version": API_VERSION }))
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "healthy" }))
}

/// Query string as ordered key/value pairs, so repeated keys such as
/// `metric_types=cpu_usage&metric_types=gpu_usage` survive.
#[derive(Debug, Default)]
pub struct Params(Vec<(String, String)>);

impl From<Vec<(String, String)>> for Params {
    fn from(pairs: Vec<(String, String)>) -> Self {
        Self(pairs)
    }
}

impl Params {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn require(&self, key: &str) -> ApiResult<&str> {
        self.get(key)
            .ok_or_else(|| ApiError::BadRequest(format!("missing query parameter '{}'", key)))
    }

    pub fn date(&self, key: &str) -> ApiResult<NaiveDate> {
        Ok(parse_date(self.require(key)?)?)
    }

    /// `start_date` and `end_date`, both required.
    pub fn date_range(&self) -> ApiResult<(NaiveDate, NaiveDate)> {
        Ok((self.date("start_date")?, self.date("end_date")?))
    }

    /// `days`, defaulting to a week and limited to 1..=30.
    pub fn days(&self) -> ApiResult<u32> {
        let Some(raw) = self.get("days") else {
            return Ok(DEFAULT_RECENT_DAYS);
        };
        match raw.trim().parse::<u32>() {
            Ok(days) if (1..=MAX_RECENT_DAYS).contains(&days) => Ok(days),
            _ => Err(ApiError::BadRequest(format!(
                "days must be between 1 and {}, got '{}'",
                MAX_RECENT_DAYS, raw
            ))),
        }
    }

    pub fn metric_type(&self) -> ApiResult<MetricType> {
        self.require("metric_type")?
            .parse()
            .map_err(ApiError::BadRequest)
    }

    /// Every `metric_types` value; comma-separated lists are accepted too.
    pub fn metric_types(&self) -> ApiResult<Vec<MetricType>> {
        let mut types = Vec::new();
        for (_, value) in self.0.iter().filter(|(k, _)| k == "metric_types") {
            for part in value.split(',').filter(|p| !p.trim().is_empty()) {
                let metric: MetricType = part.parse().map_err(ApiError::BadRequest)?;
                if !types.contains(&metric) {
                    types.push(metric);
                }
            }
        }
        Ok(types)
    }
}

/// `[today - days, today]` in local time.
pub fn recent_range(days: u32) -> (NaiveDate, NaiveDate) {
    let end = Local::now().date_naive();
    (end - Duration::days(i64::from(days)), end)
}

pub fn period_json(start: NaiveDate, end: NaiveDate) -> Value {
    json!({
        "start_date": start.format("%Y-%m-%d").to_string(),
        "end_date": end.format("%Y-%m-%d").to_string(),
    })
}

/// Runs file reading and analysis off the async runtime.
pub async fn blocking<T, F>(work: F) -> ApiResult<T>
where
    F: FnOnce() -> ApiResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await?
}

/// Loads every metric for the range and runs the full analysis.
pub fn analyze_range(
    config: &AppConfig,
    start: NaiveDate,
    end: NaiveDate,
) -> ApiResult<Vec<Insight>> {
    let processor = DataProcessor::new(config.data.clone())?;
    let series = processor.metrics_for_period(start, end, &MetricType::ALL)?;
    Ok(analyze_series(config, &series, start, end))
}

/// Full analysis over series that are already loaded.
pub fn analyze_series(
    config: &AppConfig,
    series: &[MetricSeries],
    start: NaiveDate,
    end: NaiveDate,
) -> Vec<Insight> {
    let engine = InsightsEngine::new(&config.analysis, &config.thresholds);
    engine.analyze(series, Period::from_dates(start, end))
}
