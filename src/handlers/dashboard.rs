use super::insights::recent_body;
use super::metrics::quick_overview_body;
use super::{analyze_range, analyze_series, blocking, period_json, recent_range, AppState, Params};
use crate::error::ApiResult;
use crate::models::config::AppConfig;
use crate::models::metrics::{
    Insight, InsightLevel, MetricSeries, MetricType, Period, SystemInfo,
};
use crate::services::data_processor::DataProcessor;
use crate::services::insights::{component_health, health_summary};
use crate::services::stats;
use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{json, Map, Value};

/// Fewest points a series needs before a trend is reported.
const TREND_MIN_POINTS: usize = 5;
/// Slope magnitude that makes a trend "strong".
const STRONG_SLOPE: f64 = 0.5;
const REFRESH_INTERVAL_SECS: u32 = 30;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/overview", get(overview))
        .route("/health-status", get(health_status))
        .route("/trends", get(trends))
        .route("/performance-summary", get(performance_summary))
        .route("/config", get(dashboard_config))
}

async fn overview(
    State(state): State<AppState>,
    Query(query): Query<Vec<(String, String)>>,
) -> ApiResult<Json<Value>> {
    let days = Params::from(query).days()?;
    let config = state.config.clone();

    let body = blocking(move || {
        let (start, end) = recent_range(days);
        let processor = DataProcessor::new(config.data.clone())?;
        let system_info = processor.system_info()?;
        let series = processor.metrics_for_period(start, end, &MetricType::ALL)?;
        Ok(overview_body(&config, system_info, &series, start, end, days))
    })
    .await?;

    Ok(Json(body))
}

/// Overview from one load of the period: the quick overview, health summary
/// and recent list all come from the same series and the same insights.
fn overview_body(
    config: &AppConfig,
    system_info: Option<SystemInfo>,
    series: &[MetricSeries],
    start: NaiveDate,
    end: NaiveDate,
    days: u32,
) -> Value {
    let insights = analyze_series(config, series, start, end);
    let summary = health_summary(&insights, Period::from_dates(start, end));

    let mut period = period_json(start, end);
    period["days"] = json!(days);

    json!({
        "system_info": system_info,
        "overview": quick_overview_body(series, start, end, days),
        "health_summary": summary,
        "recent_insights": recent_body(insights, start, end, days),
        "period": period,
    })
}

#[derive(Debug, Serialize)]
struct HealthStatus {
    overall_health: String,
    cpu_health: &'static str,
    gpu_health: &'static str,
    system_health: &'static str,
    alerts: Vec<Insight>,
}

fn health_status_for(insights: Vec<Insight>, period: Period) -> HealthStatus {
    let summary = health_summary(&insights, period);
    let of = |metrics: &[MetricType]| {
        component_health(insights.iter().filter(|i| metrics.contains(&i.metric_type)))
    };

    HealthStatus {
        overall_health: summary.overall_health,
        cpu_health: of(&[MetricType::CpuTemp, MetricType::CpuUsage]),
        gpu_health: of(&[MetricType::GpuTemp, MetricType::GpuUsage]),
        system_health: of(&[MetricType::MemoryUsage, MetricType::DiskUsage]),
        alerts: insights
            .iter()
            .filter(|i| i.level == InsightLevel::Critical)
            .cloned()
            .collect(),
    }
}

async fn health_status(
    State(state): State<AppState>,
    Query(query): Query<Vec<(String, String)>>,
) -> ApiResult<Json<Value>> {
    let (start, end) = Params::from(query).date_range()?;
    let config = state.config.clone();
    let insights = blocking(move || analyze_range(&config, start, end)).await?;
    Ok(Json(json!(health_status_for(
        insights,
        Period::from_dates(start, end)
    ))))
}

/// Direction, strength and size of the linear trend of one series.
fn trend_of(series: &MetricSeries, slope_threshold: f64) -> Option<Value> {
    if series.len() < TREND_MIN_POINTS {
        return None;
    }
    let slope = stats::linear_slope(&series.values)?;
    let first = *series.values.first()?;
    let last = *series.values.last()?;

    let (direction, strength) = if slope.abs() <= slope_threshold {
        ("stable", "weak")
    } else {
        let direction = if slope > 0.0 { "increasing" } else { "decreasing" };
        let strength = if slope.abs() > STRONG_SLOPE { "strong" } else { "moderate" };
        (direction, strength)
    };
    let change_percent = if first != 0.0 {
        (last - first) / first * 100.0
    } else {
        0.0
    };

    Some(json!({
        "direction": direction,
        "strength": strength,
        "slope": slope,
        "start_value": first,
        "end_value": last,
        "change_percent": change_percent,
        "unit": series.unit,
    }))
}

async fn trends(
    State(state): State<AppState>,
    Query(query): Query<Vec<(String, String)>>,
) -> ApiResult<Json<Value>> {
    let params = Params::from(query);
    let (start, end) = params.date_range()?;
    let mut metric_types = params.metric_types()?;
    if metric_types.is_empty() {
        metric_types = MetricType::KEY.to_vec();
    }

    let config = state.config.clone();
    let series = blocking(move || {
        let processor = DataProcessor::new(config.data.clone())?;
        Ok(processor.metrics_for_period(start, end, &metric_types)?)
    })
    .await?;

    let threshold = state.config.analysis.trend_slope_threshold;
    let trends: Map<String, Value> = series
        .iter()
        .filter_map(|s| trend_of(s, threshold).map(|t| (s.metric_type.to_string(), t)))
        .collect();

    Ok(Json(json!({
        "metrics_analyzed": trends.len(),
        "trends": trends,
        "period": period_json(start, end),
    })))
}

fn rating(metric: MetricType, average: f64) -> &'static str {
    let bands: [f64; 3] = if metric.is_temperature() {
        [60.0, 75.0, 85.0]
    } else if matches!(metric, MetricType::CpuUsage | MetricType::MemoryUsage) {
        [50.0, 75.0, 90.0]
    } else {
        return "normal";
    };

    if average <= bands[0] {
        "excellent"
    } else if average <= bands[1] {
        "good"
    } else if average <= bands[2] {
        "fair"
    } else {
        "poor"
    }
}

fn rating_score(rating: &str) -> f64 {
    match rating {
        "excellent" => 4.0,
        "good" => 3.0,
        "fair" => 2.0,
        "poor" => 1.0,
        _ => 2.5,
    }
}

fn overall_rating<'b>(ratings: impl IntoIterator<Item = &'b str>) -> &'static str {
    let scores: Vec<f64> = ratings.into_iter().map(rating_score).collect();
    let Some(avg) = stats::mean(&scores) else {
        return "normal";
    };

    if avg >= 3.5 {
        "excellent"
    } else if avg >= 2.5 {
        "good"
    } else if avg >= 1.5 {
        "fair"
    } else {
        "poor"
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

async fn performance_summary(
    State(state): State<AppState>,
    Query(query): Query<Vec<(String, String)>>,
) -> ApiResult<Json<Value>> {
    let (start, end) = Params::from(query).date_range()?;
    let config = state.config.clone();
    let series = blocking(move || {
        let processor = DataProcessor::new(config.data.clone())?;
        Ok(processor.metrics_for_period(start, end, &MetricType::KEY)?)
    })
    .await?;

    let mut summary = Map::new();
    let mut ratings = Vec::new();
    for s in series.iter().filter(|s| !s.is_empty()) {
        let Some(described) = stats::describe(&s.values) else {
            continue;
        };
        let rated = rating(s.metric_type, described.mean);
        ratings.push(rated);
        summary.insert(
            s.metric_type.to_string(),
            json!({
                "average": round2(described.mean),
                "maximum": round2(described.max),
                "minimum": round2(described.min),
                "rating": rated,
                "unit": s.unit,
                "data_points": described.count,
            }),
        );
    }

    Ok(Json(json!({
        "performance_summary": summary,
        "period": period_json(start, end),
        "overall_rating": overall_rating(ratings),
    })))
}

async fn dashboard_config() -> Json<Value> {
    Json(json!({
        "time_range": "week",
        "metrics": MetricType::KEY,
        "components": ["cpu", "gpu", "system"],
        "refresh_interval": REFRESH_INTERVAL_SECS,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::synthesizer::new_insight;

    fn series(metric: MetricType, values: &[f64]) -> MetricSeries {
        let day = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        MetricSeries::from_points(
            metric,
            "sensor",
            values
                .iter()
                .enumerate()
                .map(|(i, v)| (day.and_hms_opt(0, i as u32, 0).unwrap(), *v)),
        )
    }

    #[test]
    fn test_trend_directions() {
        let rising = trend_of(&series(MetricType::CpuTemp, &[40.0, 41.0, 42.0, 43.0, 44.0]), 0.1)
            .unwrap();
        assert_eq!(rising["direction"], json!("increasing"));
        assert_eq!(rising["strength"], json!("strong"));
        assert_eq!(rising["change_percent"], json!(10.0));

        let falling = trend_of(&series(MetricType::CpuTemp, &[50.0, 49.7, 49.4, 49.1, 48.8]), 0.1)
            .unwrap();
        assert_eq!(falling["direction"], json!("decreasing"));
        assert_eq!(falling["strength"], json!("moderate"));

        let flat = trend_of(&series(MetricType::CpuUsage, &[0.0, 0.0, 0.0, 0.0, 0.0]), 0.1).unwrap();
        assert_eq!(flat["direction"], json!("stable"));
        assert_eq!(flat["change_percent"], json!(0.0));
    }

    #[test]
    fn test_trend_needs_five_points() {
        assert!(trend_of(&series(MetricType::CpuTemp, &[40.0, 50.0, 60.0, 70.0]), 0.1).is_none());
    }

    #[test]
    fn test_ratings() {
        assert_eq!(rating(MetricType::CpuTemp, 55.0), "excellent");
        assert_eq!(rating(MetricType::GpuTemp, 80.0), "fair");
        assert_eq!(rating(MetricType::MemoryUsage, 75.0), "good");
        assert_eq!(rating(MetricType::CpuUsage, 95.0), "poor");
        assert_eq!(rating(MetricType::FanSpeed, 1200.0), "normal");
    }

    #[test]
    fn test_overall_rating() {
        assert_eq!(overall_rating(["excellent", "good"]), "excellent");
        assert_eq!(overall_rating(["good", "fair"]), "good");
        assert_eq!(overall_rating(["poor", "fair"]), "fair");
        assert_eq!(overall_rating(["poor"]), "poor");
        assert_eq!(overall_rating(Vec::<&str>::new()), "normal");
    }

    #[test]
    fn test_overview_sections_share_one_analysis() {
        let day = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let mut temps = vec![55.0; 40];
        temps[30] = 96.0;
        let loaded = vec![
            series(MetricType::CpuTemp, &temps),
            series(MetricType::CpuUsage, &[20.0; 40]),
            series(MetricType::FanSpeed, &[1200.0; 40]),
        ];

        let body = overview_body(&AppConfig::default(), None, &loaded, day, day, 1);

        let total = body["health_summary"]["total_insights"].as_u64().unwrap();
        assert!(total > 0);
        assert_eq!(body["recent_insights"]["total_insights"], json!(total));
        assert_eq!(body["health_summary"]["overall_health"], json!("critical"));
        assert_eq!(
            body["recent_insights"]["insights"][0]["level"],
            json!("critical")
        );

        let metrics = body["overview"]["metrics"].as_object().unwrap();
        assert!(metrics.contains_key("cpu_temperature"));
        assert!(metrics.contains_key("cpu_usage"));
        assert!(!metrics.contains_key("fan_speed"));
        assert_eq!(body["overview"]["data_points"], json!(80));
        assert_eq!(body["period"]["days"], json!(1));
    }

    #[test]
    fn test_health_status_groups_components() {
        let day = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let period = Period::from_dates(day, day);
        let insights = vec![
            new_insight("hot", "", InsightLevel::Critical, MetricType::CpuTemp, "CPU Package", period),
            new_insight("ok", "", InsightLevel::Success, MetricType::GpuTemp, "GPU Core", period),
        ];

        let status = health_status_for(insights, period);
        assert_eq!(status.overall_health, "critical");
        assert_eq!(status.cpu_health, "critical");
        assert_eq!(status.gpu_health, "good");
        assert_eq!(status.system_health, "normal");
        assert_eq!(status.alerts.len(), 1);
    }
}
