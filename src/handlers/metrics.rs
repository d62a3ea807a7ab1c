use super::{blocking, period_json, recent_range, AppState, Params};
use crate::error::{ApiError, ApiResult};
use crate::models::config::AppConfig;
use crate::models::metrics::{MetricSeries, MetricType};
use crate::services::data_processor::DataProcessor;
use crate::services::stats;
use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use serde_json::{json, Map, Value};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/available-dates", get(available_dates))
        .route("/time-series", get(time_series))
        .route("/statistics", get(statistics))
        .route("/system-info", get(system_info))
        .route("/quick-overview", get(quick_overview))
        .route("/metric-types", get(metric_types))
}

async fn available_dates(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let config = state.config.clone();
    let dates = blocking(move || Ok(DataProcessor::new(config.data.clone())?.available_dates()?)).await?;

    let fmt = |d: &NaiveDate| d.format("%Y-%m-%d").to_string();
    Ok(Json(json!({
        "dates": dates.iter().map(fmt).collect::<Vec<_>>(),
        "count": dates.len(),
        "date_range": {
            "start": dates.first().map(fmt),
            "end": dates.last().map(fmt),
        },
    })))
}

async fn time_series(
    State(state): State<AppState>,
    Query(query): Query<Vec<(String, String)>>,
) -> ApiResult<Json<Value>> {
    let params = Params::from(query);
    let (start, end) = params.date_range()?;
    let metric_types = params.metric_types()?;

    let config = state.config.clone();
    let series = blocking(move || {
        let processor = DataProcessor::new(config.data.clone())?;
        Ok(processor.metrics_for_period(start, end, &metric_types)?)
    })
    .await?;

    let total_records: usize = series.iter().map(MetricSeries::len).sum();
    let max_points = state.config.data.max_points_per_series;
    let data: Vec<MetricSeries> = series.iter().map(|s| s.downsample(max_points)).collect();

    Ok(Json(json!({
        "data": data,
        "time_range": "custom",
        "total_records": total_records,
        "period": period_json(start, end),
    })))
}

async fn statistics(
    State(state): State<AppState>,
    Query(query): Query<Vec<(String, String)>>,
) -> ApiResult<Json<Value>> {
    let params = Params::from(query);
    let (start, end) = params.date_range()?;
    let metric = params.metric_type()?;

    let config = state.config.clone();
    let stats = blocking(move || {
        Ok(DataProcessor::new(config.data.clone())?.statistics(start, end, metric)?)
    })
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("No data found for {}", metric)))?;

    Ok(Json(json!({
        "metric_type": metric,
        "period": period_json(start, end),
        "statistics": stats,
    })))
}

async fn system_info(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let config = state.config.clone();
    let info = blocking(move || Ok(DataProcessor::new(config.data.clone())?.system_info()?))
        .await?
        .ok_or_else(|| ApiError::NotFound("No system information found".to_string()))?;
    Ok(Json(json!(info)))
}

async fn quick_overview(
    State(state): State<AppState>,
    Query(query): Query<Vec<(String, String)>>,
) -> ApiResult<Json<Value>> {
    let days = Params::from(query).days()?;
    let config = state.config.clone();
    let overview = blocking(move || overview_for_days(&config, days)).await?;
    Ok(Json(overview))
}

/// Current, average, max and min of the key metrics over the last `days`.
pub fn overview_for_days(config: &AppConfig, days: u32) -> ApiResult<Value> {
    let (start, end) = recent_range(days);
    let processor = DataProcessor::new(config.data.clone())?;
    let series = processor.metrics_for_period(start, end, &MetricType::KEY)?;
    Ok(quick_overview_body(&series, start, end, days))
}

/// Quick overview body from loaded series; metrics outside the key set are
/// ignored.
pub fn quick_overview_body(
    series: &[MetricSeries],
    start: NaiveDate,
    end: NaiveDate,
    days: u32,
) -> Value {
    let key: Vec<&MetricSeries> = series
        .iter()
        .filter(|s| MetricType::KEY.contains(&s.metric_type))
        .collect();

    let mut period = period_json(start, end);
    period["days"] = json!(days);

    json!({
        "period": period,
        "metrics": quick_stats(key.iter().copied()),
        "data_points": key.iter().map(|s| s.len()).sum::<usize>(),
    })
}

fn quick_stats<'b>(series: impl IntoIterator<Item = &'b MetricSeries>) -> Map<String, Value> {
    series
        .into_iter()
        .filter(|s| !s.is_empty())
        .map(|s| {
            let max = s.values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let min = s.values.iter().copied().fold(f64::INFINITY, f64::min);
            (
                s.metric_type.to_string(),
                json!({
                    "current": s.values.last(),
                    "average": stats::mean(&s.values),
                    "max": max,
                    "min": min,
                    "unit": s.unit,
                }),
            )
        })
        .collect()
}

async fn metric_types() -> Json<Value> {
    let types: Vec<Value> = MetricType::ALL
        .iter()
        .map(|m| {
            json!({
                "value": m.as_str(),
                "name": m.display_name(),
                "unit": m.unit(),
            })
        })
        .collect();
    Json(json!({ "metric_types": types }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_quick_stats() {
        let day = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let points = (0..4).map(|i| {
            (
                day.and_hms_opt(10, i, 0).unwrap(),
                [40.0, 60.0, 50.0, 30.0][i as usize],
            )
        });
        let series = MetricSeries::from_points(MetricType::CpuUsage, "CPU Total", points);

        let stats = quick_stats([&series]);
        let cpu = &stats["cpu_usage"];
        assert_eq!(cpu["current"], json!(30.0));
        assert_eq!(cpu["average"], json!(45.0));
        assert_eq!(cpu["max"], json!(60.0));
        assert_eq!(cpu["min"], json!(30.0));
        assert_eq!(cpu["unit"], json!("%"));
    }
}
