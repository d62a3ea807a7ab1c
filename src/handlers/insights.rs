use super::{analyze_range, blocking, period_json, recent_range, AppState, Params};
use crate::error::{ApiError, ApiResult};
use crate::models::config::AppConfig;
use crate::models::metrics::{Insight, InsightCounts, InsightLevel, Period};
use crate::services::insights::health_summary;
use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use serde_json::{json, Value};
use std::cmp::Reverse;
use std::collections::HashSet;

/// Insights returned by `recent`.
const RECENT_LIMIT: usize = 10;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/analyze", get(analyze))
        .route("/health-summary", get(get_health_summary))
        .route("/recent", get(recent))
        .route("/by-level", get(by_level))
        .route("/by-metric", get(by_metric))
        .route("/recommendations", get(recommendations))
}

async fn analyze(
    State(state): State<AppState>,
    Query(query): Query<Vec<(String, String)>>,
) -> ApiResult<Json<Value>> {
    let (start, end) = Params::from(query).date_range()?;
    let config = state.config.clone();
    let insights = blocking(move || analyze_range(&config, start, end)).await?;

    let counts = InsightCounts::tally(&insights);
    Ok(Json(json!({
        "summary": {
            "total_insights": insights.len(),
            "critical_count": counts.critical,
            "warning_count": counts.warning,
            "info_count": counts.info,
            "success_count": counts.success,
            "period": period_json(start, end),
        },
        "insights": insights,
    })))
}

async fn get_health_summary(
    State(state): State<AppState>,
    Query(query): Query<Vec<(String, String)>>,
) -> ApiResult<Json<Value>> {
    let (start, end) = Params::from(query).date_range()?;
    let config = state.config.clone();
    let insights = blocking(move || analyze_range(&config, start, end)).await?;

    let summary = health_summary(&insights, Period::from_dates(start, end));
    Ok(Json(json!(summary)))
}

async fn recent(
    State(state): State<AppState>,
    Query(query): Query<Vec<(String, String)>>,
) -> ApiResult<Json<Value>> {
    let days = Params::from(query).days()?;
    let config = state.config.clone();
    let recent = blocking(move || recent_insights(&config, days)).await?;
    Ok(Json(recent))
}

/// Most urgent insights of the last `days`, newest first within a level.
pub fn recent_insights(config: &AppConfig, days: u32) -> ApiResult<Value> {
    let (start, end) = recent_range(days);
    let insights = analyze_range(config, start, end)?;
    Ok(recent_body(insights, start, end, days))
}

/// Ranks `insights` and keeps the top entries.
pub fn recent_body(
    mut insights: Vec<Insight>,
    start: NaiveDate,
    end: NaiveDate,
    days: u32,
) -> Value {
    let total = insights.len();
    rank_insights(&mut insights);
    insights.truncate(RECENT_LIMIT);

    let mut period = period_json(start, end);
    period["days"] = json!(days);

    json!({
        "insights": insights,
        "period": period,
        "total_insights": total,
        "showing": insights.len(),
    })
}

fn rank_insights(insights: &mut [Insight]) {
    insights.sort_by_key(|i| (i.level.rank(), Reverse(i.timestamp)));
}

async fn by_level(
    State(state): State<AppState>,
    Query(query): Query<Vec<(String, String)>>,
) -> ApiResult<Json<Value>> {
    let params = Params::from(query);
    let level: InsightLevel = params
        .get("level")
        .ok_or_else(|| ApiError::BadRequest("missing query parameter 'level'".to_string()))?
        .parse()
        .map_err(ApiError::BadRequest)?;
    let (start, end) = params.date_range()?;

    let config = state.config.clone();
    let insights = blocking(move || analyze_range(&config, start, end)).await?;
    let filtered: Vec<Insight> = insights.into_iter().filter(|i| i.level == level).collect();

    Ok(Json(json!({
        "insights": filtered,
        "level": level,
        "period": period_json(start, end),
        "count": filtered.len(),
    })))
}

async fn by_metric(
    State(state): State<AppState>,
    Query(query): Query<Vec<(String, String)>>,
) -> ApiResult<Json<Value>> {
    let params = Params::from(query);
    let metric = params.metric_type()?;
    let (start, end) = params.date_range()?;

    let config = state.config.clone();
    let insights = blocking(move || analyze_range(&config, start, end)).await?;
    let filtered: Vec<Insight> = insights
        .into_iter()
        .filter(|i| i.metric_type == metric)
        .collect();

    Ok(Json(json!({
        "insights": filtered,
        "metric_type": metric,
        "period": period_json(start, end),
        "count": filtered.len(),
    })))
}

async fn recommendations(
    State(state): State<AppState>,
    Query(query): Query<Vec<(String, String)>>,
) -> ApiResult<Json<Value>> {
    let (start, end) = Params::from(query).date_range()?;
    let config = state.config.clone();
    let insights = blocking(move || analyze_range(&config, start, end)).await?;

    let unique = unique_recommendations(&insights);
    Ok(Json(json!({
        "recommendations": unique,
        "period": period_json(start, end),
        "total_recommendations": unique.len(),
        "insights_analyzed": insights.len(),
    })))
}

/// One entry per distinct recommendation text, in first-seen order.
fn unique_recommendations(insights: &[Insight]) -> Vec<Value> {
    let mut seen = HashSet::new();
    insights
        .iter()
        .flat_map(|insight| {
            insight
                .recommendations
                .iter()
                .map(move |rec| (insight, rec))
        })
        .filter(|(_, rec)| seen.insert(rec.as_str()))
        .map(|(insight, rec)| {
            json!({
                "recommendation": rec,
                "insight_title": insight.title,
                "insight_level": insight.level,
                "metric_type": insight.metric_type,
                "component": insight.component,
            })
        })
        .collect()
}
