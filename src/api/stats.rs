//! Dashboard reads and on-demand aggregation

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::models::{Granularity, StatsRecord};

use super::handlers::{ApiError, AppState};

/// Window read when `from` is omitted
const DEFAULT_LOOKBACK_DAYS: i64 = 30;

#[derive(Debug, Deserialize)]
pub struct StatsQueryParams {
    /// hourly, daily (default), weekly or monthly
    pub granularity: Option<String>,

    /// RFC 3339 start, inclusive
    pub from: Option<String>,

    /// RFC 3339 end, exclusive (default: now)
    pub to: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AggregateRequest {
    pub granularity: String,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub tracking_id: String,
    pub granularity: Granularity,
    pub records: Vec<StatsRecord>,
    pub total: usize,
}

fn parse_granularity(raw: Option<&str>) -> Result<Granularity, PipelineError> {
    raw.map(str::parse).unwrap_or(Ok(Granularity::Daily))
}

fn parse_bound(raw: Option<&str>, field: &'static str) -> Result<Option<DateTime<Utc>>, PipelineError> {
    raw.map(|value| {
        DateTime::parse_from_rfc3339(value.trim())
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|e| PipelineError::invalid(field, format!("not an RFC 3339 instant: {e}")))
    })
    .transpose()
}

/// Stored stats records of a tracking id
pub async fn get_stats(
    State(state): State<AppState>,
    Path(tracking_id): Path<String>,
    Query(params): Query<StatsQueryParams>,
) -> Result<Json<StatsResponse>, ApiError> {
    let granularity = parse_granularity(params.granularity.as_deref())?;
    let to = parse_bound(params.to.as_deref(), "to")?.unwrap_or_else(Utc::now);
    let from = parse_bound(params.from.as_deref(), "from")?
        .unwrap_or_else(|| to - TimeDelta::days(DEFAULT_LOOKBACK_DAYS));

    let records = state.engine.stats(&tracking_id, granularity, from, to).await?;
    let total = records.len();

    Ok(Json(StatsResponse {
        tracking_id,
        granularity,
        records,
        total,
    }))
}

/// Recompute the stats of a window now
pub async fn run_aggregation(
    State(state): State<AppState>,
    Path(tracking_id): Path<String>,
    body: Bytes,
) -> Result<Json<StatsResponse>, ApiError> {
    let request: AggregateRequest = serde_json::from_slice(&body)
        .map_err(|e| PipelineError::invalid("body", format!("malformed JSON: {e}")))?;
    let granularity = parse_granularity(Some(&request.granularity))?;

    tracing::info!(
        "On-demand {} aggregation for {} from {} to {}",
        granularity,
        tracking_id,
        request.from,
        request.to
    );

    let records = state
        .engine
        .aggregate(&tracking_id, request.from, request.to, granularity)
        .await?;
    let total = records.len();

    Ok(Json(StatsResponse {
        tracking_id,
        granularity,
        records,
        total,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_parse_bound() {
        assert_eq!(parse_bound(None, "from").unwrap(), None);

        let parsed = parse_bound(Some("2024-03-15T10:00:00+02:00"), "from").unwrap().unwrap();
        assert_eq!(parsed.to_rfc3339(), "2024-03-15T08:00:00+00:00");

        let err = parse_bound(Some("yesterday"), "to").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(err.field(), Some("to"));
    }
}
