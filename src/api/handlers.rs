use axum::{
    body::Bytes,
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::aggregation::AggregationEngine;
use crate::error::{ErrorKind, PipelineError};
use crate::geo::GeoResolver;
use crate::ingest::{IngestResult, IngestionService, RawReport, RequestContext};

#[derive(Clone)]
pub struct AppState {
    pub ingestion: IngestionService,
    pub engine: AggregationEngine,
    pub geo: Arc<GeoResolver>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<&'static str>,
    /// Where a partial aggregation should be resumed
    #[serde(rename = "resumeFrom", skip_serializing_if = "Option::is_none")]
    pub resume_from: Option<DateTime<Utc>>,
}

/// A `PipelineError` rendered as an HTTP response
#[derive(Debug)]
pub struct ApiError(pub PipelineError);

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        ApiError(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0.kind() {
            ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorKind::UnknownTenant => StatusCode::NOT_FOUND,
            ErrorKind::QuotaExceeded => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::StorageUnavailable | ErrorKind::AggregationPartial => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self.0);
        }

        let resume_from = match &self.0 {
            PipelineError::AggregationPartial { resume_from, .. } => Some(*resume_from),
            _ => None,
        };

        let body = ErrorResponse {
            error: self.0.to_string(),
            kind: self.0.kind(),
            field: self.0.field(),
            resume_from,
        };

        (status, Json(body)).into_response()
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub version: &'static str,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Accept one reported interaction.
///
/// The body is parsed as JSON whatever its declared content type, since
/// beacon-style producers send `text/plain` blobs.
pub async fn track(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<IngestResult>), ApiError> {
    let report: RawReport = serde_json::from_slice(&body)
        .map_err(|e| PipelineError::invalid("body", format!("malformed JSON: {e}")))?;

    let context = RequestContext {
        geo: state.geo.resolve(&headers, addr.ip()),
        identifying_bytes: headers.get(header::USER_AGENT).map(|v| v.as_bytes().to_vec()),
    };

    let result = state.ingestion.ingest(report, context).await?;
    Ok((StatusCode::ACCEPTED, Json(result)))
}
