//! Validation, tenant checks, classification and persistence of reported
//! interactions.

pub mod report;

pub use report::{RawReport, ValidReport, MAX_ID_LEN};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::classifier::{self, ClassificationResult};
use crate::config::IngestionConfig;
use crate::error::{bounded, PipelineError, PipelineResult};
use crate::models::{EventGeo, EventType, NewEvent};
use crate::storage::{EventStore, Reservation, Stores, TrackingScope};

/// What the transport knows about a report beyond its body
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Geo attributes resolved from the client address
    pub geo: EventGeo,
    /// Raw transport-level identifying bytes (an HTTP `User-Agent` header),
    /// used when the body carries no identifying string. Need not be UTF-8.
    pub identifying_bytes: Option<Vec<u8>>,
}

/// Acknowledgement of a persisted event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResult {
    pub event_id: i64,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    /// Classification computed for this report, whether or not it was stored
    pub classification: ClassificationResult,
}

/// Stateless per call: every invocation only touches its own event row and
/// its tenant's atomic usage counter.
#[derive(Clone)]
pub struct IngestionService {
    events: Arc<dyn EventStore>,
    scope: Arc<dyn TrackingScope>,
    storage_timeout: Duration,
}

impl IngestionService {
    pub fn new(stores: &Stores, config: &IngestionConfig) -> Self {
        Self {
            events: stores.events.clone(),
            scope: stores.scope.clone(),
            storage_timeout: Duration::from_millis(config.storage_timeout_ms),
        }
    }

    pub async fn ingest(
        &self,
        report: RawReport,
        context: RequestContext,
    ) -> PipelineResult<IngestResult> {
        self.ingest_at(report, context, Utc::now()).await
    }

    /// `ingest` with an explicit receive time
    pub async fn ingest_at(
        &self,
        report: RawReport,
        context: RequestContext,
        received_at: DateTime<Utc>,
    ) -> PipelineResult<IngestResult> {
        let report = report.validate(received_at)?;
        let tracking_id = report.tracking_id.clone();

        match bounded(
            self.storage_timeout,
            self.scope.reserve_event(&tracking_id, received_at),
        )
        .await?
        {
            Reservation::Reserved => {}
            Reservation::UnknownTenant => {
                debug!("Rejected report for unknown tracking id {}", tracking_id);
                return Err(PipelineError::UnknownTenant(tracking_id));
            }
            Reservation::OverQuota => {
                warn!("Tracking id {} is over its monthly quota, dropping event", tracking_id);
                return Err(PipelineError::QuotaExceeded(tracking_id));
            }
        }

        let (event, classification) = build_event(report, context, received_at);
        let event_type = event.event_type();
        let timestamp = event.timestamp;

        match bounded(self.storage_timeout, self.events.insert_event(&event)).await {
            Ok(event_id) => {
                debug!(
                    "Recorded {} event {} for {} (session {})",
                    event_type, event_id, tracking_id, event.session_id
                );
                Ok(IngestResult {
                    event_id,
                    event_type,
                    timestamp,
                    classification,
                })
            }
            Err(e) => {
                warn!("Failed to record event for {}: {}", tracking_id, e);
                if let Err(release) =
                    bounded(self.storage_timeout, self.scope.release_event(&tracking_id)).await
                {
                    warn!("Failed to release quota reservation for {}: {}", tracking_id, release);
                }
                Err(e)
            }
        }
    }
}

/// Classify as needed and assemble the event to persist.
///
/// `ai_bot_detected` events are always classified server-side and store the
/// result, even when nothing is detected. Other types store none; the
/// caller's classification is echoed back when supplied, otherwise the
/// server computes one for the acknowledgement.
fn build_event(
    report: ValidReport,
    context: RequestContext,
    received_at: DateTime<Utc>,
) -> (NewEvent, ClassificationResult) {
    let event_type = report.event_type();
    let identifying = report
        .identifying_string
        .map(String::into_bytes)
        .or(context.identifying_bytes)
        .unwrap_or_default();

    let classification = match (event_type, report.caller_classification) {
        (EventType::AiBotDetected, _) | (_, None) => classifier::classify_bytes(&identifying),
        (_, Some(supplied)) => supplied,
    };
    let stored = (event_type == EventType::AiBotDetected).then(|| classification.clone());

    let mut geo = context.geo;
    if geo.country.is_none() {
        geo.country = report.country;
    }
    if geo.city.is_none() {
        geo.city = report.city;
    }

    let event = NewEvent {
        tracking_id: report.tracking_id,
        session_id: report.session_id,
        url: report.url,
        identifying_string: String::from_utf8_lossy(&identifying).into_owned(),
        payload: report.payload,
        client_info: report.client_info,
        timestamp: report.timestamp,
        received_at,
        classification: stored,
        geo,
    };

    (event, classification)
}
