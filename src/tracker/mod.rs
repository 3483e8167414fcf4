//! Producer SDK: builds interaction reports and delivers them to a
//! collector's `/api/track` endpoint.
//!
//! A `Tracker` is always constructed explicitly; nothing is started at
//! load time.

pub mod config;

pub use config::{PageContext, TrackerConfig, DEFAULT_ENDPOINT};

use chrono::{DateTime, SecondsFormat, Utc};
use rand::RngExt;
use serde::Deserialize;
use std::sync::{Mutex, PoisonError};
use std::time::Instant;
use thiserror::Error;
use tracing::debug;

use crate::classifier::{self, ClassificationResult};
use crate::ingest::RawReport;
use crate::models::{BotSighting, EventPayload, EventType, LinkClick, PageUnload, PageView};

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("tracking id is required")]
    MissingTrackingId,

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("collector rejected event ({status}): {body}")]
    Rejected { status: u16, body: String },
}

/// The collector's acknowledgement of a delivered event
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackAck {
    pub event_id: i64,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub classification: ClassificationResult,
}

const SESSION_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// `aip_` + 9 random base-36 characters + `_` + epoch milliseconds
pub fn generate_session_id() -> String {
    let mut rng = rand::rng();
    let random: String = (0..9)
        .map(|_| SESSION_ALPHABET[rng.random_range(0..SESSION_ALPHABET.len())] as char)
        .collect();
    format!("aip_{}_{}", random, Utc::now().timestamp_millis())
}

pub struct Tracker {
    config: TrackerConfig,
    page: PageContext,
    client: reqwest::Client,
    session_id: String,
    loaded_at: Instant,
    sent: Mutex<Vec<RawReport>>,
}

impl Tracker {
    /// Build a tracker for one page visit. With `auto_start` this also
    /// runs `start`, which needs a Tokio runtime to deliver.
    pub fn new(config: TrackerConfig, page: PageContext) -> Result<Self, TrackerError> {
        if config.tracking_id.trim().is_empty() {
            return Err(TrackerError::MissingTrackingId);
        }

        let tracker = Self {
            config,
            page,
            client: reqwest::Client::new(),
            session_id: generate_session_id(),
            loaded_at: Instant::now(),
            sent: Mutex::new(Vec::new()),
        };

        if tracker.config.auto_start {
            tracker.start();
        }

        Ok(tracker)
    }

    /// Self-classify, then record the page view
    pub fn start(&self) {
        self.detect_bot();
        self.track_page_view();
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Every report built so far, oldest first
    pub fn events(&self) -> Vec<RawReport> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Classify the host's own identifying string and, if it looks
    /// automated, report an `ai_bot_detected` sighting
    pub fn detect_bot(&self) -> Option<ClassificationResult> {
        let result = classifier::classify(&self.page.identifying_string);
        if !result.detected {
            return None;
        }

        if self.config.debug_enabled {
            debug!("AI agent detected: {:?}", result);
        }

        self.track(EventPayload::AiBotDetected(BotSighting {
            name: result.matched_name.clone(),
            description: result.description.clone(),
            pattern: result.pattern_used.clone(),
        }));

        Some(result)
    }

    pub fn track_page_view(&self) {
        self.track(EventPayload::PageView(PageView {
            title: self.page.title.clone(),
            referrer: self.page.referrer.clone(),
            viewport: self.page.viewport,
            screen: self.page.screen,
        }));
    }

    pub fn track_link_click(&self, click: LinkClick) {
        self.track(EventPayload::LinkClick(click));
    }

    /// Report leaving the page, with time since construction
    pub fn track_page_unload(&self, scroll_depth: Option<u8>) {
        let time_on_page_ms = u64::try_from(self.loaded_at.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.track(EventPayload::PageUnload(PageUnload {
            time_on_page_ms: Some(time_on_page_ms),
            scroll_depth: scroll_depth.map(|d| d.min(100)),
        }));
    }

    /// Send without waiting for the collector. Failures are only logged.
    pub fn track(&self, payload: EventPayload) {
        let report = self.report(payload);

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("No async runtime, dropping {:?} event", report.event_type);
            return;
        };

        let client = self.client.clone();
        let endpoint = self.config.endpoint.clone();
        let verbose = self.config.debug_enabled;
        runtime.spawn(async move {
            if let Err(e) = deliver(&client, &endpoint, &report).await {
                if verbose {
                    debug!("Failed to send event: {}", e);
                }
            }
        });
    }

    /// Send and wait for the collector's acknowledgement
    pub async fn track_and_wait(&self, payload: EventPayload) -> Result<TrackAck, TrackerError> {
        let report = self.report(payload);
        deliver(&self.client, &self.config.endpoint, &report).await
    }

    fn report(&self, payload: EventPayload) -> RawReport {
        let event_type = payload.event_type();
        let report = RawReport {
            tracking_id: Some(self.config.tracking_id.clone()),
            session_id: Some(self.session_id.clone()),
            event_type: Some(event_type.as_str().to_string()),
            url: self.page.url.clone(),
            identifying_string: Some(self.page.identifying_string.clone()),
            data: payload.data(),
            client_info: serde_json::to_value(&self.page.client_info).ok(),
            timestamp: Some(serde_json::Value::String(
                Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            )),
            ..Default::default()
        };

        if self.config.debug_enabled {
            debug!("Sending {} event for session {}", event_type, self.session_id);
        }

        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(report.clone());

        report
    }
}

async fn deliver(
    client: &reqwest::Client,
    endpoint: &str,
    report: &RawReport,
) -> Result<TrackAck, TrackerError> {
    let response = client.post(endpoint).json(report).send().await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(TrackerError::Rejected {
            status: status.as_u16(),
            body,
        });
    }

    Ok(response.json::<TrackAck>().await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(identifying: &str) -> Tracker {
        Tracker::new(
            TrackerConfig::new("T1")
                .with_endpoint("http://127.0.0.1:9/api/track")
                .with_auto_start(false),
            PageContext::new("https://example.com/", identifying),
        )
        .unwrap()
    }

    #[test]
    fn test_session_id_shape() {
        let id = generate_session_id();
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "aip");
        assert_eq!(parts[1].len(), 9);
        assert!(parts[1].bytes().all(|b| SESSION_ALPHABET.contains(&b)));
        assert!(parts[2].parse::<i64>().is_ok());
    }

    #[test]
    fn test_empty_tracking_id_is_rejected() {
        let result = Tracker::new(TrackerConfig::new("  "), PageContext::default());
        assert!(matches!(result, Err(TrackerError::MissingTrackingId)));
    }

    #[test]
    fn test_reports_carry_session_and_page() {
        let tracker = tracker("Mozilla/5.0");
        tracker.track_page_view();
        tracker.track_link_click(LinkClick {
            href: Some("https://example.com/a".to_string()),
            ..Default::default()
        });

        let events = tracker.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type.as_deref(), Some("page_view"));
        assert_eq!(events[1].event_type.as_deref(), Some("link_click"));
        for report in &events {
            assert_eq!(report.tracking_id.as_deref(), Some("T1"));
            assert_eq!(report.session_id.as_deref(), Some(tracker.session_id()));
            assert_eq!(report.url.as_deref(), Some("https://example.com/"));
        }
    }

    #[test]
    fn test_reports_validate_on_the_server_side() {
        let tracker = tracker("Mozilla/5.0");
        tracker.track_page_unload(Some(250));

        let report = tracker.events().remove(0);
        let valid = report.validate(Utc::now()).unwrap();
        assert_eq!(valid.event_type(), EventType::PageUnload);
    }

    #[test]
    fn test_detect_bot_reports_sighting() {
        let tracker = tracker("Mozilla/5.0 (compatible; GPTBot/1.0)");
        let result = tracker.detect_bot().unwrap();
        assert_eq!(result.matched_name.as_deref(), Some("GPTBot"));

        let events = tracker.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type.as_deref(), Some("ai_bot_detected"));
        assert_eq!(events[0].data["name"], "GPTBot");
    }

    #[test]
    fn test_human_host_reports_nothing() {
        let tracker = tracker("Mozilla/5.0 (Windows NT 10.0)");
        assert!(tracker.detect_bot().is_none());
        assert!(tracker.events().is_empty());
    }
}
