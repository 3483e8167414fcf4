//! Ingestion service tests against an in-memory SQLite store

use aipixel::config::IngestionConfig;
use aipixel::error::{ErrorKind, PipelineError};
use aipixel::ingest::{IngestionService, RawReport, RequestContext};
use aipixel::models::{Event, EventGeo, EventPayload, EventType, NewEvent, PageUnload, Plan, Tenant};
use aipixel::storage::{EventStore, SqliteStorage, Storage, Stores};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde_json::json;
use std::sync::Arc;

async fn setup(quota: i64) -> (Stores, IngestionService) {
    let storage = SqliteStorage::new("sqlite::memory:", 1).await.unwrap();
    storage.init().await.unwrap();
    let stores = Stores::new(Arc::new(storage));

    let mut tenant = Tenant::new("T1", "Test Site", Plan::Free, Utc::now());
    tenant.events_per_month = quota;
    stores.scope.upsert_tenant(&tenant).await.unwrap();

    let service = IngestionService::new(&stores, &IngestionConfig::default());
    (stores, service)
}

fn report(body: serde_json::Value) -> RawReport {
    serde_json::from_value(body).unwrap()
}

#[tokio::test]
async fn test_page_view_is_persisted() {
    let (stores, service) = setup(100).await;

    let result = service
        .ingest(
            report(json!({
                "type": "page_view",
                "trackingId": "T1",
                "sessionId": "S1",
                "url": "https://example.com/",
                "userAgent": "Mozilla/5.0 (Windows NT 10.0)",
                "data": { "title": "Home", "viewport": { "width": 1280, "height": 720 } }
            })),
            RequestContext {
                geo: EventGeo {
                    country: Some("US".to_string()),
                    ..Default::default()
                },
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(result.event_id > 0);
    assert_eq!(result.event_type, EventType::PageView);
    assert!(!result.classification.detected);

    let events = stores
        .events
        .events_in_range(
            "T1",
            result.timestamp - TimeDelta::seconds(1),
            result.timestamp + TimeDelta::seconds(1),
        )
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].url.as_deref(), Some("https://example.com/"));
    assert_eq!(events[0].geo.country.as_deref(), Some("US"));
    assert!(events[0].classification.is_none());

    let tenant = stores.scope.get_tenant("T1").await.unwrap().unwrap();
    assert_eq!(tenant.events_this_month, 1);
}

#[tokio::test]
async fn test_bot_event_stores_server_classification() {
    let (stores, service) = setup(100).await;

    let result = service
        .ingest(
            report(json!({
                "type": "ai_bot_detected",
                "trackingId": "T1",
                "sessionId": "S1",
                "identifyingString": "Mozilla/5.0 (compatible; ClaudeBot/1.0)",
                "data": { "name": "Something else" }
            })),
            RequestContext::default(),
        )
        .await
        .unwrap();

    assert_eq!(result.classification.matched_name.as_deref(), Some("ClaudeBot"));
    assert_eq!(result.classification.description.as_deref(), Some("Anthropic Claude"));

    let events = stores
        .events
        .events_of_type_in_range("T1", EventType::AiBotDetected, DateTime::<Utc>::MIN_UTC, DateTime::<Utc>::MAX_UTC)
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
    assert!(events[0].is_detected_bot());
}

#[tokio::test]
async fn test_undetected_bot_event_is_still_recorded() {
    let (stores, service) = setup(100).await;

    service
        .ingest(
            report(json!({
                "type": "ai_bot_detected", "trackingId": "T1", "sessionId": "S1",
                "identifyingString": "Mozilla/5.0 (Windows NT 10.0)"
            })),
            RequestContext::default(),
        )
        .await
        .unwrap();

    assert_eq!(stores.events.count_events("T1").await.unwrap(), 1);
}

#[tokio::test]
async fn test_page_unload_from_browser_snippet_is_stored() {
    let (stores, service) = setup(100).await;

    for (data, expected) in [
        (json!({ "timeOnPage": 1500, "scrollDepth": 40 }), Some(40)),
        (json!({ "timeOnPage": 200, "scrollDepth": -1 }), Some(0)),
    ] {
        service
            .ingest(
                report(json!({
                    "type": "page_unload",
                    "trackingId": "T1",
                    "sessionId": "S1",
                    "url": "https://example.com/article",
                    "data": data
                })),
                RequestContext::default(),
            )
            .await
            .unwrap();

        let events = stores
            .events
            .events_of_type_in_range("T1", EventType::PageUnload, DateTime::<Utc>::MIN_UTC, DateTime::<Utc>::MAX_UTC)
            .await
            .unwrap();
        match &events.last().unwrap().payload {
            EventPayload::PageUnload(PageUnload { scroll_depth, .. }) => assert_eq!(*scroll_depth, expected),
            other => panic!("unexpected payload {:?}", other),
        }
    }

    let events = stores
        .events
        .events_of_type_in_range("T1", EventType::PageUnload, DateTime::<Utc>::MIN_UTC, DateTime::<Utc>::MAX_UTC)
        .await
        .unwrap();
    assert_eq!(events.len(), 2);
    let first = events
        .iter()
        .find(|e| matches!(e.payload, EventPayload::PageUnload(PageUnload { time_on_page_ms: Some(1500), .. })));
    assert!(first.is_some(), "timeOnPage is kept");
}

#[tokio::test]
async fn test_invalid_type_creates_nothing() {
    let (stores, service) = setup(100).await;

    let err = service
        .ingest(
            report(json!({ "type": "not_a_real_type", "trackingId": "T1", "sessionId": "S1" })),
            RequestContext::default(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(err.field(), Some("type"));
    assert_eq!(stores.events.count_events("T1").await.unwrap(), 0);
    let tenant = stores.scope.get_tenant("T1").await.unwrap().unwrap();
    assert_eq!(tenant.events_this_month, 0, "rejected reports consume no quota");
}

#[tokio::test]
async fn test_unknown_tenant_is_rejected() {
    let (stores, service) = setup(100).await;

    let err = service
        .ingest(
            report(json!({ "type": "page_view", "trackingId": "nope", "sessionId": "S1" })),
            RequestContext::default(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::UnknownTenant(ref id) if id == "nope"));
    assert!(!err.is_retryable());
    assert_eq!(stores.events.count_events("nope").await.unwrap(), 0);
}

#[tokio::test]
async fn test_quota_exhaustion_drops_events() {
    let (stores, service) = setup(2).await;

    for _ in 0..2 {
        service
            .ingest(
                report(json!({ "type": "custom", "trackingId": "T1", "sessionId": "S1" })),
                RequestContext::default(),
            )
            .await
            .unwrap();
    }

    let err = service
        .ingest(
            report(json!({ "type": "custom", "trackingId": "T1", "sessionId": "S1" })),
            RequestContext::default(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::QuotaExceeded);
    assert_eq!(stores.events.count_events("T1").await.unwrap(), 2);
}

#[tokio::test]
async fn test_concurrent_sessions_are_independent() {
    let (stores, service) = setup(1_000).await;

    let mut handles = vec![];
    for i in 0..20 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            service
                .ingest(
                    report(json!({
                        "type": "page_view",
                        "trackingId": "T1",
                        "sessionId": format!("S{}", i % 4),
                        "url": format!("https://example.com/{}", i)
                    })),
                    RequestContext::default(),
                )
                .await
        }));
    }

    let mut ids = vec![];
    for handle in handles {
        ids.push(handle.await.unwrap().unwrap().event_id);
    }
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 20);

    assert_eq!(stores.events.count_events("T1").await.unwrap(), 20);
    let tenant = stores.scope.get_tenant("T1").await.unwrap().unwrap();
    assert_eq!(tenant.events_this_month, 20);
}

/// An event store whose writes always fail
struct BrokenEvents;

#[async_trait]
impl EventStore for BrokenEvents {
    async fn insert_event(&self, _event: &NewEvent) -> Result<i64> {
        anyhow::bail!("disk full")
    }

    async fn events_in_range(
        &self,
        _tracking_id: &str,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<Vec<Event>> {
        Ok(vec![])
    }

    async fn events_of_type_in_range(
        &self,
        _tracking_id: &str,
        _event_type: EventType,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<Vec<Event>> {
        Ok(vec![])
    }

    async fn count_events(&self, _tracking_id: &str) -> Result<i64> {
        Ok(0)
    }
}

#[tokio::test]
async fn test_failed_persist_refunds_quota() {
    let (stores, _) = setup(100).await;
    let broken = Stores {
        events: Arc::new(BrokenEvents),
        ..stores.clone()
    };
    let service = IngestionService::new(&broken, &IngestionConfig::default());

    let err = service
        .ingest(
            report(json!({ "type": "page_view", "trackingId": "T1", "sessionId": "S1" })),
            RequestContext::default(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::StorageUnavailable);
    assert!(err.is_retryable());
    let tenant = stores.scope.get_tenant("T1").await.unwrap().unwrap();
    assert_eq!(tenant.events_this_month, 0);
}
