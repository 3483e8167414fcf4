//! Tracker SDK delivering to a live collector on an ephemeral port

use aipixel::aggregation::AggregationEngine;
use aipixel::api::{create_api_router, AppState};
use aipixel::config::{AggregationConfig, AnalyticsConfig, IngestionConfig, ServerConfig};
use aipixel::geo::GeoResolver;
use aipixel::ingest::IngestionService;
use aipixel::models::{EventPayload, EventType, Plan, Tenant};
use aipixel::storage::{SqliteStorage, Storage, Stores};
use aipixel::tracker::{PageContext, Tracker, TrackerConfig, TrackerError};
use chrono::Utc;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

async fn start_collector() -> (String, Stores) {
    let storage = SqliteStorage::new("sqlite::memory:", 1).await.unwrap();
    storage.init().await.unwrap();
    let stores = Stores::new(Arc::new(storage));
    stores
        .scope
        .upsert_tenant(&Tenant::new("T1", "Test Site", Plan::Pro, Utc::now()))
        .await
        .unwrap();

    let state = AppState {
        ingestion: IngestionService::new(&stores, &IngestionConfig::default()),
        engine: AggregationEngine::new(&stores, &AggregationConfig::default()),
        geo: Arc::new(GeoResolver::new(AnalyticsConfig::default(), None)),
    };
    let config = ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        allowed_origins: vec![],
    };
    let router = create_api_router(state, &config);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    (format!("http://{}/api/track", addr), stores)
}

fn page(identifying: &str) -> PageContext {
    PageContext::new("https://example.com/", identifying)
}

async fn wait_for_events(stores: &Stores, tracking_id: &str, expected: i64) -> i64 {
    let mut count = 0;
    for _ in 0..50 {
        count = stores.events.count_events(tracking_id).await.unwrap();
        if count >= expected {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    count
}

#[tokio::test]
async fn test_auto_start_reports_bot_and_page_view() {
    let (endpoint, stores) = start_collector().await;

    let tracker = Tracker::new(
        TrackerConfig::new("T1").with_endpoint(endpoint).with_debug(true),
        page("Mozilla/5.0 (compatible; PerplexityBot/1.0)"),
    )
    .unwrap();

    assert_eq!(wait_for_events(&stores, "T1", 2).await, 2);

    let reported = tracker.events();
    assert_eq!(reported.len(), 2);
    assert_eq!(reported[0].event_type.as_deref(), Some("ai_bot_detected"));
    assert_eq!(reported[1].event_type.as_deref(), Some("page_view"));
}

#[tokio::test]
async fn test_track_and_wait_returns_ack() {
    let (endpoint, stores) = start_collector().await;

    let tracker = Tracker::new(
        TrackerConfig::new("T1")
            .with_endpoint(endpoint)
            .with_auto_start(false),
        page("Mozilla/5.0 (Windows NT 10.0)"),
    )
    .unwrap();

    let mut data = serde_json::Map::new();
    data.insert("plan".to_string(), serde_json::json!("pro"));
    let ack = tracker.track_and_wait(EventPayload::Custom(data)).await.unwrap();

    assert!(ack.event_id > 0);
    assert_eq!(ack.event_type, EventType::Custom);
    assert!(!ack.classification.detected);
    assert_eq!(stores.events.count_events("T1").await.unwrap(), 1);
}

#[tokio::test]
async fn test_rejections_surface_on_awaited_path() {
    let (endpoint, stores) = start_collector().await;

    let tracker = Tracker::new(
        TrackerConfig::new("unknown-site")
            .with_endpoint(endpoint)
            .with_auto_start(false),
        page("Mozilla/5.0"),
    )
    .unwrap();

    let err = tracker
        .track_and_wait(EventPayload::Custom(serde_json::Map::new()))
        .await
        .unwrap_err();
    match err {
        TrackerError::Rejected { status, body } => {
            assert_eq!(status, 404);
            assert!(body.contains("unknown_tenant"));
        }
        other => panic!("expected rejection, got {:?}", other),
    }
    assert_eq!(stores.events.count_events("unknown-site").await.unwrap(), 0);
}
