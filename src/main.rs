use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use aipixel::aggregation::{AggregationEngine, AggregationScheduler};
use aipixel::api::{self, AppState};
use aipixel::config::Config;
use aipixel::geo::GeoResolver;
use aipixel::ingest::IngestionService;
use aipixel::storage;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    info!("Loaded configuration");

    let stores = storage::connect(&config.database).await?;

    let geo = GeoResolver::from_config(&config.analytics).context("Failed to load GeoIP databases")?;
    let ingestion = IngestionService::new(&stores, &config.ingestion);
    let engine = AggregationEngine::new(&stores, &config.aggregation);

    let scheduler = if config.aggregation.enabled {
        info!(
            "Aggregation scheduler running every {}s for {:?}",
            config.aggregation.interval_secs, config.aggregation.granularities
        );
        Some(AggregationScheduler::start(
            engine.clone(),
            stores.scope.clone(),
            &config.aggregation,
        ))
    } else {
        info!("Aggregation scheduler disabled");
        None
    };

    let state = AppState {
        ingestion,
        engine,
        geo: Arc::new(geo),
    };
    let router = api::create_api_router(state, &config.api_server);

    let addr = format!("{}:{}", config.api_server.host, config.api_server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("🚀 API server listening on http://{}", addr);
    info!("   - Events accepted at http://{}/api/track", addr);

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    if let Some(scheduler) = scheduler {
        scheduler.stop().await;
    }

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
