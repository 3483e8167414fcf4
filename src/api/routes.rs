use axum::{
    http::{HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::ServerConfig;

use super::handlers::{health_check, track, AppState};
use super::stats::{get_stats, run_aggregation};

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    if config.allowed_origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    layer.allow_origin(origins)
}

pub fn create_api_router(state: AppState, config: &ServerConfig) -> Router {
    let api_routes = Router::new()
        .route("/track", post(track))
        .route("/stats/{tracking_id}", get(get_stats))
        .route("/stats/{tracking_id}/aggregate", post(run_aggregation))
        .with_state(state);

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_routes)
        .layer(cors_layer(config))
        .layer(TraceLayer::new_for_http())
}
