use axum::{routing::get, Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use tcg_raid_backend::api;
use tcg_raid_backend::config::Config;
use tcg_raid_backend::engine::SessionRegistry;
use tcg_raid_backend::metrics;

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok", "service": "tcg-raid-backend" }))
}

async fn metrics_handler() -> String {
    metrics::gather_metrics()
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = Config::load();
    metrics::register_metrics();

    let registry = Arc::new(SessionRegistry::new(config.registry_settings()));

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .merge(api::router(registry))
        .layer(CorsLayer::permissive())
        .layer(axum::middleware::from_fn(api::track_requests));

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| panic!("Failed to bind to {addr}: {e}"));

    tracing::info!(
        port = config.port,
        boss_turn_delay_ms = config.boss_turn_delay.as_millis() as u64,
        max_raids = config.max_raids,
        debug_default = config.debug_default,
        "Raid backend listening"
    );
    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
