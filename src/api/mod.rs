// HTTP API routes (raid listing, snapshots, action submission)

pub mod ws;

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::engine::{ActionEnvelope, RaidError, SessionRegistry};
use crate::metrics;

// ── Request types ─────────────────────────────────────────────────────

/// Body of `POST /api/actions`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequest {
    pub raid_id: Option<String>,
    pub player_id: String,
    pub action: Value,
}

// ── Shared application state ─────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
}

// ── Error helper ──────────────────────────────────────────────────────

fn json_error(status: StatusCode, msg: &str) -> impl IntoResponse {
    (status, Json(json!({ "error": msg })))
}

fn error_status(err: &RaidError) -> StatusCode {
    match err {
        RaidError::RaidNotFound(_) | RaidError::PlayerNotFound(_) => StatusCode::NOT_FOUND,
        RaidError::TooManyRaids(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::BAD_REQUEST,
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn router(registry: Arc<SessionRegistry>) -> Router {
    let state = AppState { registry };

    Router::new()
        // Raids
        .route("/api/raids", get(list_raids))
        .route("/api/raids/{id}", get(get_raid))
        // Actions
        .route("/api/actions", post(submit_action))
        // WebSocket
        .route("/ws/raid", get(ws::ws_raid))
        .with_state(state)
}

// ── Raid handlers ─────────────────────────────────────────────────────

async fn list_raids(State(state): State<AppState>) -> impl IntoResponse {
    let raids = state.registry.list().await;
    (StatusCode::OK, Json(json!(raids))).into_response()
}

async fn get_raid(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.registry.snapshot(&id).await {
        Ok(snapshot) => (StatusCode::OK, Json(json!(snapshot))).into_response(),
        Err(e) => json_error(error_status(&e), &e.to_string()).into_response(),
    }
}

// ── Action handler ────────────────────────────────────────────────────

/// Apply one action and return the events it produced. Rejections still
/// answer 200 with a failed `actionResult`; only malformed envelopes are 400.
///
/// The body's `playerId` is taken as given, so this endpoint is for trusted
/// callers (tests, tooling, a fronting service). Untrusted clients use
/// `/ws/raid`, where the identity is the connection id.
async fn submit_action(
    State(state): State<AppState>,
    Json(req): Json<ActionRequest>,
) -> impl IntoResponse {
    let action = match crate::engine::RaidAction::from_value(req.action) {
        Ok(action) => action,
        Err(e) => return json_error(error_status(&e), &e.to_string()).into_response(),
    };
    let envelope = ActionEnvelope {
        raid_id: req.raid_id,
        player_id: req.player_id,
        action,
    };
    let dispatched = state.registry.dispatch(envelope).await;
    (
        StatusCode::OK,
        Json(json!({
            "raidId": dispatched.raid_id,
            "events": dispatched.events,
        })),
    )
        .into_response()
}

// ── Metrics middleware ────────────────────────────────────────────────

/// Record request count and latency per normalized endpoint.
pub async fn track_requests(
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let method = req.method().to_string();
    let endpoint = metrics::normalize_path(req.uri().path());
    let started = std::time::Instant::now();
    let response = next.run(req).await;
    metrics::API_REQUEST_DURATION_SECONDS
        .with_label_values(&[endpoint.as_str()])
        .observe(started.elapsed().as_secs_f64());
    metrics::API_REQUESTS_TOTAL
        .with_label_values(&[
            method.as_str(),
            endpoint.as_str(),
            response.status().as_str(),
        ])
        .inc();
    response
}
