// Prometheus metrics definitions for the raid backend.

use lazy_static::lazy_static;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ── Gauges ───────────────────────────────────────────────────────

    /// Raid sessions currently held by the registry.
    pub static ref ACTIVE_RAIDS: IntGauge =
        IntGauge::new("raid_active_raids", "Raid sessions currently live").unwrap();

    /// Live WebSocket connections.
    pub static ref CONNECTED_WEBSOCKETS: IntGauge =
        IntGauge::new("raid_connected_websockets", "Live WebSocket connections").unwrap();

    // ── Counters ─────────────────────────────────────────────────────

    /// Total raids created.
    pub static ref RAIDS_CREATED_TOTAL: IntCounter =
        IntCounter::new("raid_raids_created_total", "Total raids created").unwrap();

    /// Total raids ended, by outcome (victory, defeat, abandoned).
    pub static ref RAIDS_ENDED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("raid_raids_ended_total", "Total raids ended"),
        &["outcome"],
    )
    .unwrap();

    /// Total actions routed, by action type and result (ok, rejected).
    pub static ref ACTIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("raid_actions_total", "Total actions routed"),
        &["action", "result"],
    )
    .unwrap();

    /// Total boss turns executed.
    pub static ref BOSS_TURNS_TOTAL: IntCounter =
        IntCounter::new("raid_boss_turns_total", "Total boss turns executed").unwrap();

    /// Total cards knocked out.
    pub static ref KNOCKOUTS_TOTAL: IntCounter =
        IntCounter::new("raid_knockouts_total", "Total cards knocked out").unwrap();

    /// Total cheer cards played, by card number.
    pub static ref CHEER_CARDS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("raid_cheer_cards_total", "Total cheer cards played"),
        &["card"],
    )
    .unwrap();

    /// Total API requests, by method/endpoint/status.
    pub static ref API_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("raid_api_requests_total", "Total API requests"),
        &["method", "endpoint", "status"],
    )
    .unwrap();

    /// Total WebSocket messages sent to clients.
    pub static ref WEBSOCKET_MESSAGES_SENT_TOTAL: IntCounter = IntCounter::new(
        "raid_websocket_messages_sent_total",
        "Total WebSocket messages sent",
    )
    .unwrap();

    // ── Histograms ───────────────────────────────────────────────────

    /// API request duration in seconds, by endpoint.
    pub static ref API_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "raid_api_request_duration_seconds",
            "API request duration in seconds",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]),
        &["endpoint"],
    )
    .unwrap();
}

/// Register all metrics with the custom registry. Call once at startup.
pub fn register_metrics() {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(ACTIVE_RAIDS.clone()),
        Box::new(CONNECTED_WEBSOCKETS.clone()),
        Box::new(RAIDS_CREATED_TOTAL.clone()),
        Box::new(RAIDS_ENDED_TOTAL.clone()),
        Box::new(ACTIONS_TOTAL.clone()),
        Box::new(BOSS_TURNS_TOTAL.clone()),
        Box::new(KNOCKOUTS_TOTAL.clone()),
        Box::new(CHEER_CARDS_TOTAL.clone()),
        Box::new(API_REQUESTS_TOTAL.clone()),
        Box::new(WEBSOCKET_MESSAGES_SENT_TOTAL.clone()),
        Box::new(API_REQUEST_DURATION_SECONDS.clone()),
    ];

    for c in collectors {
        // Already registered (tests call this more than once)
        if let Err(e) = REGISTRY.register(c) {
            tracing::debug!("metric registration skipped: {e}");
        }
    }
}

/// Serialize all registered metrics to the Prometheus text exposition format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {e}");
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Normalize a URL path for metric labels: replace raid id segments with `:id`
/// to prevent cardinality explosion.
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if uuid::Uuid::parse_str(segment).is_ok() || segment.parse::<i64>().is_ok() {
                ":id"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}
