use crate::server::websocket::connection::SessionRole;
use crate::store::Origin;
use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};
use std::time::Duration;

/// Metric name prefix for all jukebox metrics
const PREFIX: &str = "jukebox";

lazy_static! {
    // Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Request Metrics
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_http_requests_total"), "Total number of HTTP requests"),
        &["method", "path", "status"]
    ).expect("Failed to create http_requests_total metric");

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_http_request_duration_seconds"),
            "HTTP request duration in seconds"
        )
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["method", "path"]
    ).expect("Failed to create http_request_duration_seconds metric");

    // Playout Metrics
    pub static ref TRACKS_STARTED_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_tracks_started_total"), "Tracks started, by queue entry origin"),
        &["origin"]
    ).expect("Failed to create tracks_started_total metric");

    pub static ref PREEMPTIONS_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_preemptions_total"),
        "Fallback tracks cut short by a customer request"
    ).expect("Failed to create preemptions_total metric");

    pub static ref FALLBACK_FILLS_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_fallback_fills_total"),
        "Times the fallback catalog was materialized into the queue"
    ).expect("Failed to create fallback_fills_total metric");

    pub static ref FALLBACK_ENTRIES_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_fallback_entries_total"),
        "Fallback entries added to the queue"
    ).expect("Failed to create fallback_entries_total metric");

    pub static ref QUEUE_LENGTH: Gauge = Gauge::new(
        format!("{PREFIX}_queue_length"),
        "Entries waiting in the queue"
    ).expect("Failed to create queue_length metric");

    // Payment Metrics
    pub static ref SETTLEMENTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_settlements_total"), "Settlement attempts by outcome"),
        &["outcome"]
    ).expect("Failed to create settlements_total metric");

    pub static ref PAYMENT_INTENTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_payment_intents_total"), "Payment intents by outcome"),
        &["outcome"]
    ).expect("Failed to create payment_intents_total metric");

    pub static ref WEBHOOKS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_webhooks_total"), "Payment notifications by outcome"),
        &["outcome"]
    ).expect("Failed to create webhooks_total metric");

    pub static ref REVENUE_CENTS: Gauge = Gauge::new(
        format!("{PREFIX}_revenue_cents"),
        "Accumulated revenue in cents"
    ).expect("Failed to create revenue_cents metric");

    pub static ref UNREACHABLE_SESSIONS_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_unreachable_sessions_total"),
        "Payment confirmations whose originating session was gone"
    ).expect("Failed to create unreachable_sessions_total metric");

    // Storage Metrics
    pub static ref STORE_ERRORS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_store_errors_total"), "Store operations that failed after retries"),
        &["operation"]
    ).expect("Failed to create store_errors_total metric");

    // Search Metrics
    pub static ref SEARCH_CACHE_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_search_cache_total"), "Search cache lookups"),
        &["result"]
    ).expect("Failed to create search_cache_total metric");

    // WebSocket Metrics
    pub static ref WS_SESSIONS: GaugeVec = GaugeVec::new(
        Opts::new(format!("{PREFIX}_ws_sessions"), "Connected WebSocket sessions by role"),
        &["role"]
    ).expect("Failed to create ws_sessions metric");
}

/// Initialize all metrics and register them with the Prometheus registry
pub fn init_metrics() {
    // Register all metrics - ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(TRACKS_STARTED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(PREEMPTIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(FALLBACK_FILLS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(FALLBACK_ENTRIES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(QUEUE_LENGTH.clone()));
    let _ = REGISTRY.register(Box::new(SETTLEMENTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(PAYMENT_INTENTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(WEBHOOKS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(REVENUE_CENTS.clone()));
    let _ = REGISTRY.register(Box::new(UNREACHABLE_SESSIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(STORE_ERRORS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(SEARCH_CACHE_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(WS_SESSIONS.clone()));

    tracing::info!("Metrics system initialized successfully");
}

/// Record an HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16, duration: Duration) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();

    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration.as_secs_f64());
}

pub fn record_track_started(origin: Origin) {
    TRACKS_STARTED_TOTAL
        .with_label_values(&[origin.as_db_str()])
        .inc();
}

pub fn record_preemption() {
    PREEMPTIONS_TOTAL.inc();
}

/// Record a fallback fill of `entries` items
pub fn record_fallback_fill(entries: usize) {
    FALLBACK_FILLS_TOTAL.inc();
    FALLBACK_ENTRIES_TOTAL.inc_by(entries as f64);
}

pub fn set_queue_length(len: usize) {
    QUEUE_LENGTH.set(len as f64);
}

/// `outcome` is one of settled, duplicate, unknown
pub fn record_settlement(outcome: &str) {
    SETTLEMENTS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_payment_intent(outcome: &str) {
    PAYMENT_INTENTS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_webhook(outcome: &str) {
    WEBHOOKS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn set_revenue_cents(cents: i64) {
    REVENUE_CENTS.set(cents as f64);
}

pub fn record_unreachable_session() {
    UNREACHABLE_SESSIONS_TOTAL.inc();
}

pub fn record_store_error(operation: &str) {
    STORE_ERRORS_TOTAL.with_label_values(&[operation]).inc();
}

pub fn record_search_cache(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    SEARCH_CACHE_TOTAL.with_label_values(&[result]).inc();
}

pub fn set_ws_sessions(role: SessionRole, count: usize) {
    WS_SESSIONS
        .with_label_values(&[role.as_str()])
        .set(count as f64);
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_else(|_| String::from(""));
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}
