//! Prometheus-based metrics module
//!
//! Counters for connections, frames and method errors, exposed via an
//! optional /metrics endpoint for Prometheus scraping.

use std::net::SocketAddr;

use axum::{http::header::CONTENT_TYPE, response::IntoResponse, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use tokio::sync::broadcast;
use tracing::{info, warn};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    /// Total WebSocket connections handled
    pub static ref WS_CONNECTIONS_TOTAL: IntCounter = IntCounter::new(
        "streamium_ws_connections_total",
        "Total number of WebSocket streaming connections"
    ).unwrap();

    /// Currently active WebSocket connections
    pub static ref WS_CONNECTIONS_ACTIVE: IntGauge = IntGauge::new(
        "streamium_ws_connections_active",
        "Number of currently active WebSocket streaming connections"
    ).unwrap();

    /// Total plain-HTTP requests served
    pub static ref HTTP_REQUESTS_TOTAL: IntCounter = IntCounter::new(
        "streamium_http_requests_total",
        "Total number of plain HTTP streaming requests"
    ).unwrap();

    /// Outbound frames sent
    pub static ref FRAMES_SENT_TOTAL: IntCounter = IntCounter::new(
        "streamium_frames_sent_total",
        "Total outbound value frames sent"
    ).unwrap();

    /// Inbound frames received
    pub static ref FRAMES_RECEIVED_TOTAL: IntCounter = IntCounter::new(
        "streamium_frames_received_total",
        "Total inbound frames received"
    ).unwrap();

    /// Method errors propagated to peers
    pub static ref METHOD_ERRORS_TOTAL: IntCounter = IntCounter::new(
        "streamium_method_errors_total",
        "Total method errors propagated to peers"
    ).unwrap();
}

/// Initialize and register all metrics with the global registry
pub fn init_metrics() {
    REGISTRY.register(Box::new(WS_CONNECTIONS_TOTAL.clone())).ok();
    REGISTRY.register(Box::new(WS_CONNECTIONS_ACTIVE.clone())).ok();
    REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone())).ok();
    REGISTRY.register(Box::new(FRAMES_SENT_TOTAL.clone())).ok();
    REGISTRY.register(Box::new(FRAMES_RECEIVED_TOTAL.clone())).ok();
    REGISTRY.register(Box::new(METHOD_ERRORS_TOTAL.clone())).ok();
}

pub fn ws_opened() {
    WS_CONNECTIONS_TOTAL.inc();
    WS_CONNECTIONS_ACTIVE.inc();
}

pub fn ws_closed() {
    WS_CONNECTIONS_ACTIVE.dec();
}

pub fn http_request() {
    HTTP_REQUESTS_TOTAL.inc();
}

pub fn frame_sent() {
    FRAMES_SENT_TOTAL.inc();
}

pub fn frame_received() {
    FRAMES_RECEIVED_TOTAL.inc();
}

pub fn method_error() {
    METHOD_ERRORS_TOTAL.inc();
}

/// Prometheus metrics endpoint
async fn get_metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!("Failed to encode metrics: {}", e);
    }

    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        buffer,
    )
}

/// Build the metrics router
pub fn build_metrics_router() -> Router {
    Router::new().route("/metrics", get(get_metrics))
}

/// Start the metrics server
pub async fn start_metrics_server(addr: SocketAddr, mut shutdown_rx: broadcast::Receiver<()>) {
    init_metrics();
    let app = build_metrics_router();

    info!("Prometheus metrics server listening on http://{}/metrics", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            warn!("Failed to bind metrics server to {}: {}", addr, e);
            return;
        }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            info!("Metrics server shutting down");
        })
        .await
        .unwrap_or_else(|e| {
            warn!("Metrics server error: {}", e);
        });
}
