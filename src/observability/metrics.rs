//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, status, route
//! - `gateway_request_duration_seconds` (histogram): time to response headers
//! - `gateway_active_connections` (gauge): in-flight proxied connections
//! - `gateway_upgraded_bytes_total` (counter): bytes spliced per direction
//! - `gateway_events_dropped_total` (counter): lifecycle events not delivered
//!
//! Recording is a no-op until a recorder is installed, so the gateway works
//! the same with the exporter disabled.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus exporter with an HTTP scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, route: &str, start: Instant) {
    counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "route" => route.to_string()
    )
    .increment(1);
    histogram!("gateway_request_duration_seconds", "route" => route.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_active_connections(active: u64) {
    gauge!("gateway_active_connections").set(active as f64);
}

pub fn record_upgraded_bytes(client_to_backend: u64, backend_to_client: u64) {
    counter!("gateway_upgraded_bytes_total", "direction" => "upstream").increment(client_to_backend);
    counter!("gateway_upgraded_bytes_total", "direction" => "downstream").increment(backend_to_client);
}

pub fn record_event_dropped(reason: &'static str) {
    counter!("gateway_events_dropped_total", "reason" => reason).increment(1);
}
