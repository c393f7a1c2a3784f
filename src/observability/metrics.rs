//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by endpoint, status
//! - `gateway_request_duration_seconds` (histogram): latency by endpoint
//! - `gateway_gate_rejections_total` (counter): requests a gate turned away
//! - `gateway_cache_lookups_total` (counter): cache hit / miss / store_error
//! - `gateway_logins_total` (counter): login outcomes
//!
//! # Design Decisions
//! - Labels are bounded sets (endpoint names, gate names, outcomes)
//! - Client addresses and usernames are never labels

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Start the Prometheus scrape listener on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_request(endpoint: &str, status: u16, start: Instant) {
    counter!(
        "gateway_requests_total",
        "endpoint" => endpoint.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("gateway_request_duration_seconds", "endpoint" => endpoint.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_gate_rejection(gate: &'static str) {
    counter!("gateway_gate_rejections_total", "gate" => gate).increment(1);
}

pub fn record_cache_lookup(outcome: &'static str) {
    counter!("gateway_cache_lookups_total", "outcome" => outcome).increment(1);
}

pub fn record_login(outcome: &'static str) {
    counter!("gateway_logins_total", "outcome" => outcome).increment(1);
}
