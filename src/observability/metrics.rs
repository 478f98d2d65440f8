//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by route, method, status
//! - `gateway_request_duration_seconds` (histogram): latency by route
//! - `gateway_replica_attempts_total` (counter): attempts by replica, outcome
//! - `gateway_breaker_transitions_total` (counter): transitions by replica, state
//! - `gateway_breaker_state` (gauge): 0=closed, 1=half_open, 2=open
//! - `gateway_notifications_total` (counter): notifications by kind, outcome
//! - `gateway_rate_limited_total` (counter): rejected requests by route
//! - `registry_instances` (gauge): instances held by the registry

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(route: &'static str, method: &str, status: u16, start: Instant) {
    metrics::counter!(
        "gateway_requests_total",
        "route" => route,
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("gateway_request_duration_seconds", "route" => route)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_replica_attempt(replica: &str, outcome: &'static str) {
    metrics::counter!(
        "gateway_replica_attempts_total",
        "replica" => replica.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_breaker_transition(replica: &str, state: &'static str) {
    metrics::counter!(
        "gateway_breaker_transitions_total",
        "replica" => replica.to_string(),
        "state" => state
    )
    .increment(1);

    let value = match state {
        "closed" => 0.0,
        "half_open" => 1.0,
        _ => 2.0,
    };
    metrics::gauge!("gateway_breaker_state", "replica" => replica.to_string()).set(value);
}

pub fn record_notification(kind: &'static str, outcome: &'static str) {
    metrics::counter!(
        "gateway_notifications_total",
        "kind" => kind,
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_rate_limited(route: &'static str) {
    metrics::counter!("gateway_rate_limited_total", "route" => route).increment(1);
}

pub fn record_registry_size(instances: usize) {
    metrics::gauge!("registry_instances").set(instances as f64);
}
