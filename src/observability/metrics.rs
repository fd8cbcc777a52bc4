//! Metrics collection and exposition.
//!
//! # Metrics
//! - `admission_decisions_total` (counter): decisions by component and outcome
//! - `admission_route_p99_seconds` (gauge): last computed p99 per route
//! - `admission_latency_samples` (gauge): retained samples per route
//! - `admission_rate_limit_clients` (gauge): buckets in the registry
//! - `admission_registry_resets_total` (counter): coarse registry evictions
//! - `admission_handler_duration_seconds` (histogram): wrapped handler latency
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; with no recorder installed
//!   every call is a no-op, so tests and embedders pay nothing
//! - Prometheus exposition is opt-in via `init_metrics`

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

pub const RATE_LIMIT: &str = "rate_limit";
pub const LOAD_SHED: &str = "load_shed";

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Count one admission decision.
pub fn record_decision(component: &'static str, outcome: &'static str) {
    counter!("admission_decisions_total", "component" => component, "outcome" => outcome)
        .increment(1);
}

pub fn record_p99(route: &str, p99: Duration) {
    gauge!("admission_route_p99_seconds", "route" => route.to_string()).set(p99.as_secs_f64());
}

pub fn record_sample_count(route: &str, samples: usize) {
    gauge!("admission_latency_samples", "route" => route.to_string()).set(samples as f64);
}

pub fn record_handler_duration(route: &str, elapsed: Duration) {
    histogram!("admission_handler_duration_seconds", "route" => route.to_string())
        .record(elapsed.as_secs_f64());
}

pub fn record_tracked_clients(count: usize) {
    gauge!("admission_rate_limit_clients").set(count as f64);
}

pub fn record_registry_reset() {
    counter!("admission_registry_resets_total").increment(1);
}
