//! Metrics collection and exposition.
//!
//! # Metrics
//! - `coordinator_breaker_state` (gauge): 0=closed, 1=open, 2=half_open, per dependency
//! - `coordinator_breaker_transitions_total` (counter): by dependency, from, to
//! - `coordinator_breaker_rejections_total` (counter): fail-fast rejections
//! - `coordinator_ambassador_attempts_total` (counter): by dependency, outcome
//! - `coordinator_ambassador_attempt_duration_seconds` (histogram)
//! - `coordinator_requests_total` (counter): lifecycle transitions by state
//! - `coordinator_request_duration_seconds` (histogram): creation to terminal state
//! - `coordinator_deliveries_total` (counter): by observer kind, outcome
//! - `coordinator_cache_lookups_total` (counter): hit/miss
//! - `coordinator_pubsub_lagged_total` (counter): messages dropped by slow subscribers
//! - `coordinator_pubsub_backpressure_total` (counter): publishes that found the queue full
//! - `coordinator_results_recovered_total` (counter): results re-notified after a lag
//!
//! # Design Decisions
//! - Thin wrappers over the `metrics` facade; no-ops until a recorder is installed
//! - Prometheus exporter is optional and bound only when enabled in config

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_breaker_state(dependency: &str, state_code: u8) {
    gauge!("coordinator_breaker_state", "dependency" => dependency.to_string())
        .set(state_code as f64);
}

pub fn record_breaker_transition(dependency: &str, from: &'static str, to: &'static str) {
    counter!(
        "coordinator_breaker_transitions_total",
        "dependency" => dependency.to_string(),
        "from" => from,
        "to" => to
    )
    .increment(1);
}

pub fn record_breaker_rejection(dependency: &str) {
    counter!("coordinator_breaker_rejections_total", "dependency" => dependency.to_string())
        .increment(1);
}

pub fn record_ambassador_attempt(dependency: &str, outcome: &'static str, elapsed: Duration) {
    counter!(
        "coordinator_ambassador_attempts_total",
        "dependency" => dependency.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    histogram!(
        "coordinator_ambassador_attempt_duration_seconds",
        "dependency" => dependency.to_string()
    )
    .record(elapsed.as_secs_f64());
}

pub fn record_request_state(state: &'static str) {
    counter!("coordinator_requests_total", "state" => state).increment(1);
}

pub fn record_request_duration(state: &'static str, elapsed_ms: u64) {
    histogram!("coordinator_request_duration_seconds", "state" => state)
        .record(elapsed_ms as f64 / 1000.0);
}

pub fn record_delivery(kind: &'static str, outcome: &'static str) {
    counter!("coordinator_deliveries_total", "kind" => kind, "outcome" => outcome).increment(1);
}

pub fn record_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!("coordinator_cache_lookups_total", "result" => result).increment(1);
}

pub fn record_pubsub_lagged(channel: &'static str, skipped: u64) {
    counter!("coordinator_pubsub_lagged_total", "channel" => channel).increment(skipped);
}

pub fn record_pubsub_backpressure(channel: &'static str) {
    counter!("coordinator_pubsub_backpressure_total", "channel" => channel).increment(1);
}

pub fn record_results_recovered(count: u64) {
    counter!("coordinator_results_recovered_total").increment(count);
}
