//! Metrics collection and exposition.
//!
//! # Metrics
//! - `edge_requests_total` (counter): requests by method, status, cache status
//! - `edge_request_duration_seconds` (histogram): end-to-end latency
//! - `edge_cache_lookups_total` (counter): interceptor decisions by status
//! - `edge_revalidations_enqueued_total` (counter): jobs accepted by the queue
//! - `edge_queue_failures_total` (counter): jobs the queue refused
//! - `edge_middleware_outcomes_total` (counter): middleware results by outcome
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op, so tests need no setup
//! - The Prometheus exporter is only installed when enabled in config

use std::net::SocketAddr;
use std::sync::Once;
use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

static DESCRIPTIONS: Once = Once::new();

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    describe_metrics();
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

fn describe_metrics() {
    DESCRIPTIONS.call_once(|| {
        describe_counter!("edge_requests_total", Unit::Count, "Requests handled.");
        describe_histogram!(
            "edge_request_duration_seconds",
            Unit::Seconds,
            "End-to-end request latency."
        );
        describe_counter!(
            "edge_cache_lookups_total",
            Unit::Count,
            "Cache interceptor decisions by status."
        );
        describe_counter!(
            "edge_revalidations_enqueued_total",
            Unit::Count,
            "Revalidation jobs accepted by the queue."
        );
        describe_counter!(
            "edge_queue_failures_total",
            Unit::Count,
            "Revalidation jobs the queue failed to accept."
        );
        describe_counter!(
            "edge_middleware_outcomes_total",
            Unit::Count,
            "Middleware invocations by outcome."
        );
    });
}

pub fn record_request(method: &str, status: u16, cache: &str, start: Instant) {
    counter!(
        "edge_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "cache" => cache.to_string()
    )
    .increment(1);
    histogram!("edge_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_cache_lookup(status: &'static str) {
    counter!("edge_cache_lookups_total", "status" => status).increment(1);
}

pub fn record_revalidation_enqueued() {
    counter!("edge_revalidations_enqueued_total").increment(1);
}

pub fn record_queue_failure() {
    counter!("edge_queue_failures_total").increment(1);
}

pub fn record_middleware_outcome(outcome: &'static str) {
    counter!("edge_middleware_outcomes_total", "outcome" => outcome).increment(1);
}
