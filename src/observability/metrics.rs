//! Metrics collection and exposition.
//!
//! # Metrics
//! - `quay_requests_total` (counter): completed requests by method, status
//! - `quay_request_duration_seconds` (histogram): time to the response head
//! - `quay_aborted_requests_total` (counter): requests ended by their token, by reason
//! - `quay_rate_limited_total` (counter): rejections by the rate limiter
//! - `quay_cache_hits_total` (counter): responses served from the cache
//! - `quay_cache_entries` (gauge): entries currently cached
//!
//! # Design Decisions
//! - Recording without an installed recorder is a no-op, so library users pay nothing
//! - The Prometheus exporter is only installed by the binary

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(err) => tracing::error!(address = %addr, error = %err, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    ::metrics::counter!(
        "quay_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    ::metrics::histogram!("quay_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_aborted(reason: &str) {
    ::metrics::counter!("quay_aborted_requests_total", "reason" => reason.to_string()).increment(1);
}

pub fn record_rate_limited() {
    ::metrics::counter!("quay_rate_limited_total").increment(1);
}

pub fn record_cache_hit() {
    ::metrics::counter!("quay_cache_hits_total").increment(1);
}

pub fn set_cache_entries(entries: usize) {
    ::metrics::gauge!("quay_cache_entries").set(entries as f64);
}
