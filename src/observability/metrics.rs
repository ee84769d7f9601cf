//! Metrics collection and exposition.
//!
//! # Metrics
//! - `arki_requests_total` (counter): requests by view and status
//! - `arki_request_duration_seconds` (histogram): time to response headers,
//!   by view
//! - `arki_stream_aborts_total` (counter): responses truncated after their
//!   headers were sent, by view

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(view: &str, status: u16, start: Instant) {
    metrics::counter!(
        "arki_requests_total",
        "view" => view.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("arki_request_duration_seconds", "view" => view.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_stream_abort(view: &'static str) {
    metrics::counter!("arki_stream_aborts_total", "view" => view).increment(1);
}
