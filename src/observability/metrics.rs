//! Metrics collection and exposition.
//!
//! # Metrics
//! - `speedtest_requests_total` (counter): requests by endpoint
//! - `speedtest_download_bytes_total` (counter): bytes streamed by `/garbage`
//! - `speedtest_upload_bytes_total` (counter): bytes drained by `/empty`
//! - `speedtest_proxy_header_rejected_total` (counter): connections dropped for bad PROXY headers
//! - `speedtest_telemetry_inserts_total` (counter): telemetry inserts by outcome
//!
//! # Design Decisions
//! - Without an installed recorder every call is a no-op
//! - The Prometheus exporter runs its own listener, separate from the API port

use std::net::SocketAddr;

use metrics::counter;
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

pub const REQUESTS_TOTAL: &str = "speedtest_requests_total";
pub const DOWNLOAD_BYTES_TOTAL: &str = "speedtest_download_bytes_total";
pub const UPLOAD_BYTES_TOTAL: &str = "speedtest_upload_bytes_total";
pub const PROXY_HEADER_REJECTED_TOTAL: &str = "speedtest_proxy_header_rejected_total";
pub const TELEMETRY_INSERTS_TOTAL: &str = "speedtest_telemetry_inserts_total";

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Prometheus metrics exporter listening");
    Ok(())
}

pub fn record_request(endpoint: &'static str) {
    counter!(REQUESTS_TOTAL, "endpoint" => endpoint).increment(1);
}

pub fn record_download_bytes(bytes: u64) {
    counter!(DOWNLOAD_BYTES_TOTAL).increment(bytes);
}

pub fn record_upload_bytes(bytes: u64) {
    counter!(UPLOAD_BYTES_TOTAL).increment(bytes);
}

pub fn record_proxy_header_rejected() {
    counter!(PROXY_HEADER_REJECTED_TOTAL).increment(1);
}

/// `outcome` is `"ok"` or `"error"`.
pub fn record_telemetry_insert(outcome: &'static str) {
    counter!(TELEMETRY_INSERTS_TOTAL, "outcome" => outcome).increment(1);
}
