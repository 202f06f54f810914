//! Prometheus metrics for the allowlist filter.
//!
//! # Available Metrics
//!
//! ## Counters
//! - `ddns_allowlist_requests_total` - Requests evaluated (labels: filter, outcome)
//! - `ddns_allowlist_refresh_total` - Refresh attempts (label: status = success, failure, skipped)
//!
//! ## Histograms
//! - `ddns_allowlist_refresh_duration_seconds` - Time spent building the allowlist
//!
//! ## Gauges
//! - `ddns_allowlist_addresses` - Addresses in the most recently built allowlist
//!
//! Recording functions are no-ops until a recorder is installed, so the
//! filter can be used without a Prometheus endpoint.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{error, info};

/// Metric names as constants for consistency.
pub mod names {
    pub const REQUESTS_TOTAL: &str = "ddns_allowlist_requests_total";
    pub const REFRESH_TOTAL: &str = "ddns_allowlist_refresh_total";
    pub const REFRESH_DURATION_SECONDS: &str = "ddns_allowlist_refresh_duration_seconds";
    pub const ADDRESSES: &str = "ddns_allowlist_addresses";
}

/// Initialize the Prometheus metrics exporter.
///
/// This sets up metric descriptions and starts the Prometheus HTTP listener
/// on the specified address.
///
/// # Errors
///
/// Returns a message if the exporter cannot be installed.
pub fn init_metrics(metrics_addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        names::REQUESTS_TOTAL,
        "Total number of requests evaluated by the allowlist filter"
    );
    describe_counter!(
        names::REFRESH_TOTAL,
        "Total number of allowlist refresh attempts"
    );
    describe_histogram!(
        names::REFRESH_DURATION_SECONDS,
        "Allowlist build duration in seconds"
    );
    describe_gauge!(
        names::ADDRESSES,
        "Number of addresses in the most recently built allowlist"
    );

    info!(addr = %metrics_addr, "Prometheus metrics endpoint started");
    Ok(())
}

/// Try to initialize metrics, logging any errors but not failing.
pub fn try_init_metrics(metrics_addr: SocketAddr) {
    if let Err(e) = init_metrics(metrics_addr) {
        error!(error = %e, "Failed to initialize metrics, continuing without metrics");
    }
}

/// Record one request decision (`allowed`, `denied`, or `error`).
pub fn record_request(filter: &str, outcome: &'static str) {
    counter!(names::REQUESTS_TOTAL, "filter" => filter.to_string(), "outcome" => outcome)
        .increment(1);
}

/// Record a refresh attempt and, unless it was skipped, its duration.
pub fn record_refresh(status: &'static str, duration_secs: f64) {
    counter!(names::REFRESH_TOTAL, "status" => status).increment(1);
    if status != "skipped" {
        histogram!(names::REFRESH_DURATION_SECONDS, "status" => status).record(duration_secs);
    }
}

/// Update the allowlist size gauge.
pub fn set_allowlist_size(count: usize) {
    gauge!(names::ADDRESSES).set(count as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    // Recording without an installed recorder must not panic

    #[test]
    fn test_record_request() {
        record_request("test", "allowed");
        record_request("test", "denied");
    }

    #[test]
    fn test_record_refresh() {
        record_refresh("success", 0.01);
        record_refresh("skipped", 0.0);
    }

    #[test]
    fn test_set_allowlist_size() {
        set_allowlist_size(0);
        set_allowlist_size(12);
    }
}
