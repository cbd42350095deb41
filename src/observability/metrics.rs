//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by status
//! - `gateway_request_duration_seconds` (histogram): end-to-end latency
//! - `gateway_tool_runs_total` (counter): tool invocations by outcome
//! - `gateway_tool_duration_seconds` (histogram): encode + tool + decode time
//! - `gateway_tool_processes_active` (gauge): children currently alive
//!
//! Recording is a no-op until [`init_metrics`] installs the exporter.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a finished HTTP request.
pub fn record_request(status: u16, start: Instant) {
    let status = status.to_string();
    counter!("gateway_requests_total", "status" => status).increment(1);
    histogram!("gateway_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

/// Record a finished tool invocation.
pub fn record_tool_run(outcome: &'static str, start: Instant) {
    counter!("gateway_tool_runs_total", "outcome" => outcome).increment(1);
    histogram!("gateway_tool_duration_seconds", "outcome" => outcome)
        .record(start.elapsed().as_secs_f64());
}

/// Keeps `gateway_tool_processes_active` in step with live children.
#[derive(Debug)]
pub struct ActiveToolGuard(());

impl ActiveToolGuard {
    pub fn new() -> Self {
        gauge!("gateway_tool_processes_active").increment(1.0);
        Self(())
    }
}

impl Default for ActiveToolGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ActiveToolGuard {
    fn drop(&mut self) {
        gauge!("gateway_tool_processes_active").decrement(1.0);
    }
}
