//! Metrics collection and exposition.
//!
//! # Metrics
//! - `canopy_requests_total` (counter): handled requests by kind, status
//! - `canopy_request_duration_seconds` (histogram): latency by kind
//! - `canopy_route_invocations_total` (counter): loader/action calls by kind
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed, so library users
//!   and tests pay nothing
//! - The Prometheus exporter is opt-in via `observability.metrics_enabled`

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape endpoint on `addr`.
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

/// Record one handled request.
pub fn record_request(kind: &'static str, status: u16, start: Instant) {
    counter!(
        "canopy_requests_total",
        "kind" => kind,
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("canopy_request_duration_seconds", "kind" => kind)
        .record(start.elapsed().as_secs_f64());
}

/// Record one loader or action invocation.
pub fn record_invocation(kind: &'static str) {
    counter!("canopy_route_invocations_total", "kind" => kind).increment(1);
}
