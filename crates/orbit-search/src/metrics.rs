//! Prometheus metrics for search runs.

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::{SearchError, SearchResult};

/// Metric names as constants for consistency.
pub mod names {
    pub const RUNS_TOTAL: &str = "orbit_runs_total";
    pub const RUN_DURATION_SECONDS: &str = "orbit_run_duration_seconds";
    pub const WINDOWS_TOTAL: &str = "orbit_windows_total";
    pub const ORACLE_CALLS_TOTAL: &str = "orbit_oracle_calls_total";
    pub const ACCEPTANCES_TOTAL: &str = "orbit_acceptances_total";
}

/// Install the Prometheus recorder and serve `/metrics` on `addr`.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> SearchResult<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| SearchError::config(format!("metrics exporter on {}: {}", addr, e)))
}
