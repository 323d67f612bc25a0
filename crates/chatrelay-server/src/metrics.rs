//! Prometheus metrics recorder and metric name constants.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render `/metrics`. Fails if a
/// global recorder is already installed.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Peer connections accepted (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// Peer connections closed (counter, labels: reason).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Registered peer connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Connections evicted during fan-out (counter, labels: reason).
pub const WS_EVICTIONS_TOTAL: &str = "ws_evictions_total";
/// Inbound frames skipped as undecodable (counter, labels: kind).
pub const WS_MALFORMED_FRAMES_TOTAL: &str = "ws_malformed_frames_total";
/// Broadcast rounds executed by the hub (counter).
pub const HUB_BROADCASTS_TOTAL: &str = "hub_broadcasts_total";
/// Completion calls attempted (counter).
pub const COMPLETION_REQUESTS_TOTAL: &str = "completion_requests_total";
/// Completion calls that degraded to the apology (counter, labels: category).
pub const COMPLETION_FAILURES_TOTAL: &str = "completion_failures_total";
/// Transcription uploads handled (counter).
pub const TRANSCRIPTION_REQUESTS_TOTAL: &str = "transcription_requests_total";
/// Transcription uploads that failed (counter, labels: category).
pub const TRANSCRIPTION_FAILURES_TOTAL: &str = "transcription_failures_total";
