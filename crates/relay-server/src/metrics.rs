//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Call once at startup before any metrics are recorded.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

// Metric name constants to avoid typos across modules.

/// Accepted connections (counter, labels: role).
pub const CONNECTIONS_TOTAL: &str = "relay_connections_total";
/// Currently open, admitted connections (gauge).
pub const CONNECTIONS_ACTIVE: &str = "relay_connections_active";
/// Rejected connection attempts (counter, labels: reason).
pub const AUTH_REJECTIONS_TOTAL: &str = "relay_auth_rejections_total";
/// Registered agents (gauge).
pub const AGENTS_ONLINE: &str = "relay_agents_online";
/// Routed print orders (counter, labels: outcome).
pub const PRINT_ORDERS_TOTAL: &str = "relay_print_orders_total";
/// Inbound frames dropped as malformed (counter, labels: kind).
pub const MALFORMED_MESSAGES_TOTAL: &str = "relay_malformed_messages_total";
/// Lifetime of closed connections (histogram, labels: role).
pub const CONNECTION_DURATION_SECONDS: &str = "relay_connection_duration_seconds";
