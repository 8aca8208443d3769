//! `/health` endpoint.

use serde::Serialize;
use std::time::Instant;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Admitted, open WebSocket connections.
    pub connections: usize,
    /// Tenants with a registered agent.
    pub agents_online: usize,
}

/// Build a health response from live counters.
pub fn health_check(start_time: Instant, connections: usize, agents_online: usize) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        agents_online,
    }
}
