//! Keep-alive pings.
//!
//! The relay sends a JSON `{"type":"ping"}` every interval. Pongs are
//! accepted but not tracked; there is no liveness timeout.

use std::sync::Arc;
use std::time::Duration;

use relay_core::OutboundMessage;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::connection::{Connection, SendError};

/// Outcome of the heartbeat loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// The heartbeat was cancelled externally.
    Cancelled,
    /// The connection stopped accepting writes.
    ConnectionClosed,
}

/// Send a ping every `interval` until cancelled or the connection closes.
///
/// The first ping goes out one full interval after start. A full queue
/// skips that tick's ping without ending the loop.
pub async fn run_heartbeat(
    connection: Arc<Connection>,
    interval: Duration,
    cancel: CancellationToken,
) -> HeartbeatResult {
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // Skip the immediate first tick
    let _ = ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if !connection.is_open() {
                    return HeartbeatResult::ConnectionClosed;
                }
                match connection.send(&OutboundMessage::Ping) {
                    Ok(()) => {}
                    Err(SendError::Closed) => return HeartbeatResult::ConnectionClosed,
                    Err(e) => debug!(conn_id = %connection.id, error = %e, "ping skipped"),
                }
            }
            () = cancel.cancelled() => {
                return HeartbeatResult::Cancelled;
            }
        }
    }
}
