//! Per-socket connection handle.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use relay_core::{ConnectionId, OutboundMessage, Role, TenantId};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Why a message could not be queued for a connection.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// The socket has closed or is closing.
    #[error("connection closed")]
    Closed,
    /// The outbound queue is at capacity.
    #[error("send queue full")]
    Full,
    /// The message could not be serialized.
    #[error("encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// An admitted client connection.
///
/// Writes go through a bounded queue drained by the session's writer task,
/// so [`send`](Self::send) never blocks.
pub struct Connection {
    /// Unique connection id.
    pub id: ConnectionId,
    /// Role bound at admission.
    pub role: Role,
    /// Tenant bound at admission.
    pub tenant_id: TenantId,
    /// When the connection was admitted.
    pub connected_at: Instant,
    tx: mpsc::Sender<String>,
    open: AtomicBool,
    dropped_messages: AtomicU64,
}

impl Connection {
    /// Create an open connection writing into `tx`.
    pub fn new(role: Role, tenant_id: TenantId, tx: mpsc::Sender<String>) -> Self {
        Self::with_id(ConnectionId::new(), role, tenant_id, tx)
    }

    /// Create an open connection with a caller-chosen id.
    pub fn with_id(
        id: ConnectionId,
        role: Role,
        tenant_id: TenantId,
        tx: mpsc::Sender<String>,
    ) -> Self {
        Self {
            id,
            role,
            tenant_id,
            connected_at: Instant::now(),
            tx,
            open: AtomicBool::new(true),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Queue a message for the client.
    pub fn send(&self, message: &OutboundMessage) -> Result<(), SendError> {
        if !self.is_open() {
            return Err(SendError::Closed);
        }
        let text = message.to_json()?;
        self.tx.try_send(text).map_err(|e| {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            match e {
                TrySendError::Full(_) => SendError::Full,
                TrySendError::Closed(_) => SendError::Closed,
            }
        })
    }

    /// Whether the socket can still accept writes.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire) && !self.tx.is_closed()
    }

    /// Flip the connection to closed. Returns `true` only for the first call.
    pub fn mark_closed(&self) -> bool {
        self.open.swap(false, Ordering::AcqRel)
    }

    /// Messages that could not be queued.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("tenant_id", &self.tenant_id)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}
