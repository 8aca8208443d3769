//! WebSocket connection handle, heartbeat, message dispatch and session loop.

pub mod connection;
pub mod handler;
pub mod heartbeat;
pub mod session;

pub use connection::{Connection, SendError};
