//! # relay-server
//!
//! Axum `WebSocket` relay between per-tenant print agents and the SaaS job
//! issuer.
//!
//! - [`auth`]: shared-secret / tenant-token admission check
//! - [`registry`]: at most one live agent per tenant
//! - [`router`]: forwards a saas print order to the tenant's agent
//! - [`websocket`]: connection handle, heartbeat, message dispatch, session loop
//! - [`lifecycle`]: the per-connection state machine
//! - [`server`]: HTTP routes (`/`, `/ws`, `/health`, `/metrics`) and listener
//! - Graceful shutdown via `tokio::signal` + `CancellationToken`

#![deny(unsafe_code)]

pub mod auth;
pub mod config;
pub mod health;
pub mod lifecycle;
pub mod metrics;
pub mod registry;
pub mod router;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use auth::{Admission, Authenticator, ConnectParams, Credential, Rejection};
pub use config::ServerConfig;
pub use lifecycle::{InvalidTransition, Lifecycle, LifecycleState};
pub use registry::{AgentRecord, AgentRegistry};
pub use router::OrderRouter;
pub use server::RelayServer;
pub use shutdown::ShutdownCoordinator;
pub use websocket::{Connection, SendError};
