//! # relay-core
//!
//! Identifiers and the JSON wire protocol spoken between the relay, the
//! per-tenant print agents and the SaaS job issuer.
//!
//! Every frame in either direction is a JSON object discriminated by a
//! `type` field. [`InboundMessage`] covers what clients may send,
//! [`OutboundMessage`] covers what the relay emits.

#![deny(unsafe_code)]

pub mod ids;
pub mod protocol;

pub use ids::{ConnectionId, TenantId};
pub use protocol::{
    InboundMessage, OutboundMessage, PrintId, PrintOrder, ProtocolError, Role, RoutingFailure,
    RoutingOutcome, UnknownRole,
};
