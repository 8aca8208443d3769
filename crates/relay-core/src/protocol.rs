//! JSON envelopes exchanged with agents and SaaS clients.
//!
//! Inbound (client → relay):
//! - `{"type":"print_order","order":{"printId":..., ...}}` (saas only)
//! - `{"type":"pong"}`
//!
//! Outbound (relay → client):
//! - `{"type":"agent_connected","restaurantId":...}`
//! - `{"type":"welcome","server":...}`
//! - `{"type":"print_order","order":{...}}`
//! - `{"type":"print_ack","printId":...,"success":true}`
//! - `{"type":"print_error","printId":...,"success":false,"reason":...}`
//! - `{"type":"ping"}`

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids::TenantId;

/// The role a client declares when it connects.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Tenant-bound print controller; at most one registered per tenant.
    Agent,
    /// Job issuer submitting print orders.
    Saas,
}

impl Role {
    /// Wire name of the role.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Saas => "saas",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `role` value that is neither `agent` nor `saas`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "agent" => Ok(Self::Agent),
            "saas" => Ok(Self::Saas),
            other => Err(UnknownRole(other.to_owned())),
        }
    }
}

/// Correlation id of a print order. Clients send either a string or a
/// number; it is echoed back unchanged.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrintId {
    /// String id, e.g. `"p1"`.
    Text(String),
    /// Numeric id, e.g. `17`.
    Number(serde_json::Number),
}

impl fmt::Display for PrintId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

impl From<&str> for PrintId {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

/// An opaque print job. Only `printId` is interpreted; all other fields are
/// forwarded to the agent untouched.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PrintOrder {
    /// Correlation id used in the acknowledgement.
    #[serde(rename = "printId")]
    pub print_id: PrintId,
    /// Remaining payload fields.
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl PrintOrder {
    /// Order with the given id and no other fields.
    pub fn new(print_id: impl Into<PrintId>) -> Self {
        Self {
            print_id: print_id.into(),
            payload: Map::new(),
        }
    }
}

/// Why an inbound frame could not be understood.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The frame is not JSON.
    #[error("invalid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),
    /// The frame is JSON but has no string `type` field.
    #[error("message has no type")]
    MissingType,
    /// The `type` is not one the relay accepts.
    #[error("unknown message type: {0}")]
    UnknownType(String),
    /// The `type` is known but the body does not match it.
    #[error("invalid {kind} payload: {source}")]
    InvalidPayload {
        /// The declared message type.
        kind: String,
        /// Underlying decode error.
        #[source]
        source: serde_json::Error,
    },
}

impl ProtocolError {
    /// Short classification for logs and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidJson(_) => "invalid_json",
            Self::MissingType => "missing_type",
            Self::UnknownType(_) => "unknown_type",
            Self::InvalidPayload { .. } => "invalid_payload",
        }
    }
}

/// Messages a client may send to the relay.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    /// A job to forward to the tenant's agent.
    PrintOrder {
        /// The job payload.
        order: PrintOrder,
    },
    /// Reply to a heartbeat ping.
    Pong,
}

impl InboundMessage {
    const KNOWN_TYPES: [&'static str; 2] = ["print_order", "pong"];

    /// Decode a text frame.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(raw).map_err(ProtocolError::InvalidJson)?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingType)?
            .to_owned();
        if !Self::KNOWN_TYPES.contains(&kind.as_str()) {
            return Err(ProtocolError::UnknownType(kind));
        }
        serde_json::from_value(value).map_err(|source| ProtocolError::InvalidPayload { kind, source })
    }
}

/// Messages the relay sends to clients.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// Confirms an agent's registration.
    AgentConnected {
        /// Tenant the agent is now registered for.
        #[serde(rename = "restaurantId")]
        restaurant_id: TenantId,
    },
    /// Greets a newly admitted saas client.
    Welcome {
        /// Relay identifier.
        server: String,
    },
    /// A job forwarded to an agent.
    PrintOrder {
        /// The job payload, as received.
        order: PrintOrder,
    },
    /// The order reached the agent's connection.
    PrintAck {
        /// Correlation id.
        #[serde(rename = "printId")]
        print_id: PrintId,
        /// Always `true`.
        success: bool,
    },
    /// The order could not be forwarded.
    PrintError {
        /// Correlation id.
        #[serde(rename = "printId")]
        print_id: PrintId,
        /// Always `false`.
        success: bool,
        /// Human-readable failure reason.
        reason: String,
    },
    /// Keep-alive pulse.
    Ping,
}

impl OutboundMessage {
    /// Wire `type` of this message.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AgentConnected { .. } => "agent_connected",
            Self::Welcome { .. } => "welcome",
            Self::PrintOrder { .. } => "print_order",
            Self::PrintAck { .. } => "print_ack",
            Self::PrintError { .. } => "print_error",
            Self::Ping => "ping",
        }
    }

    /// Serialize to a JSON text frame.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Why a route attempt failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RoutingFailure {
    /// No agent registered for the tenant, or its socket is no longer open.
    AgentOffline,
    /// The agent's connection refused the message.
    DeliveryError,
}

impl RoutingFailure {
    /// Reason text sent to the requester.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AgentOffline => "agent offline",
            Self::DeliveryError => "delivery error",
        }
    }
}

impl fmt::Display for RoutingFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one forward attempt. Produced once per order, never retried.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoutingOutcome {
    /// Correlation id of the routed order.
    pub print_id: PrintId,
    /// Whether the order was handed to the agent's connection.
    pub success: bool,
    /// Set when `success` is false.
    pub reason: Option<RoutingFailure>,
}

impl RoutingOutcome {
    /// Successful delivery.
    pub fn delivered(print_id: PrintId) -> Self {
        Self {
            print_id,
            success: true,
            reason: None,
        }
    }

    /// Failed delivery.
    pub fn failed(print_id: PrintId, reason: RoutingFailure) -> Self {
        Self {
            print_id,
            success: false,
            reason: Some(reason),
        }
    }
}

impl From<RoutingOutcome> for OutboundMessage {
    fn from(outcome: RoutingOutcome) -> Self {
        match outcome.reason {
            None => Self::PrintAck {
                print_id: outcome.print_id,
                success: true,
            },
            Some(reason) => Self::PrintError {
                print_id: outcome.print_id,
                success: false,
                reason: reason.as_str().to_owned(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn role_from_str() {
        assert_eq!("agent".parse::<Role>().unwrap(), Role::Agent);
        assert_eq!("saas".parse::<Role>().unwrap(), Role::Saas);
        assert_eq!(
            "Agent".parse::<Role>().unwrap_err(),
            UnknownRole("Agent".into())
        );
    }

    #[test]
    fn parse_print_order() {
        let raw = r#"{"type":"print_order","order":{"printId":"p1","items":[1,2]}}"#;
        let msg = InboundMessage::parse(raw).unwrap();
        let InboundMessage::PrintOrder { order } = msg else {
            panic!("expected print_order");
        };
        assert_eq!(order.print_id, PrintId::from("p1"));
        assert_eq!(order.payload["items"], json!([1, 2]));
    }

    #[test]
    fn parse_numeric_print_id() {
        let raw = r#"{"type":"print_order","order":{"printId":17}}"#;
        let InboundMessage::PrintOrder { order } = InboundMessage::parse(raw).unwrap() else {
            panic!("expected print_order");
        };
        assert_eq!(order.print_id.to_string(), "17");
        let back = serde_json::to_value(&order).unwrap();
        assert_eq!(back["printId"], 17);
    }

    #[test]
    fn parse_pong_ignores_extra_fields() {
        let msg = InboundMessage::parse(r#"{"type":"pong","ts":123}"#).unwrap();
        assert_eq!(msg, InboundMessage::Pong);
    }

    #[test]
    fn parse_rejects_non_json() {
        let err = InboundMessage::parse("not json").unwrap_err();
        assert_eq!(err.kind(), "invalid_json");
    }

    #[test]
    fn parse_rejects_missing_type() {
        let err = InboundMessage::parse(r#"{"order":{}}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::MissingType));
    }

    #[test]
    fn parse_rejects_unknown_type() {
        let err = InboundMessage::parse(r#"{"type":"reboot"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownType(ref t) if t == "reboot"));
    }

    #[test]
    fn parse_rejects_order_without_print_id() {
        let err = InboundMessage::parse(r#"{"type":"print_order","order":{"x":1}}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidPayload { ref kind, .. } if kind == "print_order"));
    }

    #[test]
    fn parse_rejects_order_missing() {
        let err = InboundMessage::parse(r#"{"type":"print_order"}"#).unwrap_err();
        assert_eq!(err.kind(), "invalid_payload");
    }

    #[test]
    fn outbound_envelopes_match_wire_format() {
        let agent = OutboundMessage::AgentConnected {
            restaurant_id: TenantId::from_raw("r1"),
        };
        assert_eq!(
            serde_json::to_value(&agent).unwrap(),
            json!({"type": "agent_connected", "restaurantId": "r1"})
        );

        let welcome = OutboundMessage::Welcome {
            server: "print-ws".into(),
        };
        assert_eq!(
            serde_json::to_value(&welcome).unwrap(),
            json!({"type": "welcome", "server": "print-ws"})
        );

        assert_eq!(
            serde_json::to_value(OutboundMessage::Ping).unwrap(),
            json!({"type": "ping"})
        );
    }

    #[test]
    fn forwarded_order_keeps_payload() {
        let mut order = PrintOrder::new("p9");
        let _ = order.payload.insert("table".into(), json!(4));
        let msg = OutboundMessage::PrintOrder { order };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"type": "print_order", "order": {"printId": "p9", "table": 4}})
        );
    }

    #[test]
    fn outcome_to_ack() {
        let msg: OutboundMessage = RoutingOutcome::delivered("p1".into()).into();
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"type": "print_ack", "printId": "p1", "success": true})
        );
    }

    #[test]
    fn outcome_to_error() {
        let msg: OutboundMessage =
            RoutingOutcome::failed("p1".into(), RoutingFailure::AgentOffline).into();
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"type": "print_error", "printId": "p1", "success": false, "reason": "agent offline"})
        );
    }

    #[test]
    fn failure_reasons() {
        assert_eq!(RoutingFailure::AgentOffline.to_string(), "agent offline");
        assert_eq!(RoutingFailure::DeliveryError.to_string(), "delivery error");
    }

    #[test]
    fn kind_matches_serialized_type() {
        let msgs = [
            OutboundMessage::Ping,
            OutboundMessage::Welcome { server: "s".into() },
            RoutingOutcome::delivered("p".into()).into(),
            RoutingOutcome::failed("p".into(), RoutingFailure::DeliveryError).into(),
        ];
        for msg in msgs {
            let value = serde_json::to_value(&msg).unwrap();
            assert_eq!(value["type"], msg.kind());
        }
    }
}
