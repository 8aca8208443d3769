//! Inbound frame dispatch.

use metrics::counter;
use relay_core::{InboundMessage, OutboundMessage, Role};
use tracing::{debug, instrument, warn};

use super::connection::Connection;
use crate::metrics::MALFORMED_MESSAGES_TOTAL;
use crate::router::OrderRouter;

/// Handle one inbound text frame.
///
/// Returns the reply to send back on the same connection, if any. Malformed
/// frames are logged and dropped; the connection stays open.
#[instrument(skip_all, fields(conn_id = %connection.id, role = %connection.role))]
pub fn handle_message(
    raw: &str,
    connection: &Connection,
    router: &OrderRouter,
) -> Option<OutboundMessage> {
    let message = match InboundMessage::parse(raw) {
        Ok(m) => m,
        Err(e) => {
            warn!(kind = e.kind(), error = %e, "malformed message dropped");
            counter!(MALFORMED_MESSAGES_TOTAL, "kind" => e.kind()).increment(1);
            return None;
        }
    };

    match message {
        InboundMessage::Pong => {
            debug!("pong received");
            None
        }
        InboundMessage::PrintOrder { order } => match connection.role {
            Role::Saas => {
                let outcome = router.route(&connection.tenant_id, order);
                Some(outcome.into())
            }
            Role::Agent => {
                warn!(print_id = %order.print_id, "print order from agent ignored");
                None
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::registry::AgentRegistry;
    use relay_core::{PrintId, TenantId};
    use serde_json::json;
    use tokio::sync::mpsc;

    struct Fixture {
        router: OrderRouter,
        registry: Arc<AgentRegistry>,
    }

    fn fixture() -> Fixture {
        let registry = Arc::new(AgentRegistry::new());
        Fixture {
            router: OrderRouter::new(registry.clone()),
            registry,
        }
    }

    fn conn(role: Role, tenant: &str) -> (Arc<Connection>, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(8);
        (
            Arc::new(Connection::new(role, TenantId::from_raw(tenant), tx)),
            rx,
        )
    }

    #[test]
    fn saas_order_without_agent_gets_error() {
        let f = fixture();
        let (saas, _rx) = conn(Role::Saas, "r1");
        let reply = handle_message(
            r#"{"type":"print_order","order":{"printId":"p1"}}"#,
            &saas,
            &f.router,
        )
        .unwrap();
        assert_eq!(
            serde_json::to_value(&reply).unwrap(),
            json!({"type": "print_error", "printId": "p1", "success": false, "reason": "agent offline"})
        );
    }

    #[tokio::test]
    async fn saas_order_with_agent_gets_ack() {
        let f = fixture();
        let (agent, mut agent_rx) = conn(Role::Agent, "r1");
        let _ = f.registry.register(TenantId::from_raw("r1"), agent);
        let (saas, _rx) = conn(Role::Saas, "r1");

        let reply = handle_message(
            r#"{"type":"print_order","order":{"printId":7,"lines":["a"]}}"#,
            &saas,
            &f.router,
        )
        .unwrap();
        assert_eq!(
            reply,
            OutboundMessage::PrintAck {
                print_id: PrintId::Number(7_u64.into()),
                success: true,
            }
        );

        let forwarded: serde_json::Value =
            serde_json::from_str(&agent_rx.recv().await.unwrap()).unwrap();
        assert_eq!(forwarded["order"]["lines"], json!(["a"]));
        assert_eq!(forwarded["order"]["printId"], 7);
    }

    #[test]
    fn saas_routes_only_to_own_tenant() {
        let f = fixture();
        let (agent, _agent_rx) = conn(Role::Agent, "r2");
        let _ = f.registry.register(TenantId::from_raw("r2"), agent);
        let (saas, _rx) = conn(Role::Saas, "r1");

        let reply = handle_message(
            r#"{"type":"print_order","order":{"printId":"p1"}}"#,
            &saas,
            &f.router,
        )
        .unwrap();
        assert_eq!(reply.kind(), "print_error");
    }

    #[test]
    fn agent_order_is_ignored() {
        let f = fixture();
        let (agent, _rx) = conn(Role::Agent, "r1");
        let _ = f.registry.register(TenantId::from_raw("r1"), agent.clone());
        let reply = handle_message(
            r#"{"type":"print_order","order":{"printId":"p1"}}"#,
            &agent,
            &f.router,
        );
        assert!(reply.is_none());
    }

    #[test]
    fn pong_has_no_reply() {
        let f = fixture();
        let (agent, _rx) = conn(Role::Agent, "r1");
        assert!(handle_message(r#"{"type":"pong"}"#, &agent, &f.router).is_none());
    }

    #[test]
    fn malformed_frames_have_no_reply() {
        let f = fixture();
        let (saas, _rx) = conn(Role::Saas, "r1");
        for raw in [
            "not json",
            "[]",
            r#"{"order":{"printId":"p1"}}"#,
            r#"{"type":"reboot"}"#,
            r#"{"type":"print_order"}"#,
            r#"{"type":"print_order","order":{"x":1}}"#,
        ] {
            assert!(handle_message(raw, &saas, &f.router).is_none(), "{raw}");
        }
    }
}
