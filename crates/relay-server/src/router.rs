//! Forwards saas print orders to the tenant's agent.

use std::sync::Arc;

use metrics::counter;
use relay_core::{OutboundMessage, PrintOrder, RoutingFailure, RoutingOutcome, TenantId};
use tracing::{info, warn};

use crate::metrics::PRINT_ORDERS_TOTAL;
use crate::registry::AgentRegistry;

/// Routes print orders through the agent registry.
#[derive(Clone, Debug)]
pub struct OrderRouter {
    registry: Arc<AgentRegistry>,
}

impl OrderRouter {
    /// Create a router over `registry`.
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        Self { registry }
    }

    /// The registry this router reads.
    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    /// Forward `order` to `tenant`'s agent. One attempt, no retry.
    ///
    /// Success means the order was queued on the agent's socket, not that
    /// the agent printed it.
    pub fn route(&self, tenant: &TenantId, order: PrintOrder) -> RoutingOutcome {
        let print_id = order.print_id.clone();

        let Some(agent) = self.registry.lookup(tenant).filter(|a| a.is_open()) else {
            warn!(restaurant_id = %tenant, print_id = %print_id, "agent offline");
            return record(RoutingOutcome::failed(print_id, RoutingFailure::AgentOffline));
        };

        match agent.send(&OutboundMessage::PrintOrder { order }) {
            Ok(()) => {
                info!(
                    restaurant_id = %tenant,
                    print_id = %print_id,
                    agent = %agent.id,
                    "print order forwarded"
                );
                record(RoutingOutcome::delivered(print_id))
            }
            Err(e) => {
                warn!(
                    restaurant_id = %tenant,
                    print_id = %print_id,
                    agent = %agent.id,
                    error = %e,
                    "print order delivery failed"
                );
                record(RoutingOutcome::failed(
                    print_id,
                    RoutingFailure::DeliveryError,
                ))
            }
        }
    }
}

fn record(outcome: RoutingOutcome) -> RoutingOutcome {
    let label = match outcome.reason {
        None => "delivered",
        Some(RoutingFailure::AgentOffline) => "agent_offline",
        Some(RoutingFailure::DeliveryError) => "delivery_error",
    };
    counter!(PRINT_ORDERS_TOTAL, "outcome" => label).increment(1);
    outcome
}
