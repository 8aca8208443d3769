//! Per-tenant agent registry.
//!
//! At most one agent is registered per tenant. A newer registration
//! supersedes the older one, and removal is guarded by connection identity
//! so a superseded agent's teardown cannot evict its successor.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use metrics::gauge;
use relay_core::TenantId;
use tracing::{debug, info};

use crate::metrics::AGENTS_ONLINE;
use crate::websocket::connection::Connection;

/// A registered agent.
#[derive(Clone, Debug)]
pub struct AgentRecord {
    /// The agent's connection.
    pub connection: Arc<Connection>,
    /// When the agent registered.
    pub registered_at: DateTime<Utc>,
}

/// Concurrent map from tenant to its live agent.
#[derive(Debug, Default)]
pub struct AgentRegistry {
    agents: DashMap<TenantId, AgentRecord>,
}

impl AgentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `connection` as the agent for `tenant`, returning the record
    /// it replaced. The replaced connection is left open.
    pub fn register(&self, tenant: TenantId, connection: Arc<Connection>) -> Option<AgentRecord> {
        let conn_id = connection.id.clone();
        let record = AgentRecord {
            connection,
            registered_at: Utc::now(),
        };
        let previous = self.agents.insert(tenant.clone(), record);
        if let Some(prev) = &previous {
            info!(
                restaurant_id = %tenant,
                conn_id = %conn_id,
                superseded = %prev.connection.id,
                "agent registration superseded"
            );
        } else {
            debug!(restaurant_id = %tenant, conn_id = %conn_id, "agent registered");
        }
        self.update_gauge();
        previous
    }

    /// The agent currently registered for `tenant`.
    pub fn lookup(&self, tenant: &TenantId) -> Option<Arc<Connection>> {
        self.agents
            .get(tenant)
            .map(|entry| Arc::clone(&entry.connection))
    }

    /// Remove `tenant`'s entry only if it still holds `connection`.
    ///
    /// Returns whether an entry was removed.
    pub fn unregister(&self, tenant: &TenantId, connection: &Connection) -> bool {
        let removed = self
            .agents
            .remove_if(tenant, |_, record| record.connection.id == connection.id)
            .is_some();
        if removed {
            debug!(restaurant_id = %tenant, conn_id = %connection.id, "agent unregistered");
            self.update_gauge();
        }
        removed
    }

    /// Number of registered agents.
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Whether no agents are registered.
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Tenants that currently have an agent, sorted.
    pub fn tenants(&self) -> Vec<TenantId> {
        let mut tenants: Vec<TenantId> = self.agents.iter().map(|e| e.key().clone()).collect();
        tenants.sort();
        tenants
    }

    #[allow(clippy::cast_precision_loss)]
    fn update_gauge(&self) {
        gauge!(AGENTS_ONLINE).set(self.agents.len() as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::Role;
    use tokio::sync::mpsc;

    fn agent(tenant: &str) -> (Arc<Connection>, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(8);
        let conn = Arc::new(Connection::new(Role::Agent, TenantId::from_raw(tenant), tx));
        (conn, rx)
    }

    fn tid(s: &str) -> TenantId {
        TenantId::from_raw(s)
    }

    #[test]
    fn empty_registry() {
        let reg = AgentRegistry::new();
        assert!(reg.is_empty());
        assert!(reg.lookup(&tid("r1")).is_none());
    }

    #[test]
    fn register_then_lookup() {
        let reg = AgentRegistry::new();
        let (a, _rx) = agent("r1");
        assert!(reg.register(tid("r1"), a.clone()).is_none());
        let found = reg.lookup(&tid("r1")).unwrap();
        assert_eq!(found.id, a.id);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn newer_registration_supersedes() {
        let reg = AgentRegistry::new();
        let (a1, _rx1) = agent("r1");
        let (a2, _rx2) = agent("r1");
        let _ = reg.register(tid("r1"), a1.clone());
        let prev = reg.register(tid("r1"), a2.clone()).unwrap();
        assert_eq!(prev.connection.id, a1.id);
        assert!(a1.is_open());
        assert_eq!(reg.lookup(&tid("r1")).unwrap().id, a2.id);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn stale_unregister_keeps_successor() {
        let reg = AgentRegistry::new();
        let (a1, _rx1) = agent("r1");
        let (a2, _rx2) = agent("r1");
        let _ = reg.register(tid("r1"), a1.clone());
        let _ = reg.register(tid("r1"), a2.clone());
        assert!(!reg.unregister(&tid("r1"), &a1));
        assert_eq!(reg.lookup(&tid("r1")).unwrap().id, a2.id);
    }

    #[test]
    fn unregister_current_removes() {
        let reg = AgentRegistry::new();
        let (a, _rx) = agent("r1");
        let _ = reg.register(tid("r1"), a.clone());
        assert!(reg.unregister(&tid("r1"), &a));
        assert!(reg.lookup(&tid("r1")).is_none());
        assert!(!reg.unregister(&tid("r1"), &a));
    }

    #[test]
    fn tenants_are_isolated() {
        let reg = AgentRegistry::new();
        let (a1, _rx1) = agent("r1");
        let (a2, _rx2) = agent("r2");
        let _ = reg.register(tid("r2"), a2.clone());
        let _ = reg.register(tid("r1"), a1.clone());
        assert_eq!(reg.tenants(), vec![tid("r1"), tid("r2")]);
        assert!(reg.unregister(&tid("r1"), &a1));
        assert_eq!(reg.lookup(&tid("r2")).unwrap().id, a2.id);
    }

    #[test]
    fn unregister_with_wrong_tenant_is_noop() {
        let reg = AgentRegistry::new();
        let (a, _rx) = agent("r1");
        let _ = reg.register(tid("r1"), a.clone());
        assert!(!reg.unregister(&tid("r2"), &a));
        assert_eq!(reg.len(), 1);
    }
}
