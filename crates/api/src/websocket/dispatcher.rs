//! Event dispatcher
//!
//! Delivers targeted events to individual connections and removes disconnected
//! subjects from the presence registry.

use std::collections::HashMap;
use std::sync::Arc;

use livedesk_shared::{ConnectionId, Role};
use tokio::sync::RwLock;

use super::connection::Connection;
use super::events::ServerEvent;
use super::presence::Registries;

/// Routes events to connections by connection id
#[derive(Default)]
pub struct EventDispatcher {
    /// Registered connections indexed by connection id
    connections: RwLock<HashMap<ConnectionId, Arc<Connection>>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a registered connection reachable by id
    pub async fn attach(&self, conn: Arc<Connection>) {
        let mut connections = self.connections.write().await;
        connections.insert(conn.connection_id, conn);
    }

    /// Forget a connection; returns whether it was attached
    pub async fn detach(&self, connection_id: ConnectionId) -> bool {
        let mut connections = self.connections.write().await;
        connections.remove(&connection_id).is_some()
    }

    /// Send an event to one connection
    ///
    /// Silently drops events for unknown or closed connections (they are cleaned up
    /// by their own disconnect path).
    pub async fn send_to(&self, connection_id: ConnectionId, event: ServerEvent) -> bool {
        let connections = self.connections.read().await;
        match connections.get(&connection_id) {
            Some(conn) => deliver(conn, event),
            None => {
                tracing::warn!(
                    connection_id = %connection_id,
                    event = %event.name(),
                    "No attached connection for event"
                );
                false
            }
        }
    }

    /// Remove the subject behind `connection_id` from the registry of its role
    pub fn cleanup(&self, registries: &mut Registries, connection_id: ConnectionId, role: Role) {
        let removed = match role {
            Role::Agent => registries.remove_agents_by_connection(connection_id),
            Role::Customer => registries.remove_customers_by_connection(connection_id),
            Role::Admin => usize::from(registries.clear_admin_if_matches(connection_id)),
        };

        tracing::info!(
            connection_id = %connection_id,
            role = %role,
            removed,
            "Presence cleaned up"
        );
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }
}

/// Send directly on a connection handle, logging failures
pub(crate) fn deliver(conn: &Connection, event: ServerEvent) -> bool {
    let name = event.name();
    match conn.send(event) {
        Ok(()) => {
            tracing::debug!(connection_id = %conn.connection_id, event = %name, "Event delivered");
            true
        }
        Err(_) => {
            tracing::warn!(
                connection_id = %conn.connection_id,
                event = %name,
                "Failed to send event to connection (likely closed)"
            );
            false
        }
    }
}
