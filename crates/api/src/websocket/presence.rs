//! Presence registry
//!
//! Tracks which agents, customers and the administrator are connected. All three
//! collections sit behind one async mutex; callers that need to decide and then
//! commit (the assignment engine) hold the guard across the whole sequence.

use std::collections::HashSet;

use livedesk_shared::{CategoryId, ConnectionId, DepartmentId, UserId};
use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard};

/// Connected agent, one entry per connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnlineAgent {
    pub agent_id: UserId,
    pub connection_id: ConnectionId,
    pub assigned_departments: HashSet<DepartmentId>,
}

impl OnlineAgent {
    pub fn serves(&self, department_id: DepartmentId) -> bool {
        self.assigned_departments.contains(&department_id)
    }
}

/// Connected customer, one entry per connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnlineCustomer {
    pub user_id: UserId,
    pub connection_id: ConnectionId,
    pub department_id: DepartmentId,
    pub category_id: CategoryId,
    pub is_agent_assigned: bool,
}

/// The single connected administrator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdminPresence {
    pub connection_id: ConnectionId,
    pub user_id: UserId,
}

/// Presence counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PresenceStats {
    pub online_agents: usize,
    pub online_customers: usize,
    pub waiting_customers: usize,
    pub admin_online: bool,
}

/// Backing collections, reachable only through a `PresenceRegistry` guard
#[derive(Debug, Default)]
pub struct Registries {
    agents: Vec<OnlineAgent>,
    customers: Vec<OnlineCustomer>,
    admin: Option<AdminPresence>,
}

impl Registries {
    /// Register an agent connection, replacing any entry with the same connection id
    pub fn add_agent(&mut self, entry: OnlineAgent) {
        self.agents.retain(|a| a.connection_id != entry.connection_id);
        self.agents.push(entry);
    }

    /// Remove every agent entry bound to `connection_id`; returns how many were removed
    pub fn remove_agents_by_connection(&mut self, connection_id: ConnectionId) -> usize {
        let before = self.agents.len();
        self.agents.retain(|a| a.connection_id != connection_id);
        before - self.agents.len()
    }

    /// Register a customer connection, replacing any entry with the same connection id
    pub fn add_customer(&mut self, entry: OnlineCustomer) {
        self.customers.retain(|c| c.connection_id != entry.connection_id);
        self.customers.push(entry);
    }

    /// Remove every customer entry bound to `connection_id`; returns how many were removed
    pub fn remove_customers_by_connection(&mut self, connection_id: ConnectionId) -> usize {
        let before = self.customers.len();
        self.customers.retain(|c| c.connection_id != connection_id);
        before - self.customers.len()
    }

    /// Install the administrator, returning the presence it replaced
    pub fn set_admin(&mut self, entry: AdminPresence) -> Option<AdminPresence> {
        self.admin.replace(entry)
    }

    /// Clear the administrator slot only if it still belongs to `connection_id`
    pub fn clear_admin_if_matches(&mut self, connection_id: ConnectionId) -> bool {
        match self.admin {
            Some(admin) if admin.connection_id == connection_id => {
                self.admin = None;
                true
            }
            _ => false,
        }
    }

    pub fn find_agent_by_user_id(&self, agent_id: UserId) -> Option<&OnlineAgent> {
        self.agents.iter().find(|a| a.agent_id == agent_id)
    }

    pub fn find_customer_by_user_id(&self, user_id: UserId) -> Option<&OnlineCustomer> {
        self.customers.iter().find(|c| c.user_id == user_id)
    }

    /// First agent, in registration order, that serves `department_id`
    pub fn find_agent_for_department(&self, department_id: DepartmentId) -> Option<&OnlineAgent> {
        self.agents.iter().find(|a| a.serves(department_id))
    }

    pub fn admin(&self) -> Option<AdminPresence> {
        self.admin
    }

    pub fn agents(&self) -> impl Iterator<Item = &OnlineAgent> {
        self.agents.iter()
    }

    pub fn customers(&self) -> impl Iterator<Item = &OnlineCustomer> {
        self.customers.iter()
    }

    pub fn stats(&self) -> PresenceStats {
        PresenceStats {
            online_agents: self.agents.len(),
            online_customers: self.customers.len(),
            waiting_customers: self.customers.iter().filter(|c| !c.is_agent_assigned).count(),
            admin_online: self.admin.is_some(),
        }
    }
}

/// Shared presence registry
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    inner: Mutex<Registries>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter the registry critical section
    pub async fn lock(&self) -> MutexGuard<'_, Registries> {
        self.inner.lock().await
    }

    pub async fn stats(&self) -> PresenceStats {
        self.lock().await.stats()
    }

    pub async fn find_agent_by_user_id(&self, agent_id: UserId) -> Option<OnlineAgent> {
        self.lock().await.find_agent_by_user_id(agent_id).cloned()
    }

    pub async fn find_customer_by_user_id(&self, user_id: UserId) -> Option<OnlineCustomer> {
        self.lock().await.find_customer_by_user_id(user_id).cloned()
    }

    pub async fn admin(&self) -> Option<AdminPresence> {
        self.lock().await.admin()
    }
}
