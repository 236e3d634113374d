//! Common types used across LiveDesk

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// ID Wrappers
// =============================================================================

/// Subject ID wrapper (agent, customer or admin user id)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct UserId(pub i64);

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Department ID wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct DepartmentId(pub i64);

impl DepartmentId {
    /// Parse a handshake parameter; only positive integers are accepted
    pub fn parse(raw: &str) -> Option<Self> {
        parse_positive(raw).map(Self)
    }
}

impl From<i64> for DepartmentId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl fmt::Display for DepartmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Category ID wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct CategoryId(pub i64);

impl CategoryId {
    /// Parse a handshake parameter; only positive integers are accepted
    pub fn parse(raw: &str) -> Option<Self> {
        parse_positive(raw).map(Self)
    }
}

impl From<i64> for CategoryId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transport connection ID wrapper, fresh for every connection instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for ConnectionId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn parse_positive(raw: &str) -> Option<i64> {
    match raw.trim().parse::<i64>() {
        Ok(value) if value > 0 => Some(value),
        _ => None,
    }
}

// =============================================================================
// Roles
// =============================================================================

/// Role carried in the connection credential
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Agent,
    Customer,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Agent => "agent",
            Role::Customer => "customer",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verified identity behind a connection credential
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subject {
    pub id: UserId,
    pub role: Role,
}

// =============================================================================
// Routing & Chats
// =============================================================================

/// Departments an agent is allowed to serve
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentRouting {
    pub assigned_departments: HashSet<DepartmentId>,
}

impl AgentRouting {
    pub fn new(departments: impl IntoIterator<Item = DepartmentId>) -> Self {
        Self {
            assigned_departments: departments.into_iter().collect(),
        }
    }
}

/// Durable agent <-> customer chat session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct ChatRecord {
    pub id: i64,
    pub agent_id: UserId,
    pub customer_id: UserId,
    pub department_id: DepartmentId,
    pub category_id: CategoryId,
    pub is_resolved: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}
