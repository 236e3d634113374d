//! Connection lifecycle: handshake parameters and the per-connection state machine
//!
//! ```text
//! Connecting -> Verifying -> Rejected
//!                         -> RoleDispatch -> Registered -> Disconnected
//!                                         -> Rejected
//! ```
//!
//! `Rejected` and `Disconnected` are terminal. A reconnect is a brand-new
//! connection with a new connection id.

use livedesk_shared::{CategoryId, DepartmentId, DeskError, DeskResult, Role, Subject};
use serde::Deserialize;

/// Query parameters supplied by the client when opening the socket
///
/// Department and category are kept raw so that malformed values surface as
/// `MalformedCustomerParams` instead of a generic extractor rejection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Handshake {
    pub token: Option<String>,
    pub department_id: Option<String>,
    pub category_id: Option<String>,
}

/// Routing parameters of a customer connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CustomerRouting {
    pub department_id: DepartmentId,
    pub category_id: CategoryId,
}

impl Handshake {
    /// Token, if present and non-blank
    pub fn credential(&self) -> DeskResult<&str> {
        match self.token.as_deref().map(str::trim) {
            Some(token) if !token.is_empty() => Ok(token),
            _ => Err(DeskError::InvalidCredential),
        }
    }

    /// Department and category of a customer connection; both must be positive integers
    pub fn customer_routing(&self) -> DeskResult<CustomerRouting> {
        let department_id = self
            .department_id
            .as_deref()
            .and_then(DepartmentId::parse)
            .ok_or_else(|| {
                DeskError::MalformedCustomerParams(
                    "department_id must be a positive integer".into(),
                )
            })?;
        let category_id = self
            .category_id
            .as_deref()
            .and_then(CategoryId::parse)
            .ok_or_else(|| {
                DeskError::MalformedCustomerParams("category_id must be a positive integer".into())
            })?;

        Ok(CustomerRouting {
            department_id,
            category_id,
        })
    }
}

/// Outcome of a successful handshake verification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub subject: Subject,
    /// Present exactly when `subject.role` is `Role::Customer`
    pub customer: Option<CustomerRouting>,
}

/// Lifecycle phase of one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Connecting,
    Verifying,
    Rejected,
    RoleDispatch(Role),
    Registered(Role),
    Disconnected,
}

impl ConnectionPhase {
    /// Whether moving from `self` to `next` is a legal transition
    pub fn can_advance_to(&self, next: ConnectionPhase) -> bool {
        use ConnectionPhase::*;

        match (*self, next) {
            (Connecting, Verifying) => true,
            (Verifying, Rejected) | (Verifying, RoleDispatch(_)) => true,
            (RoleDispatch(_), Rejected) => true,
            (RoleDispatch(from), Registered(to)) => from == to,
            // The transport may close at any point before a terminal phase
            (Connecting | Verifying | RoleDispatch(_) | Registered(_), Disconnected) => true,
            _ => false,
        }
    }

    /// Role captured at dispatch time, if the connection got that far
    pub fn role(&self) -> Option<Role> {
        match self {
            ConnectionPhase::RoleDispatch(role) | ConnectionPhase::Registered(role) => Some(*role),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionPhase::Rejected | ConnectionPhase::Disconnected)
    }
}
