//! WebSocket event types and serialization
//!
//! Server events go over the wire as `{"event": <name>, "data": {...}}`. Assignment
//! events carry the department id in their name (`customerAssigned:3`) so a client
//! scoped to several departments can subscribe per department.

use livedesk_shared::{ConnectionId, DepartmentId, Role, UserId};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Value};

// =============================================================================
// Client-to-Server Events
// =============================================================================

/// Events sent from client to server
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Heartbeat ping to keep connection alive
    Ping,
}

// =============================================================================
// Server-to-Client Events
// =============================================================================

/// Events sent from server to client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// Connection registered
    Connected {
        connection_id: ConnectionId,
        role: Role,
    },

    /// A customer with an unresolved chat came back online (to the agent)
    CustomerOnline { customer_id: UserId },

    /// A new chat was created for this customer (to the agent)
    CustomerAssigned {
        department_id: DepartmentId,
        customer_id: UserId,
    },

    /// A new chat was created with this agent (to the customer)
    AgentAssigned {
        department_id: DepartmentId,
        agent_id: UserId,
    },

    /// Heartbeat response
    Pong,

    /// Error message
    Error { message: String },
}

impl ServerEvent {
    /// Wire name of the event
    pub fn name(&self) -> String {
        match self {
            ServerEvent::Connected { .. } => "connected".to_string(),
            ServerEvent::CustomerOnline { .. } => "customerOnline".to_string(),
            ServerEvent::CustomerAssigned { department_id, .. } => {
                format!("customerAssigned:{department_id}")
            }
            ServerEvent::AgentAssigned { department_id, .. } => {
                format!("agentAssigned:{department_id}")
            }
            ServerEvent::Pong => "pong".to_string(),
            ServerEvent::Error { .. } => "error".to_string(),
        }
    }

    fn data(&self) -> Value {
        match self {
            ServerEvent::Connected {
                connection_id,
                role,
            } => json!({ "connection_id": connection_id, "role": role }),
            ServerEvent::CustomerOnline { customer_id }
            | ServerEvent::CustomerAssigned { customer_id, .. } => {
                json!({ "customer_id": customer_id })
            }
            ServerEvent::AgentAssigned { agent_id, .. } => json!({ "agent_id": agent_id }),
            ServerEvent::Pong => json!({}),
            ServerEvent::Error { message } => json!({ "message": message }),
        }
    }
}

/// Wire representation of a server event
#[derive(Debug, Serialize)]
pub struct EventEnvelope {
    pub event: String,
    pub data: Value,
}

impl From<&ServerEvent> for EventEnvelope {
    fn from(event: &ServerEvent) -> Self {
        Self {
            event: event.name(),
            data: event.data(),
        }
    }
}

impl Serialize for ServerEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        EventEnvelope::from(self).serialize(serializer)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_client_event_deserialization() {
        let event: ClientEvent = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert!(matches!(event, ClientEvent::Ping));

        assert!(serde_json::from_str::<ClientEvent>(r#"{"type":"subscribe"}"#).is_err());
    }

    #[test]
    fn test_department_scoped_event_names() {
        let assigned = ServerEvent::CustomerAssigned {
            department_id: DepartmentId(3),
            customer_id: UserId(42),
        };
        assert_eq!(assigned.name(), "customerAssigned:3");

        let agent = ServerEvent::AgentAssigned {
            department_id: DepartmentId(3),
            agent_id: UserId(7),
        };
        assert_eq!(agent.name(), "agentAssigned:3");

        let online = ServerEvent::CustomerOnline {
            customer_id: UserId(42),
        };
        assert_eq!(online.name(), "customerOnline");
    }

    #[test]
    fn test_server_event_serialization() {
        let event = ServerEvent::AgentAssigned {
            department_id: DepartmentId(3),
            agent_id: UserId(7),
        };
        let json: Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json, json!({ "event": "agentAssigned:3", "data": { "agent_id": 7 } }));

        let json = serde_json::to_string(&ServerEvent::Pong).unwrap();
        assert_eq!(json, r#"{"event":"pong","data":{}}"#);
    }

    #[test]
    fn test_error_event_serialization() {
        let event = ServerEvent::Error {
            message: "Test error".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("error"));
        assert!(json.contains("Test error"));
    }
}
