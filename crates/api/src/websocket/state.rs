//! Global WebSocket state management
//!
//! Owns the presence registry and drives each connection through its lifecycle:
//! admission (credential + handshake checks), role dispatch, registration and
//! disconnect cleanup.

use std::sync::Arc;

use livedesk_shared::{DeskError, DeskResult, Role, Subject};
use serde::Serialize;

use crate::auth::IdentityVerifier;
use crate::chats::ChatContinuation;
use crate::directory::AgentDirectory;

use super::assignment::{AssignmentEngine, AssignmentOutcome};
use super::connection::Connection;
use super::dispatcher::{deliver, EventDispatcher};
use super::events::ServerEvent;
use super::lifecycle::{Admission, ConnectionPhase, CustomerRouting, Handshake};
use super::presence::{AdminPresence, OnlineAgent, PresenceRegistry, PresenceStats};

/// How a connection ended up registered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    Agent,
    Customer(AssignmentOutcome),
    Admin {
        /// Previous admin presence, left open but no longer treated as the admin
        replaced: Option<AdminPresence>,
    },
    /// The connection closed before registration could be committed
    Discarded,
}

/// Global WebSocket state shared across all connections
#[derive(Clone)]
pub struct WebSocketState {
    pub registry: Arc<PresenceRegistry>,
    pub dispatcher: Arc<EventDispatcher>,
    engine: Arc<AssignmentEngine>,
    verifier: Arc<dyn IdentityVerifier>,
    directory: Arc<dyn AgentDirectory>,
}

impl WebSocketState {
    /// Create new WebSocket state
    pub fn new(
        verifier: Arc<dyn IdentityVerifier>,
        directory: Arc<dyn AgentDirectory>,
        chats: Arc<dyn ChatContinuation>,
    ) -> Self {
        Self {
            registry: Arc::new(PresenceRegistry::new()),
            dispatcher: Arc::new(EventDispatcher::new()),
            engine: Arc::new(AssignmentEngine::new(chats)),
            verifier,
            directory,
        }
    }

    /// Verify the handshake of a fresh connection
    ///
    /// Rejections happen before any registry access; customer parameters are only
    /// checked once the credential is known to be valid.
    pub async fn admit(&self, conn: &Connection, handshake: &Handshake) -> DeskResult<Admission> {
        conn.advance(ConnectionPhase::Verifying).await;

        match self.verify(handshake).await {
            Ok(admission) => {
                conn.advance(ConnectionPhase::RoleDispatch(admission.subject.role))
                    .await;
                Ok(admission)
            }
            Err(e) => {
                conn.advance(ConnectionPhase::Rejected).await;
                tracing::warn!(
                    connection_id = %conn.connection_id,
                    error = %e,
                    "Connection rejected during verification"
                );
                Err(e)
            }
        }
    }

    async fn verify(&self, handshake: &Handshake) -> DeskResult<Admission> {
        let token = handshake.credential()?;
        let subject = self.verifier.verify_credential(token).await?;
        let customer = match subject.role {
            Role::Customer => Some(handshake.customer_routing()?),
            Role::Agent | Role::Admin => None,
        };

        Ok(Admission { subject, customer })
    }

    /// Register an admitted connection under its role
    pub async fn register(
        &self,
        conn: Arc<Connection>,
        admission: Admission,
    ) -> DeskResult<Registration> {
        let result = match (admission.subject.role, admission.customer) {
            (Role::Agent, _) => self.register_agent(&conn, admission.subject).await,
            (Role::Customer, Some(routing)) => {
                self.register_customer(&conn, admission.subject, routing).await
            }
            (Role::Customer, None) => Err(DeskError::MalformedCustomerParams(
                "customer admitted without routing parameters".into(),
            )),
            (Role::Admin, _) => self.register_admin(&conn, admission.subject).await,
        };

        if let Err(e) = &result {
            conn.advance(ConnectionPhase::Rejected).await;
            tracing::warn!(
                connection_id = %conn.connection_id,
                user_id = %admission.subject.id,
                role = %admission.subject.role,
                error = %e,
                "Connection registration failed"
            );
        }

        result
    }

    async fn register_agent(
        &self,
        conn: &Arc<Connection>,
        subject: Subject,
    ) -> DeskResult<Registration> {
        let routing = self
            .directory
            .get_agent_routing(subject.id)
            .await
            .map_err(|e| match e {
                DeskError::RoutingLookupFailed(_) => e,
                other => DeskError::RoutingLookupFailed(other.to_string()),
            })?;

        let mut registries = self.registry.lock().await;
        if conn.is_closed().await {
            return Ok(Registration::Discarded);
        }

        registries.add_agent(OnlineAgent {
            agent_id: subject.id,
            connection_id: conn.connection_id,
            assigned_departments: routing.assigned_departments,
        });
        self.commit(conn, Role::Agent).await;

        tracing::info!(
            connection_id = %conn.connection_id,
            agent_id = %subject.id,
            online_agents = registries.stats().online_agents,
            "Agent registered"
        );

        Ok(Registration::Agent)
    }

    async fn register_customer(
        &self,
        conn: &Arc<Connection>,
        subject: Subject,
        routing: CustomerRouting,
    ) -> DeskResult<Registration> {
        let mut registries = self.registry.lock().await;
        let outcome = self
            .engine
            .assign(&mut registries, conn, subject.id, routing)
            .await?;

        if outcome == AssignmentOutcome::Discarded {
            return Ok(Registration::Discarded);
        }
        self.commit(conn, Role::Customer).await;
        self.engine
            .announce(&self.dispatcher, conn, subject.id, routing, &outcome)
            .await;

        Ok(Registration::Customer(outcome))
    }

    async fn register_admin(
        &self,
        conn: &Arc<Connection>,
        subject: Subject,
    ) -> DeskResult<Registration> {
        let mut registries = self.registry.lock().await;
        if conn.is_closed().await {
            return Ok(Registration::Discarded);
        }

        let replaced = registries.set_admin(AdminPresence {
            connection_id: conn.connection_id,
            user_id: subject.id,
        });
        self.commit(conn, Role::Admin).await;

        if let Some(previous) = replaced {
            tracing::info!(
                connection_id = %conn.connection_id,
                replaced_connection_id = %previous.connection_id,
                "Admin presence replaced; previous connection left open"
            );
        } else {
            tracing::info!(
                connection_id = %conn.connection_id,
                user_id = %subject.id,
                "Admin registered"
            );
        }

        Ok(Registration::Admin { replaced })
    }

    /// Must run while the registry guard is held, so `connected` is the first frame
    /// the connection sees
    async fn commit(&self, conn: &Arc<Connection>, role: Role) {
        conn.advance(ConnectionPhase::Registered(role)).await;
        self.dispatcher.attach(Arc::clone(conn)).await;
        deliver(
            conn,
            ServerEvent::Connected {
                connection_id: conn.connection_id,
                role,
            },
        );
    }

    /// Close a connection and remove it from the registry of its role
    pub async fn disconnect(&self, conn: &Connection) {
        let role = conn.close().await;

        // Waits for any in-flight registration holding the registry lock
        let mut registries = self.registry.lock().await;
        if let Some(role) = role {
            self.dispatcher
                .cleanup(&mut registries, conn.connection_id, role);
        }
        drop(registries);

        self.dispatcher.detach(conn.connection_id).await;
        tracing::info!(connection_id = %conn.connection_id, "WebSocket connection removed");
    }

    /// Get statistics about the WebSocket state
    pub async fn get_stats(&self) -> WebSocketStats {
        WebSocketStats {
            presence: self.registry.stats().await,
            active_connections: self.dispatcher.connection_count().await,
        }
    }
}

/// Statistics about WebSocket connections
#[derive(Debug, Clone, Serialize)]
pub struct WebSocketStats {
    #[serde(flatten)]
    pub presence: PresenceStats,
    /// Number of registered connections
    pub active_connections: usize,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::chats::ChatKey;
    use async_trait::async_trait;
    use livedesk_shared::{AgentRouting, ChatRecord, DepartmentId, UserId};
    use tokio::sync::mpsc;

    struct StaticVerifier;

    #[async_trait]
    impl IdentityVerifier for StaticVerifier {
        // Tokens look like "<role>:<id>"
        async fn verify_credential(&self, token: &str) -> DeskResult<Subject> {
            let (role, id) = token.split_once(':').ok_or(DeskError::InvalidCredential)?;
            let role = match role {
                "agent" => Role::Agent,
                "customer" => Role::Customer,
                "admin" => Role::Admin,
                _ => return Err(DeskError::InvalidCredential),
            };
            let id = id.parse().map_err(|_| DeskError::InvalidCredential)?;
            Ok(Subject { id: UserId(id), role })
        }
    }

    struct StaticDirectory;

    #[async_trait]
    impl AgentDirectory for StaticDirectory {
        async fn get_agent_routing(&self, agent_id: UserId) -> DeskResult<AgentRouting> {
            match agent_id.0 {
                7 => Ok(AgentRouting::new([DepartmentId(3)])),
                _ => Err(DeskError::RoutingLookupFailed("unknown agent".into())),
            }
        }
    }

    struct NoChats;

    #[async_trait]
    impl ChatContinuation for NoChats {
        async fn has_unresolved_chat(&self, _key: ChatKey) -> DeskResult<bool> {
            Ok(false)
        }

        async fn create_chat(&self, _key: ChatKey) -> DeskResult<Option<ChatRecord>> {
            Ok(None)
        }
    }

    struct OpenChats;

    #[async_trait]
    impl ChatContinuation for OpenChats {
        async fn has_unresolved_chat(&self, _key: ChatKey) -> DeskResult<bool> {
            Ok(false)
        }

        async fn create_chat(&self, key: ChatKey) -> DeskResult<Option<ChatRecord>> {
            Ok(Some(ChatRecord {
                id: 1,
                agent_id: key.agent_id,
                customer_id: key.customer_id,
                department_id: key.department_id,
                category_id: key.category_id,
                is_resolved: false,
                created_at: time::OffsetDateTime::now_utc(),
            }))
        }
    }

    fn ws_state() -> WebSocketState {
        WebSocketState::new(
            Arc::new(StaticVerifier),
            Arc::new(StaticDirectory),
            Arc::new(NoChats),
        )
    }

    fn handshake(token: &str, department: Option<&str>) -> Handshake {
        Handshake {
            token: Some(token.to_string()),
            department_id: department.map(String::from),
            category_id: Some("1".to_string()),
        }
    }

    fn connection() -> (Arc<Connection>, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Connection::new(tx)), rx)
    }

    async fn open(
        state: &WebSocketState,
        hs: &Handshake,
    ) -> DeskResult<(Arc<Connection>, Registration)> {
        let (conn, _rx) = connection();
        let admission = state.admit(&conn, hs).await?;
        let registration = state.register(Arc::clone(&conn), admission).await?;
        Ok((conn, registration))
    }

    #[tokio::test]
    async fn test_invalid_credential_rejected() {
        let state = ws_state();
        let (conn, _rx) = connection();

        let err = state
            .admit(&conn, &handshake("intruder:1", None))
            .await
            .unwrap_err();
        assert!(matches!(err, DeskError::InvalidCredential));
        assert_eq!(conn.phase().await, ConnectionPhase::Rejected);

        let err = state.admit(&conn, &Handshake::default()).await.unwrap_err();
        assert!(matches!(err, DeskError::InvalidCredential));
    }

    #[tokio::test]
    async fn test_malformed_customer_params_rejected() {
        let state = ws_state();
        let result = open(&state, &handshake("customer:42", Some("zero"))).await;

        assert!(matches!(result, Err(DeskError::MalformedCustomerParams(_))));
        assert_eq!(state.get_stats().await.presence.online_customers, 0);
    }

    #[tokio::test]
    async fn test_agent_with_unknown_routing_is_not_registered() {
        let state = ws_state();
        let (conn, _rx) = connection();
        let admission = state.admit(&conn, &handshake("agent:99", None)).await.unwrap();

        let result = state.register(Arc::clone(&conn), admission).await;
        assert!(matches!(result, Err(DeskError::RoutingLookupFailed(_))));
        assert_eq!(conn.phase().await, ConnectionPhase::Rejected);
        assert_eq!(state.get_stats().await.presence.online_agents, 0);
    }

    #[tokio::test]
    async fn test_registration_sends_connected_event() {
        let state = ws_state();
        let (conn, mut rx) = connection();
        let admission = state.admit(&conn, &handshake("agent:7", None)).await.unwrap();

        let registration = state.register(Arc::clone(&conn), admission).await.unwrap();
        assert_eq!(registration, Registration::Agent);
        assert_eq!(conn.phase().await, ConnectionPhase::Registered(Role::Agent));
        assert_eq!(
            rx.try_recv().unwrap(),
            ServerEvent::Connected {
                connection_id: conn.connection_id,
                role: Role::Agent,
            }
        );
    }

    #[tokio::test]
    async fn test_admin_replacement_and_stale_disconnect() {
        let state = ws_state();
        let (first, _) = open(&state, &handshake("admin:1", None)).await.unwrap();
        let (second, registration) = open(&state, &handshake("admin:2", None)).await.unwrap();

        assert!(matches!(
            registration,
            Registration::Admin { replaced: Some(previous) }
                if previous.connection_id == first.connection_id
        ));

        // The orphaned admin disconnecting must not clear the current admin
        state.disconnect(&first).await;
        let admin = state.registry.admin().await.unwrap();
        assert_eq!(admin.connection_id, second.connection_id);

        state.disconnect(&second).await;
        assert!(state.registry.admin().await.is_none());
    }

    #[tokio::test]
    async fn test_disconnect_before_registration_discards() {
        let state = ws_state();
        let (conn, _rx) = connection();
        let admission = state.admit(&conn, &handshake("agent:7", None)).await.unwrap();

        state.disconnect(&conn).await;
        let registration = state.register(Arc::clone(&conn), admission).await.unwrap();

        assert_eq!(registration, Registration::Discarded);
        let stats = state.get_stats().await;
        assert_eq!(stats.presence.online_agents, 0);
        assert_eq!(stats.active_connections, 0);
    }

    #[tokio::test]
    async fn test_stats_serialization() {
        let state = ws_state();
        open(&state, &handshake("agent:7", None)).await.unwrap();
        open(&state, &handshake("customer:42", Some("3"))).await.unwrap();

        let json = serde_json::to_value(state.get_stats().await).unwrap();
        assert_eq!(json["online_agents"], 1);
        assert_eq!(json["online_customers"], 1);
        assert_eq!(json["waiting_customers"], 1);
        assert_eq!(json["admin_online"], false);
        assert_eq!(json["active_connections"], 2);
    }

    #[tokio::test]
    async fn test_connected_precedes_assignment_events() {
        let state = WebSocketState::new(
            Arc::new(StaticVerifier),
            Arc::new(StaticDirectory),
            Arc::new(OpenChats),
        );
        let (agent, mut agent_rx) = connection();
        let admission = state.admit(&agent, &handshake("agent:7", None)).await.unwrap();
        state.register(Arc::clone(&agent), admission).await.unwrap();

        let (customer, mut customer_rx) = connection();
        let admission = state
            .admit(&customer, &handshake("customer:42", Some("3")))
            .await
            .unwrap();
        let registration = state.register(Arc::clone(&customer), admission).await.unwrap();
        assert!(matches!(
            registration,
            Registration::Customer(AssignmentOutcome::Assigned { .. })
        ));

        assert_eq!(
            customer_rx.try_recv().unwrap(),
            ServerEvent::Connected {
                connection_id: customer.connection_id,
                role: Role::Customer,
            }
        );
        assert_eq!(
            customer_rx.try_recv().unwrap(),
            ServerEvent::AgentAssigned {
                department_id: DepartmentId(3),
                agent_id: UserId(7),
            }
        );

        assert!(matches!(agent_rx.try_recv().unwrap(), ServerEvent::Connected { .. }));
        assert!(matches!(
            agent_rx.try_recv().unwrap(),
            ServerEvent::CustomerAssigned { .. }
        ));
    }
}
