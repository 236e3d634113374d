//! Assignment engine
//!
//! Pairs a newly connected customer with an online agent serving the customer's
//! department. The caller passes in the registry guard, so the scan, the chat
//! continuation calls and the final registration are one critical section.
//!
//! Waiting customers are not re-scanned when an agent for their department comes
//! online later; they stay unassigned until they reconnect.

use std::sync::Arc;

use livedesk_shared::{ChatRecord, ConnectionId, DeskError, DeskResult, UserId};

use crate::chats::{ChatContinuation, ChatKey};

use super::connection::Connection;
use super::dispatcher::{deliver, EventDispatcher};
use super::events::ServerEvent;
use super::lifecycle::CustomerRouting;
use super::presence::{OnlineCustomer, Registries};

/// Result of one assignment run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignmentOutcome {
    /// No online agent serves the department
    Waiting,
    /// An unresolved chat with the matched agent already exists
    Resumed {
        agent_id: UserId,
        agent_connection: ConnectionId,
    },
    /// A new chat was created with the matched agent
    Assigned {
        agent_id: UserId,
        agent_connection: ConnectionId,
        chat: ChatRecord,
    },
    /// The chat store returned no record; the customer stays unassigned
    Declined { agent_id: UserId },
    /// The customer disconnected before the registration could be committed
    Discarded,
}

impl AssignmentOutcome {
    pub fn is_agent_assigned(&self) -> bool {
        matches!(
            self,
            AssignmentOutcome::Resumed { .. } | AssignmentOutcome::Assigned { .. }
        )
    }
}

pub struct AssignmentEngine {
    chats: Arc<dyn ChatContinuation>,
}

impl AssignmentEngine {
    pub fn new(chats: Arc<dyn ChatContinuation>) -> Self {
        Self { chats }
    }

    /// Decide and register for one customer connection
    ///
    /// On error nothing has been written to the registry. Events for the outcome are
    /// emitted separately by [`AssignmentEngine::announce`], still under the same guard.
    pub async fn assign(
        &self,
        registries: &mut Registries,
        customer: &Connection,
        user_id: UserId,
        routing: CustomerRouting,
    ) -> DeskResult<AssignmentOutcome> {
        let candidate = registries
            .find_agent_for_department(routing.department_id)
            .map(|agent| (agent.agent_id, agent.connection_id));

        let outcome = match candidate {
            None => AssignmentOutcome::Waiting,
            Some((agent_id, agent_connection)) => {
                let key = ChatKey {
                    agent_id,
                    customer_id: user_id,
                    department_id: routing.department_id,
                    category_id: routing.category_id,
                };

                if self
                    .chats
                    .has_unresolved_chat(key)
                    .await
                    .map_err(continuation_failed)?
                {
                    AssignmentOutcome::Resumed {
                        agent_id,
                        agent_connection,
                    }
                } else {
                    match self.chats.create_chat(key).await.map_err(continuation_failed)? {
                        Some(chat) => AssignmentOutcome::Assigned {
                            agent_id,
                            agent_connection,
                            chat,
                        },
                        None => AssignmentOutcome::Declined { agent_id },
                    }
                }
            }
        };

        if customer.is_closed().await {
            tracing::info!(
                connection_id = %customer.connection_id,
                customer_id = %user_id,
                ?outcome,
                "Customer disconnected during assignment, registration discarded"
            );
            return Ok(AssignmentOutcome::Discarded);
        }

        registries.add_customer(OnlineCustomer {
            user_id,
            connection_id: customer.connection_id,
            department_id: routing.department_id,
            category_id: routing.category_id,
            is_agent_assigned: outcome.is_agent_assigned(),
        });

        tracing::info!(
            connection_id = %customer.connection_id,
            customer_id = %user_id,
            department_id = %routing.department_id,
            category_id = %routing.category_id,
            ?outcome,
            "Customer assignment committed"
        );

        Ok(outcome)
    }

    /// Notify the matched agent (and, for a new chat, the customer) of a committed outcome
    pub async fn announce(
        &self,
        dispatcher: &EventDispatcher,
        customer: &Connection,
        user_id: UserId,
        routing: CustomerRouting,
        outcome: &AssignmentOutcome,
    ) {
        match outcome {
            AssignmentOutcome::Resumed {
                agent_connection, ..
            } => {
                dispatcher
                    .send_to(
                        *agent_connection,
                        ServerEvent::CustomerOnline {
                            customer_id: user_id,
                        },
                    )
                    .await;
            }
            AssignmentOutcome::Assigned {
                agent_id,
                agent_connection,
                ..
            } => {
                dispatcher
                    .send_to(
                        *agent_connection,
                        ServerEvent::CustomerAssigned {
                            department_id: routing.department_id,
                            customer_id: user_id,
                        },
                    )
                    .await;
                deliver(
                    customer,
                    ServerEvent::AgentAssigned {
                        department_id: routing.department_id,
                        agent_id: *agent_id,
                    },
                );
            }
            AssignmentOutcome::Waiting
            | AssignmentOutcome::Declined { .. }
            | AssignmentOutcome::Discarded => {}
        }
    }
}

fn continuation_failed(err: DeskError) -> DeskError {
    match err {
        DeskError::ContinuationQueryFailed(_) => err,
        other => DeskError::ContinuationQueryFailed(other.to_string()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::websocket::presence::{OnlineAgent, PresenceRegistry};
    use async_trait::async_trait;
    use livedesk_shared::{CategoryId, DepartmentId};
    use std::sync::Mutex as StdMutex;
    use time::OffsetDateTime;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct FakeChats {
        unresolved: bool,
        decline: bool,
        fail: bool,
        created: StdMutex<Vec<ChatKey>>,
    }

    #[async_trait]
    impl ChatContinuation for FakeChats {
        async fn has_unresolved_chat(&self, _key: ChatKey) -> DeskResult<bool> {
            if self.fail {
                return Err(DeskError::ContinuationQueryFailed("connection reset".into()));
            }
            Ok(self.unresolved)
        }

        async fn create_chat(&self, key: ChatKey) -> DeskResult<Option<ChatRecord>> {
            self.created.lock().unwrap().push(key);
            if self.decline {
                return Ok(None);
            }
            Ok(Some(ChatRecord {
                id: 1,
                agent_id: key.agent_id,
                customer_id: key.customer_id,
                department_id: key.department_id,
                category_id: key.category_id,
                is_resolved: false,
                created_at: OffsetDateTime::now_utc(),
            }))
        }
    }

    fn routing() -> CustomerRouting {
        CustomerRouting {
            department_id: DepartmentId(3),
            category_id: CategoryId(1),
        }
    }

    /// Assign customer 42 and emit its events under one guard, as registration does
    async fn run(
        engine: &AssignmentEngine,
        registry: &PresenceRegistry,
        dispatcher: &EventDispatcher,
        customer: &Connection,
    ) -> DeskResult<AssignmentOutcome> {
        let mut registries = registry.lock().await;
        let outcome = engine.assign(&mut registries, customer, UserId(42), routing()).await?;
        engine
            .announce(dispatcher, customer, UserId(42), routing(), &outcome)
            .await;
        Ok(outcome)
    }

    async fn setup_agent(
        registry: &PresenceRegistry,
        dispatcher: &EventDispatcher,
    ) -> mpsc::UnboundedReceiver<ServerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = Arc::new(Connection::new(tx));
        registry.lock().await.add_agent(OnlineAgent {
            agent_id: UserId(7),
            connection_id: conn.connection_id,
            assigned_departments: [DepartmentId(3)].into_iter().collect(),
        });
        dispatcher.attach(conn).await;
        rx
    }

    #[tokio::test]
    async fn test_no_matching_agent_waits() {
        let chats = Arc::new(FakeChats::default());
        let engine = AssignmentEngine::new(chats.clone());
        let registry = PresenceRegistry::new();
        let dispatcher = EventDispatcher::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let customer = Connection::new(tx);

        let outcome = run(&engine, &registry, &dispatcher, &customer).await
            .unwrap();

        assert_eq!(outcome, AssignmentOutcome::Waiting);
        let entry = registry.find_customer_by_user_id(UserId(42)).await.unwrap();
        assert!(!entry.is_agent_assigned);
        assert!(rx.try_recv().is_err());
        assert!(chats.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_new_chat_notifies_both_sides() {
        let chats = Arc::new(FakeChats::default());
        let engine = AssignmentEngine::new(chats.clone());
        let registry = PresenceRegistry::new();
        let dispatcher = EventDispatcher::new();
        let mut agent_rx = setup_agent(&registry, &dispatcher).await;
        let (tx, mut customer_rx) = mpsc::unbounded_channel();
        let customer = Connection::new(tx);

        let outcome = run(&engine, &registry, &dispatcher, &customer).await
            .unwrap();

        assert!(matches!(outcome, AssignmentOutcome::Assigned { agent_id: UserId(7), .. }));
        assert_eq!(chats.created.lock().unwrap().len(), 1);
        assert_eq!(
            agent_rx.try_recv().unwrap(),
            ServerEvent::CustomerAssigned {
                department_id: DepartmentId(3),
                customer_id: UserId(42),
            }
        );
        assert_eq!(
            customer_rx.try_recv().unwrap(),
            ServerEvent::AgentAssigned {
                department_id: DepartmentId(3),
                agent_id: UserId(7),
            }
        );
        assert!(agent_rx.try_recv().is_err());
        assert!(customer_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unresolved_chat_is_resumed() {
        let chats = Arc::new(FakeChats {
            unresolved: true,
            ..Default::default()
        });
        let engine = AssignmentEngine::new(chats.clone());
        let registry = PresenceRegistry::new();
        let dispatcher = EventDispatcher::new();
        let mut agent_rx = setup_agent(&registry, &dispatcher).await;
        let (tx, mut customer_rx) = mpsc::unbounded_channel();
        let customer = Connection::new(tx);

        let outcome = run(&engine, &registry, &dispatcher, &customer).await
            .unwrap();

        assert!(matches!(outcome, AssignmentOutcome::Resumed { .. }));
        assert!(chats.created.lock().unwrap().is_empty());
        assert_eq!(
            agent_rx.try_recv().unwrap(),
            ServerEvent::CustomerOnline {
                customer_id: UserId(42)
            }
        );
        assert!(customer_rx.try_recv().is_err());
        assert!(registry
            .find_customer_by_user_id(UserId(42))
            .await
            .unwrap()
            .is_agent_assigned);
    }

    #[tokio::test]
    async fn test_declined_chat_leaves_customer_unassigned() {
        let chats = Arc::new(FakeChats {
            decline: true,
            ..Default::default()
        });
        let engine = AssignmentEngine::new(chats);
        let registry = PresenceRegistry::new();
        let dispatcher = EventDispatcher::new();
        let mut agent_rx = setup_agent(&registry, &dispatcher).await;
        let (tx, _rx) = mpsc::unbounded_channel();
        let customer = Connection::new(tx);

        let outcome = run(&engine, &registry, &dispatcher, &customer).await
            .unwrap();

        assert_eq!(outcome, AssignmentOutcome::Declined { agent_id: UserId(7) });
        assert!(!registry
            .find_customer_by_user_id(UserId(42))
            .await
            .unwrap()
            .is_agent_assigned);
        assert!(agent_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_oracle_failure_leaves_registry_untouched() {
        let chats = Arc::new(FakeChats {
            fail: true,
            ..Default::default()
        });
        let engine = AssignmentEngine::new(chats);
        let registry = PresenceRegistry::new();
        let dispatcher = EventDispatcher::new();
        let _agent_rx = setup_agent(&registry, &dispatcher).await;
        let (tx, _rx) = mpsc::unbounded_channel();
        let customer = Connection::new(tx);

        let result = run(&engine, &registry, &dispatcher, &customer).await;

        assert!(matches!(result, Err(DeskError::ContinuationQueryFailed(_))));
        assert_eq!(registry.stats().await.online_customers, 0);
    }

    #[tokio::test]
    async fn test_closed_customer_is_discarded() {
        let chats = Arc::new(FakeChats::default());
        let engine = AssignmentEngine::new(chats);
        let registry = PresenceRegistry::new();
        let dispatcher = EventDispatcher::new();
        let mut agent_rx = setup_agent(&registry, &dispatcher).await;
        let (tx, _rx) = mpsc::unbounded_channel();
        let customer = Connection::new(tx);
        customer.close().await;

        let outcome = run(&engine, &registry, &dispatcher, &customer).await
            .unwrap();

        assert_eq!(outcome, AssignmentOutcome::Discarded);
        assert_eq!(registry.stats().await.online_customers, 0);
        assert!(agent_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_assign_emits_nothing_before_announce() {
        let chats = Arc::new(FakeChats::default());
        let engine = AssignmentEngine::new(chats);
        let registry = PresenceRegistry::new();
        let dispatcher = EventDispatcher::new();
        let mut agent_rx = setup_agent(&registry, &dispatcher).await;
        let (tx, mut customer_rx) = mpsc::unbounded_channel();
        let customer = Connection::new(tx);

        let mut registries = registry.lock().await;
        let outcome = engine
            .assign(&mut registries, &customer, UserId(42), routing())
            .await
            .unwrap();
        assert!(outcome.is_agent_assigned());
        assert!(agent_rx.try_recv().is_err());
        assert!(customer_rx.try_recv().is_err());

        engine
            .announce(&dispatcher, &customer, UserId(42), routing(), &outcome)
            .await;
        assert!(matches!(
            agent_rx.try_recv().unwrap(),
            ServerEvent::CustomerAssigned { .. }
        ));
        assert!(matches!(
            customer_rx.try_recv().unwrap(),
            ServerEvent::AgentAssigned { .. }
        ));
    }
}
