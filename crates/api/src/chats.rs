//! Chat continuation: detects unresolved chats and creates new ones

use async_trait::async_trait;
use livedesk_shared::{CategoryId, ChatRecord, DepartmentId, DeskError, DeskResult, UserId};
use sqlx::PgPool;

/// Key identifying a chat between one agent and one customer for one topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChatKey {
    pub agent_id: UserId,
    pub customer_id: UserId,
    pub department_id: DepartmentId,
    pub category_id: CategoryId,
}

/// Durable store of agent <-> customer chats
#[async_trait]
pub trait ChatContinuation: Send + Sync {
    /// Whether a chat for this key exists and has not been resolved
    async fn has_unresolved_chat(&self, key: ChatKey) -> DeskResult<bool>;

    /// Durably create a chat. `Ok(None)` means the store declined to create one.
    async fn create_chat(&self, key: ChatKey) -> DeskResult<Option<ChatRecord>>;
}

/// Postgres-backed chat store
#[derive(Clone)]
pub struct PgChatStore {
    pool: PgPool,
}

impl PgChatStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChatContinuation for PgChatStore {
    async fn has_unresolved_chat(&self, key: ChatKey) -> DeskResult<bool> {
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
              SELECT 1 FROM support_chats
              WHERE agent_id = $1
                AND customer_id = $2
                AND department_id = $3
                AND category_id = $4
                AND is_resolved = FALSE
            )
            "#,
        )
        .bind(key.agent_id)
        .bind(key.customer_id)
        .bind(key.department_id)
        .bind(key.category_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = ?e, ?key, "Unresolved chat lookup failed");
            DeskError::ContinuationQueryFailed(e.to_string())
        })
    }

    async fn create_chat(&self, key: ChatKey) -> DeskResult<Option<ChatRecord>> {
        // The partial unique index turns a concurrent duplicate into "no row"
        sqlx::query_as::<_, ChatRecord>(
            r#"
            INSERT INTO support_chats (agent_id, customer_id, department_id, category_id)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT DO NOTHING
            RETURNING id, agent_id, customer_id, department_id, category_id, is_resolved, created_at
            "#,
        )
        .bind(key.agent_id)
        .bind(key.customer_id)
        .bind(key.department_id)
        .bind(key.category_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = ?e, ?key, "Chat creation failed");
            DeskError::ContinuationQueryFailed(e.to_string())
        })
    }
}
