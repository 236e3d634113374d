//! Agent directory: which departments an agent may be routed to

use async_trait::async_trait;
use livedesk_shared::{AgentRouting, DepartmentId, DeskError, DeskResult, UserId};
use sqlx::PgPool;

/// Looks up the routing assignment of an agent
#[async_trait]
pub trait AgentDirectory: Send + Sync {
    /// Fails with `DeskError::RoutingLookupFailed` when the agent is unknown or the
    /// lookup itself errors
    async fn get_agent_routing(&self, agent_id: UserId) -> DeskResult<AgentRouting>;
}

/// Postgres-backed agent directory
#[derive(Clone)]
pub struct PgAgentDirectory {
    pool: PgPool,
}

impl PgAgentDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AgentDirectory for PgAgentDirectory {
    async fn get_agent_routing(&self, agent_id: UserId) -> DeskResult<AgentRouting> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM support_agents WHERE id = $1 AND is_active)",
        )
        .bind(agent_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = ?e, agent_id = %agent_id, "Agent lookup failed");
            DeskError::RoutingLookupFailed(e.to_string())
        })?;

        if !exists {
            return Err(DeskError::RoutingLookupFailed(format!(
                "agent {agent_id} not found"
            )));
        }

        let departments = sqlx::query_scalar::<_, DepartmentId>(
            r#"
            SELECT department_id
            FROM support_agent_departments
            WHERE agent_id = $1
            ORDER BY department_id
            "#,
        )
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = ?e, agent_id = %agent_id, "Department lookup failed");
            DeskError::RoutingLookupFailed(e.to_string())
        })?;

        Ok(AgentRouting::new(departments))
    }
}
