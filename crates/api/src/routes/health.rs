//! Health check endpoints

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use sqlx::PgPool;

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
    websocket::WebSocketStats,
};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub database: &'static str,
    pub presence: WebSocketStats,
}

/// Database reachability plus the current presence counts
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let database_ok = probe_database(&state.pool).await.is_ok();
    let presence = state.ws_state.get_stats().await;

    let (status, label) = if database_ok {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };

    (
        status,
        Json(HealthResponse {
            status: label,
            version: env!("CARGO_PKG_VERSION"),
            database: label,
            presence,
        }),
    )
}

/// Liveness probe
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// Readiness probe: the chat store and agent directory both live in Postgres
pub async fn readiness(State(state): State<AppState>) -> ApiResult<StatusCode> {
    probe_database(&state.pool).await?;
    Ok(StatusCode::OK)
}

async fn probe_database(pool: &PgPool) -> ApiResult<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map(|_| ())
        .map_err(|e| {
            tracing::warn!(error = %e, "Database probe failed");
            ApiError::ServiceUnavailable
        })
}
