//! Presence statistics for the support administrator

use axum::{extract::State, http::HeaderMap, Json};
use livedesk_shared::Role;

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
    websocket::WebSocketStats,
};

/// Current presence counts. Requires an admin bearer token.
pub async fn get_presence_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<WebSocketStats>> {
    let token = bearer_token(&headers).ok_or(ApiError::InvalidToken)?;
    let subject = state.verifier.verify_credential(token).await?;
    if subject.role != Role::Admin {
        tracing::warn!(user_id = %subject.id, role = %subject.role, "Presence stats denied");
        return Err(ApiError::InvalidToken);
    }

    Ok(Json(state.ws_state.get_stats().await))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}
