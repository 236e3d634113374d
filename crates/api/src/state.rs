//! Shared application state

use std::sync::Arc;

use sqlx::PgPool;

use crate::auth::{IdentityVerifier, JwtManager};
use crate::chats::PgChatStore;
use crate::config::Config;
use crate::directory::PgAgentDirectory;
use crate::websocket::WebSocketState;

/// State handed to every axum handler
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub verifier: Arc<dyn IdentityVerifier>,
    pub ws_state: WebSocketState,
}

impl AppState {
    /// Wire the Postgres-backed collaborators and the JWT verifier
    pub fn new(config: &Config, pool: PgPool) -> Self {
        let verifier: Arc<dyn IdentityVerifier> =
            Arc::new(JwtManager::new(&config.jwt_secret, config.jwt_leeway_secs));
        let ws_state = WebSocketState::new(
            Arc::clone(&verifier),
            Arc::new(PgAgentDirectory::new(pool.clone())),
            Arc::new(PgChatStore::new(pool.clone())),
        );

        Self {
            pool,
            verifier,
            ws_state,
        }
    }
}
