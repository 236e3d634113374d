//! API routes

pub mod health;
pub mod presence;

use axum::{extract::DefaultBodyLimit, routing::get, Router};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::{state::AppState, websocket::ws_handler};

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    // Admin-only presence statistics (bearer token checked in handler)
    let presence_routes = Router::new().route("/presence/stats", get(presence::get_presence_stats));

    // WebSocket routes (auth handled in handler via query parameter)
    let websocket_routes = Router::new().route("/ws/support", get(ws_handler));

    let api_v1_routes = Router::new()
        .merge(presence_routes)
        .merge(websocket_routes);

    Router::new()
        .merge(health_routes)
        .nest("/api/v1", api_v1_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                // Only small JSON bodies and upgrade requests are expected
                .layer(DefaultBodyLimit::max(64 * 1024)),
        )
        .with_state(state)
}
