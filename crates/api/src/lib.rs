//! LiveDesk API Library
//!
//! Presence tracking and customer-to-agent assignment for live support chat.

pub mod auth;
pub mod chats;
pub mod config;
pub mod directory;
pub mod error;
pub mod routes;
pub mod state;
pub mod websocket;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppState;
