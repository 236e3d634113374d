//! WebSocket support for live support chat
//!
//! Tracks which agents, customers and the administrator are connected and pairs
//! newly connected customers with an agent serving their department.
//!
//! # Architecture
//!
//! - **Lifecycle**: Handshake parameters and the per-connection state machine
//! - **Connection**: One transport connection and its lifecycle phase
//! - **Presence**: Registry of online agents, customers and the admin slot
//! - **Assignment**: Customer-to-agent matching and chat continuation
//! - **Dispatcher**: Targeted event delivery and disconnect cleanup
//! - **State**: Global WebSocket state shared across all connections
//! - **Handler**: Axum WebSocket route handler
//! - **Events**: Type-safe event definitions for client/server communication

pub mod assignment;
pub mod connection;
pub mod dispatcher;
pub mod events;
pub mod handler;
pub mod lifecycle;
pub mod presence;
pub mod state;

pub use handler::ws_handler;
pub use state::{Registration, WebSocketState, WebSocketStats};
