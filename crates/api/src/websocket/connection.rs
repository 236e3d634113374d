//! WebSocket connection handle
//!
//! Represents one transport connection together with its lifecycle phase.

use livedesk_shared::{ConnectionId, Role};
use tokio::sync::{mpsc, RwLock};

use super::events::ServerEvent;
use super::lifecycle::ConnectionPhase;

/// Represents an active WebSocket connection
#[derive(Debug)]
pub struct Connection {
    /// Unique ID for this connection instance
    pub connection_id: ConnectionId,

    /// Channel to send events to this connection
    pub sender: mpsc::UnboundedSender<ServerEvent>,

    phase: RwLock<ConnectionPhase>,
}

impl Connection {
    /// Create a new connection in the `Connecting` phase
    pub fn new(sender: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self {
            connection_id: ConnectionId::new(),
            sender,
            phase: RwLock::new(ConnectionPhase::Connecting),
        }
    }

    /// Send an event to this connection
    ///
    /// Returns Ok(()) if sent successfully, Err if connection is closed
    #[allow(clippy::result_large_err)] // Error type is from tokio mpsc, containing the failed event
    pub fn send(&self, event: ServerEvent) -> Result<(), mpsc::error::SendError<ServerEvent>> {
        self.sender.send(event)
    }

    /// Current lifecycle phase
    pub async fn phase(&self) -> ConnectionPhase {
        *self.phase.read().await
    }

    /// Move to `next` if the transition is legal. Returns whether the phase changed.
    pub async fn advance(&self, next: ConnectionPhase) -> bool {
        let mut phase = self.phase.write().await;
        if phase.can_advance_to(next) {
            tracing::debug!(
                connection_id = %self.connection_id,
                from = ?*phase,
                to = ?next,
                "Connection phase changed"
            );
            *phase = next;
            true
        } else {
            tracing::warn!(
                connection_id = %self.connection_id,
                from = ?*phase,
                to = ?next,
                "Refused illegal connection phase transition"
            );
            false
        }
    }

    /// Whether the connection reached a terminal phase
    pub async fn is_closed(&self) -> bool {
        self.phase.read().await.is_terminal()
    }

    /// Mark the connection disconnected and return the role captured at dispatch time
    ///
    /// Returns None if the connection never reached role dispatch or was already closed.
    pub async fn close(&self) -> Option<Role> {
        let mut phase = self.phase.write().await;
        let role = phase.role();
        if phase.can_advance_to(ConnectionPhase::Disconnected) {
            *phase = ConnectionPhase::Disconnected;
            role
        } else {
            None
        }
    }
}
