//! WebSocket handler for Axum
//!
//! Verifies the handshake, upgrades the connection, registers it and routes
//! incoming frames until the client goes away.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::fmt::Display;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::ApiResult;
use crate::state::AppState;

use super::{
    connection::Connection,
    events::{ClientEvent, ServerEvent},
    lifecycle::{Admission, Handshake},
    state::WebSocketState,
};

/// WebSocket handler - upgrades HTTP connection to WebSocket
/// Authenticates via query parameter token; rejected handshakes never reach the upgrade
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<AppState>,
    Query(handshake): Query<Handshake>,
) -> ApiResult<Response> {
    let ws_state = app_state.ws_state.clone();

    // Create channel for sending events to this connection
    let (tx, rx) = mpsc::unbounded_channel::<ServerEvent>();
    let conn = Arc::new(Connection::new(tx));

    let admission = ws_state.admit(&conn, &handshake).await?;

    tracing::info!(
        connection_id = %conn.connection_id,
        user_id = %admission.subject.id,
        role = %admission.subject.role,
        "WebSocket connection upgrade requested"
    );

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, conn, rx, admission, ws_state)))
}

/// Handle individual WebSocket connection
async fn handle_socket(
    socket: WebSocket,
    conn: Arc<Connection>,
    rx: mpsc::UnboundedReceiver<ServerEvent>,
    admission: Admission,
    ws_state: WebSocketState,
) {
    let (sender, receiver) = socket.split();
    run_session(sender, receiver, conn, rx, admission, ws_state).await;
}

/// Drive one admitted connection over a frame sink and stream until the client goes away
pub(crate) async fn run_session<Tx, Rx, E>(
    mut sender: Tx,
    mut receiver: Rx,
    conn: Arc<Connection>,
    mut rx: mpsc::UnboundedReceiver<ServerEvent>,
    admission: Admission,
    ws_state: WebSocketState,
) where
    Tx: Sink<Message> + Unpin + Send + 'static,
    Rx: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let connection_id = conn.connection_id;

    // Forward events to the client; closes the socket once every event sender is gone
    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if sender.send(Message::Text(json)).await.is_err() {
                        return; // Connection closed
                    }
                }
                Err(e) => {
                    tracing::error!(error = ?e, "Failed to serialize WebSocket event");
                }
            }
        }
        let _ = sender.send(Message::Close(None)).await;
    });

    // Register, unless the client hangs up first
    let register = ws_state.register(Arc::clone(&conn), admission);
    tokio::pin!(register);

    let result = loop {
        tokio::select! {
            result = &mut register => break result,
            closed = wait_for_close(&mut receiver) => {
                if closed {
                    tracing::info!(
                        connection_id = %connection_id,
                        "Client closed during registration"
                    );
                    // Closing first makes the pending registration discard itself
                    let (_, result) = tokio::join!(ws_state.disconnect(&conn), &mut register);
                    tracing::debug!(
                        connection_id = %connection_id,
                        ?result,
                        "Pending registration settled"
                    );
                    drop(conn);
                    let _ = send_task.await;
                    return;
                }
            }
        }
    };

    match result {
        Ok(registration) => {
            tracing::debug!(connection_id = %connection_id, ?registration, "Connection registered");
        }
        Err(e) => {
            tracing::warn!(
                connection_id = %connection_id,
                error = %e,
                "Closing connection after failed registration"
            );
            // Dropping the last event sender lets the send task close the socket
            drop(conn);
            let _ = send_task.await;
            return;
        }
    }

    // Handle incoming messages
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => handle_client_event(event, &conn),
                Err(e) => {
                    tracing::warn!(
                        error = ?e,
                        message = %text,
                        "Failed to parse client event"
                    );
                    let _ = conn.send(ServerEvent::Error {
                        message: "Invalid event format".to_string(),
                    });
                }
            },
            Ok(Message::Close(_)) => {
                tracing::info!(connection_id = %connection_id, "WebSocket close frame received");
                break;
            }
            // Axum answers pings itself; binary frames are ignored
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(connection_id = %connection_id, error = %e, "WebSocket read failed");
                break;
            }
        }
    }

    // Cleanup on disconnect
    tracing::info!(connection_id = %connection_id, "WebSocket connection closing");
    ws_state.disconnect(&conn).await;

    drop(conn);
    let _ = send_task.await;
}

/// Read frames while registration is pending. Returns true once the client is gone;
/// frames received in the meantime are dropped.
async fn wait_for_close<Rx, E>(receiver: &mut Rx) -> bool
where
    Rx: Stream<Item = Result<Message, E>> + Unpin,
{
    match receiver.next().await {
        None | Some(Err(_)) | Some(Ok(Message::Close(_))) => true,
        Some(Ok(_)) => false,
    }
}

/// Handle client event
fn handle_client_event(event: ClientEvent, conn: &Connection) {
    match event {
        ClientEvent::Ping => {
            let _ = conn.send(ServerEvent::Pong);
        }
    }
}
