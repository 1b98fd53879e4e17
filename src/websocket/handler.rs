use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::connection_manager::ConnectionHandle;
use crate::server::AppState;

use super::message::{ClientMessage, ServerMessage};

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub user_id: Option<String>,
}

/// WebSocket upgrade handler
#[tracing::instrument(name = "ws.upgrade", skip(ws, state, query))]
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
) -> Response {
    let user_id = match query.user_id {
        Some(id) if !id.trim().is_empty() => id,
        _ => {
            return (StatusCode::BAD_REQUEST, "Missing user_id query parameter").into_response();
        }
    };

    tracing::info!(user_id = %user_id, "WebSocket upgrade requested");

    ws.on_upgrade(move |socket| handle_socket(socket, state, user_id))
}

/// Handle an established WebSocket connection
#[tracing::instrument(name = "ws.connection", skip(socket, state))]
async fn handle_socket(socket: WebSocket, state: AppState, user_id: String) {
    let connection_start = std::time::Instant::now();

    let (tx, mut rx) = mpsc::channel::<ServerMessage>(state.settings.websocket.channel_buffer);
    let handle = state.connection_manager.register(user_id.clone(), tx);
    let session_id = handle.id.clone();

    tracing::info!(
        session_id = %session_id,
        user_id = %user_id,
        "WebSocket connection established"
    );

    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Task for sending messages from channel to WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let text = match serde_json::to_string(&msg) {
                Ok(t) => t,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize message");
                    continue;
                }
            };

            if ws_sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // Task for receiving messages from WebSocket
    let state_clone = state.clone();
    let handle_clone = handle.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(msg) => {
                    if !process_message(msg, &state_clone, &handle_clone).await {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    });

    // Wait for either task to complete
    tokio::select! {
        _ = send_task => {
            tracing::debug!(session_id = %session_id, "Send task completed");
        }
        _ = recv_task => {
            tracing::debug!(session_id = %session_id, "Receive task completed");
        }
    }

    // Pending ACK records for this session stay in the store and expire there
    state.connection_manager.unregister(&session_id);

    tracing::info!(
        session_id = %session_id,
        user_id = %user_id,
        duration_secs = connection_start.elapsed().as_secs_f64(),
        "WebSocket connection closed"
    );
}

/// Process a received WebSocket message
/// Returns false if the connection should be closed
async fn process_message(msg: Message, state: &AppState, handle: &Arc<ConnectionHandle>) -> bool {
    match msg {
        Message::Text(text) => {
            let client_msg: ClientMessage = match serde_json::from_str(&text) {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to parse client message");
                    reply(handle, ServerMessage::error("INVALID_MESSAGE", e.to_string()));
                    return true;
                }
            };

            handle_client_message(client_msg, state, handle).await;
            true
        }
        Message::Binary(_) => {
            reply(
                handle,
                ServerMessage::error("UNSUPPORTED_FORMAT", "Binary messages are not supported"),
            );
            true
        }
        // Axum answers pings itself
        Message::Ping(_) | Message::Pong(_) => true,
        Message::Close(_) => {
            tracing::debug!(session_id = %handle.id, "Received close frame");
            false
        }
    }
}

/// Handle a parsed client message
#[tracing::instrument(
    name = "ws.message",
    skip(state, handle),
    fields(session_id = %handle.id, user_id = %handle.user_id)
)]
async fn handle_client_message(msg: ClientMessage, state: &AppState, handle: &Arc<ConnectionHandle>) {
    match msg {
        ClientMessage::Ping => {
            reply(handle, ServerMessage::Pong);
        }
        ClientMessage::Ack { message_id } => {
            // The session is the one this frame arrived on, never client-supplied
            let acknowledged = state
                .dispatcher
                .acknowledge(&handle.user_id, &message_id, &handle.id)
                .await;
            reply(handle, ServerMessage::ack_result(message_id, acknowledged));
        }
    }
}

/// Best-effort control frame back to the client; dropped if its buffer is full.
fn reply(handle: &ConnectionHandle, message: ServerMessage) {
    if let Err(e) = handle.send(message) {
        tracing::debug!(session_id = %handle.id, error = %e, "Dropped reply frame");
    }
}
