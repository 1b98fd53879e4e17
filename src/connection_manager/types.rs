//! Connection handle for one WebSocket session

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use crate::websocket::ServerMessage;

/// Handle for a single WebSocket session
pub struct ConnectionHandle {
    /// Session id, unique per connection and used in ACK keys
    pub id: String,
    pub user_id: String,
    pub sender: mpsc::Sender<ServerMessage>,
}

impl ConnectionHandle {
    pub fn new(user_id: String, sender: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            sender,
        }
    }

    /// Queue a frame for the socket writer without waiting.
    ///
    /// A session whose buffer is full gets `TrySendError::Full`; callers treat
    /// that as a failed attempt and never wait for the client to drain.
    pub fn send(&self, message: ServerMessage) -> Result<(), TrySendError<ServerMessage>> {
        self.sender.try_send(message)
    }
}
