//! Session registry and transport contracts, plus the in-process WebSocket
//! connection manager that implements both.
//!
//! The core only observes sessions: connect and disconnect are driven by the
//! WebSocket handler, which registers and unregisters with the manager.

mod registry;
mod types;

use async_trait::async_trait;

use crate::notification::NotificationMessage;

pub use registry::{ConnectionManager, ConnectionStats};
pub use types::ConnectionHandle;

/// Read-only view of which sessions are attached to this node.
pub trait SessionRegistry: Send + Sync {
    /// Whether the user has at least one live session on this node.
    fn has_session(&self, user_id: &str) -> bool;

    /// Session ids of the user. Empty if the user is absent.
    fn sessions_of(&self, user_id: &str) -> Vec<String>;

    /// Users with at least one live session.
    fn all_users(&self) -> Vec<String>;

    /// Whether this exact session of the user is still live.
    fn has_exact_session(&self, user_id: &str, session_id: &str) -> bool {
        self.sessions_of(user_id).iter().any(|s| s == session_id)
    }
}

/// Errors returned by a [`Transport`] send.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("user has no live sessions: {0}")]
    NoSessions(String),

    #[error("session channel closed: {0}")]
    ChannelClosed(String),

    /// Outbound buffer full; the client is not reading. Worth retrying later.
    #[error("session buffer full: {0}")]
    Backpressure(String),
}

/// Outbound delivery path to connected clients.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver to one session, or to every session of the user when
    /// `session_id` is `None`. Returns the number of sessions reached.
    async fn send(
        &self,
        user_id: &str,
        session_id: Option<&str>,
        message: &NotificationMessage,
    ) -> Result<usize, TransportError>;

    fn user_has_sessions(&self, user_id: &str) -> bool;
}
