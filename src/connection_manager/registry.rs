use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::metrics::ConnectionMetrics;
use crate::notification::NotificationMessage;
use crate::websocket::ServerMessage;

use super::types::ConnectionHandle;
use super::{SessionRegistry, Transport, TransportError};

/// Manages all live WebSocket sessions on this node
pub struct ConnectionManager {
    /// session_id -> ConnectionHandle
    connections: DashMap<String, Arc<ConnectionHandle>>,
    /// user_id -> Set<session_id> (supports multiple devices)
    user_index: DashMap<String, HashSet<String>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            user_index: DashMap::new(),
        }
    }

    /// Register a new session
    pub fn register(&self, user_id: String, sender: mpsc::Sender<ServerMessage>) -> Arc<ConnectionHandle> {
        let handle = Arc::new(ConnectionHandle::new(user_id.clone(), sender));
        let session_id = handle.id.clone();

        self.connections.insert(session_id.clone(), handle.clone());
        self.user_index
            .entry(user_id)
            .or_default()
            .insert(session_id.clone());

        self.update_gauges();
        tracing::info!(session_id = %session_id, user_id = %handle.user_id, "Session registered");

        handle
    }

    /// Unregister a session
    pub fn unregister(&self, session_id: &str) {
        if let Some((_, handle)) = self.connections.remove(session_id) {
            if let Some(mut user_sessions) = self.user_index.get_mut(&handle.user_id) {
                user_sessions.remove(session_id);
                if user_sessions.is_empty() {
                    drop(user_sessions);
                    self.user_index
                        .remove_if(&handle.user_id, |_, sessions| sessions.is_empty());
                }
            }

            self.update_gauges();
            tracing::info!(session_id = %session_id, user_id = %handle.user_id, "Session unregistered");
        }
    }

    /// Get all sessions for a user
    pub fn get_user_connections(&self, user_id: &str) -> Vec<Arc<ConnectionHandle>> {
        self.user_index
            .get(user_id)
            .map(|session_ids| {
                session_ids
                    .iter()
                    .filter_map(|id| self.connections.get(id).map(|h| h.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Get session by ID
    pub fn get_connection(&self, session_id: &str) -> Option<Arc<ConnectionHandle>> {
        self.connections.get(session_id).map(|h| h.clone())
    }

    pub fn stats(&self) -> ConnectionStats {
        ConnectionStats {
            total_connections: self.connections.len(),
            unique_users: self.user_index.len(),
        }
    }

    fn update_gauges(&self) {
        ConnectionMetrics::set_counts(self.connections.len(), self.user_index.len());
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry for ConnectionManager {
    fn has_session(&self, user_id: &str) -> bool {
        self.user_index
            .get(user_id)
            .map(|sessions| !sessions.is_empty())
            .unwrap_or(false)
    }

    fn sessions_of(&self, user_id: &str) -> Vec<String> {
        self.user_index
            .get(user_id)
            .map(|sessions| sessions.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn all_users(&self) -> Vec<String> {
        self.user_index
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .map(|entry| entry.key().clone())
            .collect()
    }

    fn has_exact_session(&self, user_id: &str, session_id: &str) -> bool {
        self.connections
            .get(session_id)
            .map(|handle| handle.user_id == user_id)
            .unwrap_or(false)
    }
}

#[async_trait]
impl Transport for ConnectionManager {
    async fn send(
        &self,
        user_id: &str,
        session_id: Option<&str>,
        message: &NotificationMessage,
    ) -> Result<usize, TransportError> {
        // Resolve handles first; no map guard is held across the sends below
        let targets: Vec<Arc<ConnectionHandle>> = match session_id {
            Some(id) => match self.get_connection(id) {
                Some(handle) if handle.user_id == user_id => vec![handle],
                _ => return Err(TransportError::SessionNotFound(id.to_string())),
            },
            None => {
                let handles = self.get_user_connections(user_id);
                if handles.is_empty() {
                    return Err(TransportError::NoSessions(user_id.to_string()));
                }
                handles
            }
        };

        let mut delivered = 0;
        let mut backpressured = 0;
        for handle in &targets {
            match handle.send(ServerMessage::notification(message.clone())) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    backpressured += 1;
                    tracing::warn!(
                        session_id = %handle.id,
                        user_id = %user_id,
                        message_id = %message.id,
                        "Session buffer full, dropping frame"
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::warn!(
                        session_id = %handle.id,
                        user_id = %user_id,
                        message_id = %message.id,
                        "Session channel closed, dropping frame"
                    );
                }
            }
        }

        if delivered == 0 {
            let target = session_id.unwrap_or(user_id).to_string();
            if backpressured > 0 {
                return Err(TransportError::Backpressure(target));
            }
            return Err(TransportError::ChannelClosed(target));
        }

        Ok(delivered)
    }

    fn user_has_sessions(&self, user_id: &str) -> bool {
        self.has_session(user_id)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStats {
    pub total_connections: usize,
    pub unique_users: usize,
}
