//! Message log collaborator used by the publish-and-persist entry point.

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use super::types::{NotificationMessage, ValidationError};

/// Errors raised by a [`MessageLog`] backend.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PersistenceError {
    #[error("message log unavailable: {0}")]
    Unavailable(String),

    #[error("failed to store message: {0}")]
    Storage(String),
}

/// Errors returned by the dispatcher's publish entry points.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Durable record of published messages.
#[async_trait]
pub trait MessageLog: Send + Sync {
    /// Store a message and return it with its server-assigned id.
    async fn save(&self, message: NotificationMessage) -> Result<NotificationMessage, PersistenceError>;
}

/// In-process message log. Keeps every saved record for the lifetime of the
/// process and assigns `ntf_{uuid}` ids to messages that arrive without one.
#[derive(Debug, Default)]
pub struct MemoryMessageLog {
    records: DashMap<String, NotificationMessage>,
}

impl MemoryMessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<NotificationMessage> {
        self.records.get(id).map(|r| r.value().clone())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl MessageLog for MemoryMessageLog {
    async fn save(
        &self,
        mut message: NotificationMessage,
    ) -> Result<NotificationMessage, PersistenceError> {
        if message.id.trim().is_empty() {
            message.id = format!("ntf_{}", Uuid::new_v4().simple());
        }
        self.records.insert(message.id.clone(), message.clone());
        Ok(message)
    }
}
