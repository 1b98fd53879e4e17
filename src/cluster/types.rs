//! Cluster relay event and error types

use serde::{Deserialize, Serialize};

use crate::notification::NotificationMessage;
use crate::redis::PoolError;

/// Where a publish event entered the node that is processing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventOrigin {
    /// From this node's own publish API
    Originated,
    /// Received from the cluster bus; never relayed again
    Relayed,
}

/// A publish request travelling between nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPublished {
    pub message: NotificationMessage,
    pub origin: EventOrigin,
    /// Node that put the event on the bus
    pub origin_node: String,
}

impl NotificationPublished {
    pub fn originated(message: NotificationMessage, origin_node: impl Into<String>) -> Self {
        Self {
            message,
            origin: EventOrigin::Originated,
            origin_node: origin_node.into(),
        }
    }

    /// Copy of this event as it travels over the bus.
    pub fn into_relayed(self) -> Self {
        Self {
            origin: EventOrigin::Relayed,
            ..self
        }
    }

    pub fn is_local_event(&self) -> bool {
        self.origin == EventOrigin::Originated
    }
}

/// Error type for cluster bus operations
#[derive(Debug, thiserror::Error)]
pub enum ClusterBusError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cluster bus unavailable: {0}")]
    Unavailable(String),
}

impl From<PoolError> for ClusterBusError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::Redis(e) => ClusterBusError::Redis(e),
            PoolError::ConnectionUnavailable(msg) => ClusterBusError::Unavailable(msg),
        }
    }
}

/// Backend type for the cluster bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterBusBackend {
    /// In-process broadcast channel
    Local,
    /// Redis pub/sub topic
    Redis,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relayed_copy_keeps_origin_node() {
        let event = NotificationPublished::originated(
            NotificationMessage::text("m1", "u1", "hi"),
            "node-a",
        );
        assert!(event.is_local_event());

        let relayed = event.into_relayed();
        assert!(!relayed.is_local_event());
        assert_eq!(relayed.origin_node, "node-a");
        assert_eq!(relayed.message.id, "m1");
    }

    #[test]
    fn test_event_serialization() {
        let event = NotificationPublished::originated(
            NotificationMessage::text("m1", "u1", "hi"),
            "node-a",
        )
        .into_relayed();

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"origin\":\"Relayed\""));

        let parsed: NotificationPublished = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }
}
