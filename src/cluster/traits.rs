//! Cluster bus contracts

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::types::{ClusterBusBackend, ClusterBusError, NotificationPublished};

/// Receiver side of the relay: invoked once per event from another node.
#[async_trait]
pub trait ClusterEventHandler: Send + Sync {
    async fn on_relay(&self, event: NotificationPublished);
}

/// Publish/subscribe relay carrying publish events to every node.
#[async_trait]
pub trait ClusterBus: Send + Sync {
    /// Identifier of this node; events it published are not delivered back to it
    fn node_id(&self) -> &str;

    fn backend_type(&self) -> ClusterBusBackend;

    /// Put an event on the bus. Returns how many subscribers it reached,
    /// when the backend can tell.
    async fn publish(&self, event: &NotificationPublished) -> Result<usize, ClusterBusError>;

    /// Start delivering events from other nodes to `handler` until
    /// `shutdown` fires.
    fn subscribe(
        &self,
        handler: Arc<dyn ClusterEventHandler>,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<JoinHandle<()>, ClusterBusError>;
}
