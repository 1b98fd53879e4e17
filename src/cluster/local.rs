//! In-process cluster bus backed by a tokio broadcast channel

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::metrics::ClusterMetrics;

use super::traits::{ClusterBus, ClusterEventHandler};
use super::types::{ClusterBusBackend, ClusterBusError, NotificationPublished};

const CHANNEL_CAPACITY: usize = 1024;

/// In-process cluster bus.
///
/// Buses created with [`LocalClusterBus::with_node`] share one channel, so
/// several dispatchers in the same process behave like separate nodes.
#[derive(Clone)]
pub struct LocalClusterBus {
    node_id: String,
    sender: broadcast::Sender<NotificationPublished>,
}

impl LocalClusterBus {
    pub fn new(node_id: impl Into<String>) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            node_id: node_id.into(),
            sender,
        }
    }

    /// Another node attached to the same channel.
    pub fn with_node(&self, node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            sender: self.sender.clone(),
        }
    }
}

#[async_trait]
impl ClusterBus for LocalClusterBus {
    fn node_id(&self) -> &str {
        &self.node_id
    }

    fn backend_type(&self) -> ClusterBusBackend {
        ClusterBusBackend::Local
    }

    async fn publish(&self, event: &NotificationPublished) -> Result<usize, ClusterBusError> {
        match self.sender.send(event.clone()) {
            Ok(receivers) => Ok(receivers),
            Err(_) => {
                // No node is listening
                tracing::debug!(message_id = %event.message.id, "No cluster subscribers");
                Ok(0)
            }
        }
    }

    fn subscribe(
        &self,
        handler: Arc<dyn ClusterEventHandler>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<JoinHandle<()>, ClusterBusError> {
        // Subscribe before spawning so no event published after this call is missed
        let mut receiver = self.sender.subscribe();
        let node_id = self.node_id.clone();

        Ok(tokio::spawn(async move {
            tracing::debug!(node_id = %node_id, "Local cluster subscriber started");
            loop {
                tokio::select! {
                    biased;

                    _ = shutdown.recv() => {
                        tracing::debug!(node_id = %node_id, "Local cluster subscriber stopping");
                        break;
                    }

                    event = receiver.recv() => {
                        match event {
                            Ok(event) => {
                                if event.origin_node == node_id {
                                    continue;
                                }
                                ClusterMetrics::record_event_received();
                                handler.on_relay(event).await;
                            }
                            Err(RecvError::Lagged(skipped)) => {
                                tracing::warn!(node_id = %node_id, skipped, "Cluster subscriber lagged");
                            }
                            Err(RecvError::Closed) => break,
                        }
                    }
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::NotificationMessage;
    use std::time::Duration;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<NotificationPublished>>,
    }

    #[async_trait]
    impl ClusterEventHandler for Recorder {
        async fn on_relay(&self, event: NotificationPublished) {
            self.events.lock().await.push(event);
        }
    }

    fn event(node: &str) -> NotificationPublished {
        NotificationPublished::originated(NotificationMessage::text("m1", "u1", "hi"), node)
            .into_relayed()
    }

    #[tokio::test]
    async fn test_other_node_receives_event() {
        let node_a = LocalClusterBus::new("node-a");
        let node_b = node_a.with_node("node-b");
        let (shutdown_tx, _) = broadcast::channel(1);

        let recorder = Arc::new(Recorder::default());
        let handle = node_b
            .subscribe(recorder.clone(), shutdown_tx.subscribe())
            .unwrap();

        assert_eq!(node_a.publish(&event("node-a")).await.unwrap(), 1);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(recorder.events.lock().await.len(), 1);

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_node_ignores_its_own_events() {
        let node_a = LocalClusterBus::new("node-a");
        let (shutdown_tx, _) = broadcast::channel(1);

        let recorder = Arc::new(Recorder::default());
        let _handle = node_a
            .subscribe(recorder.clone(), shutdown_tx.subscribe())
            .unwrap();

        node_a.publish(&event("node-a")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(recorder.events.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let bus = LocalClusterBus::new("node-a");
        assert_eq!(bus.publish(&event("node-a")).await.unwrap(), 0);
        assert_eq!(bus.backend_type(), ClusterBusBackend::Local);
    }
}
