//! Redis pub/sub cluster bus
//!
//! Events are published as JSON on one topic. Each node keeps a dedicated
//! pub/sub connection and reconnects with capped exponential backoff.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::metrics::ClusterMetrics;
use crate::redis::RedisPool;

use super::traits::{ClusterBus, ClusterEventHandler};
use super::types::{ClusterBusBackend, ClusterBusError, NotificationPublished};

const INITIAL_RETRY_DELAY: Duration = Duration::from_millis(100);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Cluster bus over a Redis pub/sub topic
pub struct RedisClusterBus {
    pool: Arc<RedisPool>,
    node_id: String,
    topic: String,
}

impl RedisClusterBus {
    pub fn new(pool: Arc<RedisPool>, node_id: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            pool,
            node_id: node_id.into(),
            topic: topic.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

#[async_trait]
impl ClusterBus for RedisClusterBus {
    fn node_id(&self) -> &str {
        &self.node_id
    }

    fn backend_type(&self) -> ClusterBusBackend {
        ClusterBusBackend::Redis
    }

    async fn publish(&self, event: &NotificationPublished) -> Result<usize, ClusterBusError> {
        let payload = serde_json::to_string(event)?;
        let receivers = self.pool.publish(&self.topic, &payload).await?;
        Ok(receivers)
    }

    fn subscribe(
        &self,
        handler: Arc<dyn ClusterEventHandler>,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<JoinHandle<()>, ClusterBusError> {
        let subscriber = RelaySubscriber {
            url: self.pool.url().to_string(),
            node_id: self.node_id.clone(),
            topic: self.topic.clone(),
            handler,
            shutdown,
        };
        Ok(tokio::spawn(subscriber.run()))
    }
}

/// Background task receiving relayed events from other nodes
struct RelaySubscriber {
    url: String,
    node_id: String,
    topic: String,
    handler: Arc<dyn ClusterEventHandler>,
    shutdown: broadcast::Receiver<()>,
}

impl RelaySubscriber {
    /// Run the subscriber task with automatic reconnection
    async fn run(mut self) {
        tracing::info!(
            node_id = %self.node_id,
            topic = %self.topic,
            "Cluster relay subscriber starting"
        );

        let mut retry_delay = INITIAL_RETRY_DELAY;

        loop {
            match self.run_subscription_loop(&mut retry_delay).await {
                Ok(()) => {
                    tracing::info!("Cluster relay subscriber stopped gracefully");
                    break;
                }
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        retry_delay_ms = retry_delay.as_millis(),
                        "Cluster relay subscription error, reconnecting"
                    );

                    tokio::select! {
                        _ = self.shutdown.recv() => {
                            tracing::info!("Shutdown requested during reconnect delay");
                            break;
                        }
                        _ = tokio::time::sleep(retry_delay) => {
                            retry_delay = next_retry_delay(retry_delay);
                        }
                    }
                }
            }
        }
    }

    async fn run_subscription_loop(&mut self, retry_delay: &mut Duration) -> Result<(), ClusterBusError> {
        // Pub/sub requires a dedicated connection
        let client = redis::Client::open(self.url.as_str())?;
        let mut pubsub = client.get_async_pubsub().await?;
        pubsub.subscribe(&self.topic).await?;

        tracing::info!(topic = %self.topic, "Subscribed to cluster topic");
        *retry_delay = INITIAL_RETRY_DELAY;

        let mut message_stream = pubsub.on_message();

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.recv() => {
                    tracing::info!("Received shutdown signal");
                    return Ok(());
                }

                msg = message_stream.next() => {
                    match msg {
                        Some(msg) => {
                            let payload: String = match msg.get_payload() {
                                Ok(p) => p,
                                Err(e) => {
                                    tracing::warn!(error = %e, "Failed to get message payload");
                                    continue;
                                }
                            };
                            if let Some(event) = decode_relay(&payload, &self.node_id) {
                                ClusterMetrics::record_event_received();
                                self.handler.on_relay(event).await;
                            }
                        }
                        None => {
                            return Err(ClusterBusError::Unavailable(
                                "Redis message stream ended".to_string(),
                            ));
                        }
                    }
                }
            }
        }
    }
}

/// Parse a relay payload, dropping malformed events and this node's own.
fn decode_relay(payload: &str, node_id: &str) -> Option<NotificationPublished> {
    let event: NotificationPublished = match serde_json::from_str(payload) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to parse cluster event");
            return None;
        }
    };

    if event.origin_node == node_id {
        return None;
    }

    tracing::debug!(
        origin_node = %event.origin_node,
        message_id = %event.message.id,
        receiver = %event.message.receiver,
        "Received cluster event"
    );
    Some(event)
}

fn next_retry_delay(current: Duration) -> Duration {
    std::cmp::min(current * 2, MAX_RETRY_DELAY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RedisConfig;
    use crate::notification::NotificationMessage;

    fn payload(origin_node: &str) -> String {
        let event = NotificationPublished::originated(
            NotificationMessage::text("m1", "u1", "hi"),
            origin_node,
        )
        .into_relayed();
        serde_json::to_string(&event).unwrap()
    }

    #[test]
    fn test_decode_relay_from_other_node() {
        let event = decode_relay(&payload("node-a"), "node-b").unwrap();
        assert_eq!(event.message.receiver, "u1");
        assert!(!event.is_local_event());
    }

    #[test]
    fn test_decode_relay_skips_own_and_malformed() {
        assert!(decode_relay(&payload("node-a"), "node-a").is_none());
        assert!(decode_relay("{not json", "node-a").is_none());
    }

    #[test]
    fn test_retry_delay_is_capped() {
        assert_eq!(next_retry_delay(Duration::from_millis(100)), Duration::from_millis(200));
        assert_eq!(next_retry_delay(Duration::from_secs(20)), MAX_RETRY_DELAY);
    }

    #[test]
    fn test_bus_identity() {
        let pool = RedisPool::new(RedisConfig::default()).unwrap();
        let bus = RedisClusterBus::new(Arc::new(pool), "node-a", "ara:notify:topic");
        assert_eq!(bus.node_id(), "node-a");
        assert_eq!(bus.topic(), "ara:notify:topic");
        assert_eq!(bus.backend_type(), ClusterBusBackend::Redis);
    }
}
