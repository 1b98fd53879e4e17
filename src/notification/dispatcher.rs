use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::ack::{AckKey, AckStore};
use crate::cluster::{ClusterBus, ClusterEventHandler, NotificationPublished};
use crate::connection_manager::{SessionRegistry, Transport};
use crate::metrics::{AckMetrics, ClusterMetrics, MessageMetrics};

use super::persistence::{MessageLog, PublishError};
use super::types::{now_millis, NotificationMessage, ValidationError};

/// What one node did with one publish event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// Receiver is online here; sent to its sessions and tracked for ACK
    Delivered {
        sessions: usize,
        tracked: usize,
        failed: usize,
    },
    /// Receiver not here; the event was put on the cluster bus
    Relayed,
    /// Receiver not here and the relay could not be published
    RelayFailed,
    /// Relayed event for a receiver this node does not hold
    NotLocal,
}

/// Result of publishing through the HTTP surface
#[derive(Debug, Clone, Serialize)]
pub struct PublishReceipt {
    pub message_id: String,
    #[serde(flatten)]
    pub outcome: DispatchOutcome,
}

/// Result of a broadcast to local users
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryResult {
    pub message_id: String,
    /// Number of users the broadcast was addressed to
    pub users: usize,
    /// Number of sessions the message was delivered to
    pub delivered_to: usize,
    /// Number of users whose sessions could not be reached
    pub failed: usize,
    pub success: bool,
}

impl DeliveryResult {
    fn new(message_id: String, users: usize, delivered: usize, failed: usize) -> Self {
        Self {
            message_id,
            users,
            delivered_to: delivered,
            failed,
            success: delivered > 0,
        }
    }
}

/// Statistics for the delivery dispatcher
#[derive(Debug, Default)]
struct DispatcherStats {
    published: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    relayed: AtomicU64,
    relays_received: AtomicU64,
    not_local: AtomicU64,
    acknowledged: AtomicU64,
    ack_rejected: AtomicU64,
    broadcasts: AtomicU64,
}

impl DispatcherStats {
    fn snapshot(&self) -> DispatcherStatsSnapshot {
        DispatcherStatsSnapshot {
            published: self.published.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            relayed: self.relayed.load(Ordering::Relaxed),
            relays_received: self.relays_received.load(Ordering::Relaxed),
            not_local: self.not_local.load(Ordering::Relaxed),
            acknowledged: self.acknowledged.load(Ordering::Relaxed),
            ack_rejected: self.ack_rejected.load(Ordering::Relaxed),
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of dispatcher statistics
#[derive(Debug, Clone, Serialize)]
pub struct DispatcherStatsSnapshot {
    pub published: u64,
    pub delivered: u64,
    pub failed: u64,
    pub relayed: u64,
    pub relays_received: u64,
    pub not_local: u64,
    pub acknowledged: u64,
    pub ack_rejected: u64,
    pub broadcasts: u64,
}

/// Orchestrates local delivery, ACK bookkeeping and cluster relay
pub struct DeliveryDispatcher {
    registry: Arc<dyn SessionRegistry>,
    transport: Arc<dyn Transport>,
    ack_store: Arc<dyn AckStore>,
    cluster_bus: Arc<dyn ClusterBus>,
    message_log: Arc<dyn MessageLog>,
    stats: DispatcherStats,
}

impl DeliveryDispatcher {
    pub fn new(
        registry: Arc<dyn SessionRegistry>,
        transport: Arc<dyn Transport>,
        ack_store: Arc<dyn AckStore>,
        cluster_bus: Arc<dyn ClusterBus>,
        message_log: Arc<dyn MessageLog>,
    ) -> Self {
        Self {
            registry,
            transport,
            ack_store,
            cluster_bus,
            message_log,
            stats: DispatcherStats::default(),
        }
    }

    pub fn node_id(&self) -> &str {
        self.cluster_bus.node_id()
    }

    /// Get dispatcher statistics
    pub fn stats(&self) -> DispatcherStatsSnapshot {
        self.stats.snapshot()
    }

    /// Validate, persist, then publish. The message log assigns the id.
    #[tracing::instrument(
        name = "dispatcher.publish_and_track",
        skip(self, message),
        fields(receiver = %message.receiver, notify_type = %message.notify_type)
    )]
    pub async fn publish_and_track(
        &self,
        message: NotificationMessage,
    ) -> Result<PublishReceipt, PublishError> {
        message.validate()?;
        let saved = self.message_log.save(reset_delivery(message)).await?;
        Ok(self.publish_originated(saved).await)
    }

    /// Validate and publish a message that already carries its id.
    #[tracing::instrument(
        name = "dispatcher.publish",
        skip(self, message),
        fields(message_id = %message.id, receiver = %message.receiver)
    )]
    pub async fn publish(&self, message: NotificationMessage) -> Result<PublishReceipt, PublishError> {
        if message.id.trim().is_empty() {
            return Err(ValidationError::BlankId.into());
        }
        message.validate()?;
        Ok(self.publish_originated(reset_delivery(message)).await)
    }

    async fn publish_originated(&self, message: NotificationMessage) -> PublishReceipt {
        self.stats.published.fetch_add(1, Ordering::Relaxed);
        MessageMetrics::record_user_sent();

        let message_id = message.id.clone();
        let event = NotificationPublished::originated(message, self.cluster_bus.node_id());
        let outcome = self.handle_event(event).await;

        PublishReceipt {
            message_id,
            outcome,
        }
    }

    /// Process one publish event on this node.
    ///
    /// Local delivery always wins. Only an originated event with no local
    /// session is relayed, and the relay is marked so it is never relayed again.
    #[tracing::instrument(
        name = "dispatcher.handle_event",
        skip(self, event),
        fields(
            message_id = %event.message.id,
            receiver = %event.message.receiver,
            origin = ?event.origin
        )
    )]
    pub async fn handle_event(&self, event: NotificationPublished) -> DispatchOutcome {
        let sessions = self.registry.sessions_of(&event.message.receiver);

        if !sessions.is_empty() {
            return self.deliver_locally(event.message, &sessions).await;
        }

        if event.is_local_event() {
            return self.relay(event).await;
        }

        self.stats.not_local.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            message_id = %event.message.id,
            receiver = %event.message.receiver,
            "Receiver not connected to this node"
        );
        DispatchOutcome::NotLocal
    }

    async fn deliver_locally(
        &self,
        mut message: NotificationMessage,
        sessions: &[String],
    ) -> DispatchOutcome {
        message.mark_created(now_millis());

        let mut delivered = 0;
        let mut failed = 0;
        let mut tracked = 0;

        for session_id in sessions {
            match self
                .transport
                .send(&message.receiver, Some(session_id), &message)
                .await
            {
                Ok(_) => delivered += 1,
                Err(e) => {
                    // The record below lets the sweep retry this session
                    failed += 1;
                    tracing::warn!(
                        message_id = %message.id,
                        session_id = %session_id,
                        error = %e,
                        "Failed to send notification to session"
                    );
                }
            }

            let key = AckKey::new(message.id.as_str(), session_id.as_str());
            match self.ack_store.put(&key, &message).await {
                Ok(true) => {
                    tracked += 1;
                    AckMetrics::record_tracked();
                }
                Ok(false) => {
                    tracing::debug!(ack_key = %key, "ACK record already pending");
                }
                Err(e) => {
                    tracing::warn!(ack_key = %key, error = %e, "Failed to track ACK record");
                }
            }
        }

        self.stats
            .delivered
            .fetch_add(delivered as u64, Ordering::Relaxed);
        self.stats.failed.fetch_add(failed as u64, Ordering::Relaxed);
        MessageMetrics::record_delivered(delivered as u64);
        MessageMetrics::record_failed(failed as u64);

        tracing::debug!(
            message_id = %message.id,
            receiver = %message.receiver,
            sessions = sessions.len(),
            delivered = delivered,
            tracked = tracked,
            "Delivered notification locally"
        );

        DispatchOutcome::Delivered {
            sessions: sessions.len(),
            tracked,
            failed,
        }
    }

    async fn relay(&self, event: NotificationPublished) -> DispatchOutcome {
        let relayed = event.into_relayed();

        match self.cluster_bus.publish(&relayed).await {
            Ok(receivers) => {
                self.stats.relayed.fetch_add(1, Ordering::Relaxed);
                ClusterMetrics::record_event_relayed();
                tracing::debug!(
                    message_id = %relayed.message.id,
                    receiver = %relayed.message.receiver,
                    receivers = receivers,
                    "Relayed notification to cluster"
                );
                DispatchOutcome::Relayed
            }
            Err(e) => {
                tracing::warn!(
                    message_id = %relayed.message.id,
                    error = %e,
                    "Failed to relay notification to cluster"
                );
                DispatchOutcome::RelayFailed
            }
        }
    }

    /// Honor an ACK from one session. `false` means nothing was removed,
    /// which is not an error: the record may be acked, expired or untracked.
    #[tracing::instrument(name = "dispatcher.acknowledge", skip(self))]
    pub async fn acknowledge(&self, receiver: &str, message_id: &str, session_id: &str) -> bool {
        if session_id.trim().is_empty() || message_id.trim().is_empty() {
            self.reject_ack();
            return false;
        }

        let key = AckKey::new(message_id, session_id);
        match self.ack_store.remove_if_receiver_matches(&key, receiver).await {
            Ok(true) => {
                self.stats.acknowledged.fetch_add(1, Ordering::Relaxed);
                AckMetrics::record_acknowledged();
                tracing::debug!(ack_key = %key, receiver = %receiver, "Notification acknowledged");
                true
            }
            Ok(false) => {
                self.reject_ack();
                tracing::debug!(ack_key = %key, receiver = %receiver, "No pending record for ACK");
                false
            }
            Err(e) => {
                self.reject_ack();
                tracing::warn!(ack_key = %key, error = %e, "Failed to remove ACK record");
                false
            }
        }
    }

    fn reject_ack(&self) {
        self.stats.ack_rejected.fetch_add(1, Ordering::Relaxed);
        AckMetrics::record_rejected();
    }

    /// Send to every user connected to this node. No ACK tracking, no relay.
    #[tracing::instrument(
        name = "dispatcher.broadcast",
        skip(self, message),
        fields(message_id = %message.id, notify_type = %message.notify_type)
    )]
    pub async fn broadcast(&self, message: NotificationMessage) -> Result<DeliveryResult, ValidationError> {
        message.kind()?.check_data(&message.data)?;

        let users = self.registry.all_users();
        let mut delivered = 0;
        let mut failed = 0;

        for user_id in &users {
            let mut addressed = message.clone();
            addressed.receiver = user_id.clone();

            match self.transport.send(user_id, None, &addressed).await {
                Ok(sessions) => delivered += sessions,
                Err(e) => {
                    failed += 1;
                    tracing::debug!(user_id = %user_id, error = %e, "Broadcast send failed");
                }
            }
        }

        self.stats.broadcasts.fetch_add(1, Ordering::Relaxed);
        self.stats
            .delivered
            .fetch_add(delivered as u64, Ordering::Relaxed);
        self.stats.failed.fetch_add(failed as u64, Ordering::Relaxed);
        MessageMetrics::record_broadcast_sent();
        MessageMetrics::record_delivered(delivered as u64);
        MessageMetrics::record_failed(failed as u64);

        tracing::debug!(
            message_id = %message.id,
            users = users.len(),
            delivered = delivered,
            failed = failed,
            "Broadcast notification to local users"
        );

        Ok(DeliveryResult::new(message.id, users.len(), delivered, failed))
    }
}

#[async_trait]
impl ClusterEventHandler for DeliveryDispatcher {
    async fn on_relay(&self, event: NotificationPublished) {
        self.stats.relays_received.fetch_add(1, Ordering::Relaxed);
        // Anything arriving over the bus is a relay, whatever it claims
        self.handle_event(event.into_relayed()).await;
    }
}

/// Clear delivery metadata so age is measured from this node's first enqueue.
fn reset_delivery(mut message: NotificationMessage) -> NotificationMessage {
    message.created = 0;
    message.ack_retry_count = 0;
    message.ack_last_sent = 0;
    message
}
