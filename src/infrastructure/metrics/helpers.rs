//! Metrics helper structs for convenient metric recording

use std::time::Duration;

use prometheus::{Encoder, TextEncoder};

use super::{
    ACK_EXPIRED_TOTAL, ACK_PENDING, ACK_RECEIVED_TOTAL, ACK_REJECTED_TOTAL, ACK_RETRIED_TOTAL,
    ACK_SWEEP_DURATION, ACK_TRACKED_TOTAL, CLUSTER_EVENTS_RECEIVED, CLUSTER_EVENTS_RELAYED,
    CONNECTIONS_TOTAL, MESSAGES_DELIVERED_TOTAL, MESSAGES_FAILED_TOTAL, MESSAGES_SENT_TOTAL,
    USERS_CONNECTED,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording message metrics
pub struct MessageMetrics;

impl MessageMetrics {
    /// Record a message addressed to one user
    pub fn record_user_sent() {
        MESSAGES_SENT_TOTAL.with_label_values(&["user"]).inc();
    }

    /// Record a broadcast message
    pub fn record_broadcast_sent() {
        MESSAGES_SENT_TOTAL.with_label_values(&["broadcast"]).inc();
    }

    /// Record a sweep re-send
    pub fn record_retry_sent() {
        MESSAGES_SENT_TOTAL.with_label_values(&["retry"]).inc();
    }

    /// Record successful deliveries
    pub fn record_delivered(count: u64) {
        MESSAGES_DELIVERED_TOTAL.inc_by(count);
    }

    /// Record failed deliveries
    pub fn record_failed(count: u64) {
        MESSAGES_FAILED_TOTAL.inc_by(count);
    }
}

/// Helper struct for ACK bookkeeping metrics
pub struct AckMetrics;

impl AckMetrics {
    pub fn record_tracked() {
        ACK_TRACKED_TOTAL.inc();
    }

    pub fn record_acknowledged() {
        ACK_RECEIVED_TOTAL.inc();
    }

    pub fn record_rejected() {
        ACK_REJECTED_TOTAL.inc();
    }

    /// Record the outcome of one sweep
    pub fn record_sweep(pending: usize, retried: usize, expired: usize, elapsed: Duration) {
        ACK_PENDING.set(pending as i64);
        if retried > 0 {
            ACK_RETRIED_TOTAL.inc_by(retried as u64);
        }
        if expired > 0 {
            ACK_EXPIRED_TOTAL.inc_by(expired as u64);
        }
        ACK_SWEEP_DURATION.observe(elapsed.as_secs_f64());
    }
}

/// Helper struct for cluster metrics
pub struct ClusterMetrics;

impl ClusterMetrics {
    /// Record an event published onto the cluster bus
    pub fn record_event_relayed() {
        CLUSTER_EVENTS_RELAYED.inc();
    }

    /// Record an event received from another node
    pub fn record_event_received() {
        CLUSTER_EVENTS_RECEIVED.inc();
    }
}

/// Helper struct for connection gauges
pub struct ConnectionMetrics;

impl ConnectionMetrics {
    pub fn set_counts(connections: usize, users: usize) {
        CONNECTIONS_TOTAL.set(connections as i64);
        USERS_CONNECTED.set(users as i64);
    }
}
