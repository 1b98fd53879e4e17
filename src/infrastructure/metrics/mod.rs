//! Prometheus metrics for the relay.
//!
//! - Connection metrics (live sessions, connected users)
//! - Message metrics (sent by target type, delivered, failed)
//! - ACK metrics (tracked, acknowledged, rejected, retried, expired, pending)
//! - Cluster metrics (events relayed and received)

mod helpers;

pub use helpers::{encode_metrics, AckMetrics, ClusterMetrics, ConnectionMetrics, MessageMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "ara";

lazy_static! {
    // ============================================================================
    // Connection Metrics
    // ============================================================================

    /// Number of live WebSocket sessions on this node
    pub static ref CONNECTIONS_TOTAL: IntGauge = register_int_gauge!(
        format!("{}_connections_total", METRIC_PREFIX),
        "Total number of live WebSocket sessions"
    ).unwrap();

    /// Number of users with at least one session on this node
    pub static ref USERS_CONNECTED: IntGauge = register_int_gauge!(
        format!("{}_users_connected", METRIC_PREFIX),
        "Number of users with at least one live session"
    ).unwrap();

    // ============================================================================
    // Message Metrics
    // ============================================================================

    /// Messages handed to the dispatcher, by target type
    pub static ref MESSAGES_SENT_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_messages_sent_total", METRIC_PREFIX),
        "Total messages sent",
        &["target"]
    ).unwrap();

    /// Session-level sends accepted by the transport
    pub static ref MESSAGES_DELIVERED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_messages_delivered_total", METRIC_PREFIX),
        "Total messages successfully handed to sessions"
    ).unwrap();

    /// Session-level sends the transport rejected
    pub static ref MESSAGES_FAILED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_messages_failed_total", METRIC_PREFIX),
        "Total message delivery failures"
    ).unwrap();

    // ============================================================================
    // ACK Metrics
    // ============================================================================

    pub static ref ACK_TRACKED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_ack_tracked_total", METRIC_PREFIX),
        "Total (message, session) deliveries tracked for ACK"
    ).unwrap();

    pub static ref ACK_RECEIVED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_ack_received_total", METRIC_PREFIX),
        "Total ACKs that removed a pending record"
    ).unwrap();

    pub static ref ACK_REJECTED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_ack_rejected_total", METRIC_PREFIX),
        "Total ACKs that matched no pending record for the claimed receiver"
    ).unwrap();

    pub static ref ACK_RETRIED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_ack_retried_total", METRIC_PREFIX),
        "Total re-sends performed by the retry sweep"
    ).unwrap();

    pub static ref ACK_EXPIRED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_ack_expired_total", METRIC_PREFIX),
        "Total pending records abandoned after TTL or retry budget"
    ).unwrap();

    pub static ref ACK_PENDING: IntGauge = register_int_gauge!(
        format!("{}_ack_pending", METRIC_PREFIX),
        "Pending records seen by the last sweep"
    ).unwrap();

    pub static ref ACK_SWEEP_DURATION: Histogram = register_histogram!(
        format!("{}_ack_sweep_duration_seconds", METRIC_PREFIX),
        "Duration of one retry sweep in seconds",
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]
    ).unwrap();

    // ============================================================================
    // Cluster Metrics
    // ============================================================================

    pub static ref CLUSTER_EVENTS_RELAYED: IntCounter = register_int_counter!(
        format!("{}_cluster_events_relayed_total", METRIC_PREFIX),
        "Total publish events relayed to the cluster bus"
    ).unwrap();

    pub static ref CLUSTER_EVENTS_RECEIVED: IntCounter = register_int_counter!(
        format!("{}_cluster_events_received_total", METRIC_PREFIX),
        "Total relayed publish events received from other nodes"
    ).unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registered() {
        CONNECTIONS_TOTAL.set(1);
        MESSAGES_SENT_TOTAL.with_label_values(&["user"]).inc();
        ACK_TRACKED_TOTAL.inc();
        ACK_PENDING.set(3);
        ACK_SWEEP_DURATION.observe(0.01);
        CLUSTER_EVENTS_RELAYED.inc();

        let output = encode_metrics().unwrap();
        assert!(output.contains("ara_ack_tracked_total"));
        assert!(output.contains("ara_cluster_events_relayed_total"));
    }
}
