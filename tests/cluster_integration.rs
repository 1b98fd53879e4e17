//! Integration tests for cross-node relay
//!
//! Two nodes share one in-process cluster bus, so these tests run without
//! Redis or server startup.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use ara_notify_relay::ack::{AckKey, AckStore, MemoryAckStore};
use ara_notify_relay::cluster::LocalClusterBus;
use ara_notify_relay::config::Settings;
use ara_notify_relay::notification::{DispatchOutcome, NotificationMessage};
use ara_notify_relay::server::AppState;
use ara_notify_relay::websocket::ServerMessage;

struct Node {
    state: AppState,
    tasks: Vec<JoinHandle<()>>,
}

impl Node {
    fn start(bus: LocalClusterBus) -> Self {
        let state = AppState::with_components(
            Settings::default(),
            Arc::new(MemoryAckStore::new()),
            Arc::new(bus),
            None,
        );
        let tasks = state.start_background_tasks();
        Self { state, tasks }
    }

    async fn stop(self) {
        self.state.shutdown();
        for task in self.tasks {
            let _ = tokio::time::timeout(Duration::from_secs(1), task).await;
        }
    }
}

fn two_nodes() -> (Node, Node) {
    let bus_a = LocalClusterBus::new("node-a");
    let bus_b = bus_a.with_node("node-b");
    (Node::start(bus_a), Node::start(bus_b))
}

/// Poll until `check` holds or a second passes
async fn eventually<F>(mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

#[tokio::test]
async fn test_relay_reaches_node_holding_session() {
    let (a, b) = two_nodes();
    let (tx, mut rx) = mpsc::channel(8);
    let session = b.state.connection_manager.register("u1".to_string(), tx);

    let receipt = a
        .state
        .dispatcher
        .publish(NotificationMessage::text("m1", "u1", "hi"))
        .await
        .unwrap();
    assert_eq!(receipt.outcome, DispatchOutcome::Relayed);

    let frame = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap();
    match frame {
        Some(ServerMessage::Notification { message }) => assert_eq!(message.id, "m1"),
        other => panic!("unexpected frame: {:?}", other),
    }

    // Tracked on the delivering node only
    let key = AckKey::new("m1", session.id.as_str());
    let store_b = b.state.ack_store.clone();
    let mut tracked = false;
    for _ in 0..100 {
        if store_b.get(&key).await.unwrap().is_some() {
            tracked = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(tracked);
    assert_eq!(a.state.ack_store.len().await.unwrap(), 0);

    // Exactly one relay, never re-relayed
    assert_eq!(a.state.dispatcher.stats().relayed, 1);
    assert_eq!(b.state.dispatcher.stats().relays_received, 1);
    assert_eq!(b.state.dispatcher.stats().relayed, 0);
    assert_eq!(a.state.dispatcher.stats().relays_received, 0);

    a.stop().await;
    b.stop().await;
}

#[tokio::test]
async fn test_local_session_is_not_relayed() {
    let (a, b) = two_nodes();
    let (tx, mut rx) = mpsc::channel(8);
    a.state.connection_manager.register("u1".to_string(), tx);

    let receipt = a
        .state
        .dispatcher
        .publish(NotificationMessage::text("m1", "u1", "hi"))
        .await
        .unwrap();

    assert!(matches!(receipt.outcome, DispatchOutcome::Delivered { sessions: 1, .. }));
    assert!(rx.recv().await.is_some());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(b.state.dispatcher.stats().relays_received, 0);

    a.stop().await;
    b.stop().await;
}

#[tokio::test]
async fn test_receiver_offline_everywhere() {
    let (a, b) = two_nodes();

    let receipt = a
        .state
        .dispatcher
        .publish(NotificationMessage::text("m1", "nobody", "hi"))
        .await
        .unwrap();
    assert_eq!(receipt.outcome, DispatchOutcome::Relayed);

    let dispatcher_b = b.state.dispatcher.clone();
    assert!(eventually(|| dispatcher_b.stats().not_local == 1).await);

    // The receiving node drops it instead of relaying again
    assert_eq!(b.state.dispatcher.stats().relayed, 0);
    assert_eq!(a.state.dispatcher.stats().relayed, 1);
    assert_eq!(a.state.ack_store.len().await.unwrap(), 0);
    assert_eq!(b.state.ack_store.len().await.unwrap(), 0);

    a.stop().await;
    b.stop().await;
}
