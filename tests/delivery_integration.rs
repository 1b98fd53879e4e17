//! End-to-end delivery tests on a single node
//!
//! These tests verify the publish, ACK and retry paths together without
//! requiring Redis or a running server.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower::ServiceExt;

use ara_notify_relay::ack::{AckKey, AckStore};
use ara_notify_relay::config::Settings;
use ara_notify_relay::connection_manager::ConnectionHandle;
use ara_notify_relay::notification::{now_millis, DispatchOutcome, NotificationMessage};
use ara_notify_relay::server::{create_app, AppState};
use ara_notify_relay::websocket::ServerMessage;

fn connect(state: &AppState, user_id: &str) -> (Arc<ConnectionHandle>, mpsc::Receiver<ServerMessage>) {
    let (tx, rx) = mpsc::channel(16);
    let handle = state.connection_manager.register(user_id.to_string(), tx);
    (handle, rx)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

// =============================================================================
// Publish and ACK
// =============================================================================

mod ack_tests {
    use super::*;

    #[tokio::test]
    async fn test_one_record_per_session() {
        let state = AppState::new(Settings::default());
        let (s1, mut rx1) = connect(&state, "u1");
        let (s2, mut rx2) = connect(&state, "u1");

        let outcome = state
            .dispatcher
            .publish(NotificationMessage::text("m1", "u1", "hi"))
            .await
            .unwrap()
            .outcome;

        assert_eq!(
            outcome,
            DispatchOutcome::Delivered {
                sessions: 2,
                tracked: 2,
                failed: 0
            }
        );
        assert!(matches!(rx1.recv().await, Some(ServerMessage::Notification { .. })));
        assert!(matches!(rx2.recv().await, Some(ServerMessage::Notification { .. })));

        let store = state.ack_store.clone();
        assert_eq!(store.len().await.unwrap(), 2);
        assert!(store.get(&AckKey::new("m1", s1.id.as_str())).await.unwrap().is_some());
        assert!(store.get(&AckKey::new("m1", s2.id.as_str())).await.unwrap().is_some());

        // An ACK from one session leaves the other pending
        assert!(state.dispatcher.acknowledge("u1", "m1", &s1.id).await);
        assert!(store.get(&AckKey::new("m1", s1.id.as_str())).await.unwrap().is_none());
        assert!(store.get(&AckKey::new("m1", s2.id.as_str())).await.unwrap().is_some());

        // Repeating it removes nothing
        assert!(!state.dispatcher.acknowledge("u1", "m1", &s1.id).await);
    }

    #[tokio::test]
    async fn test_ack_from_other_user_is_rejected() {
        let state = AppState::new(Settings::default());
        let (s1, _rx) = connect(&state, "u1");

        state
            .dispatcher
            .publish(NotificationMessage::text("m1", "u1", "hi"))
            .await
            .unwrap();

        assert!(!state.dispatcher.acknowledge("intruder", "m1", &s1.id).await);
        assert_eq!(state.ack_store.len().await.unwrap(), 1);
        assert_eq!(state.dispatcher.stats().ack_rejected, 1);
    }

    #[tokio::test]
    async fn test_n_sessions_give_n_records() {
        let state = AppState::new(Settings::default());
        let mut receivers = Vec::new();
        for _ in 0..5 {
            receivers.push(connect(&state, "u1"));
        }

        state
            .dispatcher
            .publish(NotificationMessage::text("m1", "u1", "hi"))
            .await
            .unwrap();

        assert_eq!(state.ack_store.len().await.unwrap(), 5);
    }
}

// =============================================================================
// Retry sweep
// =============================================================================

mod retry_tests {
    use super::*;

    #[tokio::test]
    async fn test_unacked_message_is_resent() {
        let state = AppState::new(Settings::default());
        let (s1, mut rx) = connect(&state, "u1");

        state
            .dispatcher
            .publish(NotificationMessage::text("m1", "u1", "hi"))
            .await
            .unwrap();
        assert!(rx.recv().await.is_some());

        let summary = state.retry_scheduler.sweep_at(now_millis() + 6_000).await;
        assert_eq!(summary.retried, 1);
        assert!(matches!(rx.recv().await, Some(ServerMessage::Notification { .. })));

        let pending = state
            .ack_store
            .get(&AckKey::new("m1", s1.id.as_str()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pending.ack_retry_count, 1);
    }

    #[tokio::test]
    async fn test_stale_record_expires() {
        let state = AppState::new(Settings::default());
        let key = AckKey::new("m1", "s1");
        let mut message = NotificationMessage::text("m1", "u1", "hi");
        message.mark_created(now_millis() - 61_000);
        state.ack_store.put(&key, &message).await.unwrap();

        let summary = state.retry_scheduler.sweep().await;

        assert_eq!(summary.expired, 1);
        assert_eq!(state.ack_store.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_retry_budget_exhausted() {
        let state = AppState::new(Settings::default());
        let (s1, mut rx) = connect(&state, "u1");
        let key = AckKey::new("m1", s1.id.as_str());

        let mut message = NotificationMessage::text("m1", "u1", "hi");
        message.mark_created(now_millis() - 10_000);
        message.ack_retry_count = state.retry_scheduler.config().max_retry;
        state.ack_store.put(&key, &message).await.unwrap();

        let summary = state.retry_scheduler.sweep().await;

        assert_eq!(summary.expired, 1);
        assert!(rx.try_recv().is_err());
        assert!(state.ack_store.get(&key).await.unwrap().is_none());
    }
}

// =============================================================================
// HTTP surface
// =============================================================================

mod http_tests {
    use super::*;

    #[tokio::test]
    async fn test_health() {
        let app = create_app(AppState::new(Settings::default()));

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["ack"]["backend"], "memory");
    }

    #[tokio::test]
    async fn test_tracked_publish_assigns_id() {
        let state = AppState::new(Settings::default());
        let (_s1, mut rx) = connect(&state, "u1");
        let app = create_app(state.clone());

        let response = app
            .oneshot(post(
                "/api/v1/notifications",
                json!({"type": "STRING_MSG", "receiver": "u1", "data": "hi"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["outcome"], "delivered");
        assert_eq!(body["tracked"], 1);

        let message_id = body["message_id"].as_str().unwrap().to_string();
        assert!(message_id.starts_with("ntf_"));
        match rx.recv().await {
            Some(ServerMessage::Notification { message }) => assert_eq!(message.id, message_id),
            other => panic!("unexpected frame: {:?}", other),
        }
        tokio_test::assert_ok!(state.ack_store.len().await);
    }

    #[tokio::test]
    async fn test_publish_rejects_mismatched_data() {
        let app = create_app(AppState::new(Settings::default()));

        let response = app
            .oneshot(post(
                "/api/v1/notifications/publish",
                json!({"id": "m1", "type": "NOTIFY_VIEWED", "receiver": "u1", "data": "not ids"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_ack_endpoint() {
        let state = AppState::new(Settings::default());
        let (s1, _rx) = connect(&state, "u1");
        state
            .dispatcher
            .publish(NotificationMessage::text("m1", "u1", "hi"))
            .await
            .unwrap();

        let request = json!({"receiver": "u1", "message_id": "m1", "session_id": s1.id});
        let response = create_app(state.clone())
            .oneshot(post("/api/v1/notifications/ack", request.clone()))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["acknowledged"], true);

        let response = create_app(state)
            .oneshot(post("/api/v1/notifications/ack", request))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["acknowledged"], false);
    }

    #[tokio::test]
    async fn test_broadcast_is_untracked() {
        let state = AppState::new(Settings::default());
        let (_a, mut rx_a) = connect(&state, "u1");
        let (_b, mut rx_b) = connect(&state, "u2");

        let response = create_app(state.clone())
            .oneshot(post(
                "/api/v1/notifications/broadcast",
                json!({"type": "STRING_MSG", "data": "maintenance"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["users"], 2);
        assert_eq!(body["delivered_to"], 2);
        assert!(rx_a.recv().await.is_some());
        assert!(rx_b.recv().await.is_some());
        assert_eq!(state.ack_store.len().await.unwrap(), 0);
    }
}
