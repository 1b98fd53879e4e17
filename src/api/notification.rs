//! Publish, broadcast and ACK endpoints.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::notification::{DeliveryResult, NotificationMessage, NotifyType, PublishReceipt};
use crate::server::AppState;

/// Request to publish a notification to one receiver
#[derive(Debug, Deserialize)]
pub struct NotificationRequest {
    /// Message id; assigned by the server on the tracked path
    #[serde(default)]
    pub id: String,
    /// Notify type (`STRING_MSG`, `NOTIFY_VIEWED`, `NOTIFY_DELETED`)
    #[serde(rename = "type", default = "default_type")]
    pub notify_type: String,
    /// Target user ID
    pub receiver: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Request to broadcast to every user connected to this node
#[derive(Debug, Deserialize)]
pub struct BroadcastRequest {
    #[serde(rename = "type", default = "default_type")]
    pub notify_type: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// ACK submitted over HTTP on behalf of a session
#[derive(Debug, Deserialize)]
pub struct AckRequest {
    pub receiver: String,
    pub message_id: String,
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct AckResponse {
    pub acknowledged: bool,
}

fn default_type() -> String {
    NotifyType::StringMsg.as_str().to_string()
}

impl From<NotificationRequest> for NotificationMessage {
    fn from(request: NotificationRequest) -> Self {
        let mut message = NotificationMessage::text(request.id, request.receiver, "");
        message.notify_type = request.notify_type;
        message.data = request.data;
        message
    }
}

/// POST /api/v1/notifications - persist, assign an id, deliver
pub async fn track_notification(
    State(state): State<AppState>,
    Json(request): Json<NotificationRequest>,
) -> Result<Json<PublishReceipt>> {
    let receipt = state.dispatcher.publish_and_track(request.into()).await?;

    tracing::info!(
        message_id = %receipt.message_id,
        outcome = ?receipt.outcome,
        "Notification published via HTTP API"
    );

    Ok(Json(receipt))
}

/// POST /api/v1/notifications/publish - deliver a message with a caller-assigned id
pub async fn publish_notification(
    State(state): State<AppState>,
    Json(request): Json<NotificationRequest>,
) -> Result<Json<PublishReceipt>> {
    let receipt = state.dispatcher.publish(request.into()).await?;

    tracing::info!(
        message_id = %receipt.message_id,
        outcome = ?receipt.outcome,
        "Notification published via HTTP API"
    );

    Ok(Json(receipt))
}

/// POST /api/v1/notifications/broadcast
pub async fn broadcast_notification(
    State(state): State<AppState>,
    Json(request): Json<BroadcastRequest>,
) -> Result<Json<DeliveryResult>> {
    let mut message = NotificationMessage::text(
        format!("ntf_{}", Uuid::new_v4().simple()),
        String::new(),
        "",
    );
    message.notify_type = request.notify_type;
    message.data = request.data;

    let result = state.dispatcher.broadcast(message).await?;

    tracing::info!(
        message_id = %result.message_id,
        delivered_to = result.delivered_to,
        "Broadcast sent via HTTP API"
    );

    Ok(Json(result))
}

/// POST /api/v1/notifications/ack
pub async fn acknowledge(
    State(state): State<AppState>,
    Json(request): Json<AckRequest>,
) -> Result<Json<AckResponse>> {
    if request.receiver.trim().is_empty() {
        return Err(AppError::Validation("receiver must not be blank".to_string()));
    }

    let acknowledged = state
        .dispatcher
        .acknowledge(&request.receiver, &request.message_id, &request.session_id)
        .await;

    Ok(Json(AckResponse { acknowledged }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_defaults_to_string_msg() {
        let request: NotificationRequest =
            serde_json::from_value(json!({"receiver": "u1", "data": "hi"})).unwrap();
        let message: NotificationMessage = request.into();

        assert_eq!(message.notify_type, "STRING_MSG");
        assert_eq!(message.receiver, "u1");
        assert!(message.id.is_empty());
        assert!(message.validate().is_ok());
    }

    #[test]
    fn test_request_carries_type_and_data() {
        let request: NotificationRequest = serde_json::from_value(json!({
            "id": "m1",
            "type": "NOTIFY_VIEWED",
            "receiver": "u1",
            "data": {"ids": ["m0"]}
        }))
        .unwrap();
        let message: NotificationMessage = request.into();

        assert_eq!(message.id, "m1");
        assert_eq!(message.notify_type, "NOTIFY_VIEWED");
        assert_eq!(message.data, json!({"ids": ["m0"]}));
    }
}
