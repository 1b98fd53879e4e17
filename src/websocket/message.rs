use serde::{Deserialize, Serialize};

use crate::notification::NotificationMessage;

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Confirms receipt of a notification on this session
    Ack { message_id: String },
    Ping,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "notification")]
    Notification {
        #[serde(rename = "payload")]
        message: NotificationMessage,
    },
    #[serde(rename = "ack_result")]
    AckResult {
        message_id: String,
        acknowledged: bool,
    },
    #[serde(rename = "pong")]
    Pong,
    #[serde(rename = "error")]
    Error {
        code: String,
        message: String,
    },
}

impl ServerMessage {
    pub fn notification(message: NotificationMessage) -> Self {
        Self::Notification { message }
    }

    pub fn ack_result(message_id: impl Into<String>, acknowledged: bool) -> Self {
        Self::AckResult {
            message_id: message_id.into(),
            acknowledged,
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_ack_frame() {
        let msg: ClientMessage =
            serde_json::from_value(json!({"type": "ack", "payload": {"message_id": "m1"}}))
                .unwrap();
        assert!(matches!(msg, ClientMessage::Ack { message_id } if message_id == "m1"));
    }

    #[test]
    fn test_parse_ping_frame() {
        let msg: ClientMessage = serde_json::from_value(json!({"type": "ping"})).unwrap();
        assert!(matches!(msg, ClientMessage::Ping));
    }

    #[test]
    fn test_notification_frame_shape() {
        let frame = ServerMessage::notification(NotificationMessage::text("m1", "u1", "hi"));
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["type"], "notification");
        assert_eq!(value["payload"]["id"], "m1");
        assert_eq!(value["payload"]["type"], "STRING_MSG");
    }

    #[test]
    fn test_ack_result_frame_shape() {
        let value = serde_json::to_value(ServerMessage::ack_result("m1", false)).unwrap();
        assert_eq!(
            value,
            json!({"type": "ack_result", "message_id": "m1", "acknowledged": false})
        );
    }
}
