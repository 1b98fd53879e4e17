use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Discriminator selecting the expected shape of `NotificationMessage::data`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotifyType {
    /// Plain text payload
    #[default]
    StringMsg,
    /// Messages marked as viewed, payload `{"ids": [...]}`
    NotifyViewed,
    /// Messages deleted, payload `{"ids": [...]}`
    NotifyDeleted,
}

impl NotifyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotifyType::StringMsg => "STRING_MSG",
            NotifyType::NotifyViewed => "NOTIFY_VIEWED",
            NotifyType::NotifyDeleted => "NOTIFY_DELETED",
        }
    }

    /// Check that `data` has the shape this type expects. `null` is always accepted.
    pub fn check_data(&self, data: &serde_json::Value) -> Result<(), ValidationError> {
        if data.is_null() {
            return Ok(());
        }

        let matches = match self {
            NotifyType::StringMsg => data.is_string(),
            NotifyType::NotifyViewed | NotifyType::NotifyDeleted => {
                serde_json::from_value::<NotifyUpdatePayload>(data.clone()).is_ok()
            }
        };

        if matches {
            Ok(())
        } else {
            Err(ValidationError::DataMismatch(self.as_str().to_string()))
        }
    }
}

impl fmt::Display for NotifyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotifyType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STRING_MSG" => Ok(NotifyType::StringMsg),
            "NOTIFY_VIEWED" => Ok(NotifyType::NotifyViewed),
            "NOTIFY_DELETED" => Ok(NotifyType::NotifyDeleted),
            other => Err(ValidationError::UnknownType(other.to_string())),
        }
    }
}

/// Payload of `NOTIFY_VIEWED` / `NOTIFY_DELETED` messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NotifyUpdatePayload {
    pub ids: Vec<String>,
}

/// Rejections raised before a message is published.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("unknown notify type: {0}")]
    UnknownType(String),

    #[error("data does not match notify type {0}")]
    DataMismatch(String),

    #[error("receiver must not be blank")]
    BlankReceiver,

    #[error("message id must not be blank")]
    BlankId,
}

/// A notification on its way to a user's sessions.
///
/// `id`, `type`, `receiver` and `data` are fixed at creation. `created`,
/// `ack_retry_count` and `ack_last_sent` are delivery metadata that the
/// dispatcher and the retry sweep maintain while an ACK is pending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationMessage {
    #[serde(default)]
    pub id: String,

    #[serde(rename = "type", default = "default_type")]
    pub notify_type: String,

    pub receiver: String,

    #[serde(default)]
    pub data: serde_json::Value,

    #[serde(default)]
    pub viewed: bool,

    /// Epoch millis of the first enqueue; age is measured from here
    #[serde(default)]
    pub created: i64,

    #[serde(default)]
    pub ack_retry_count: u32,

    #[serde(default)]
    pub ack_last_sent: i64,
}

fn default_type() -> String {
    NotifyType::StringMsg.as_str().to_string()
}

impl NotificationMessage {
    /// Create a message with fresh delivery metadata.
    pub fn new(
        id: impl Into<String>,
        notify_type: NotifyType,
        receiver: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            notify_type: notify_type.as_str().to_string(),
            receiver: receiver.into(),
            data,
            viewed: false,
            created: 0,
            ack_retry_count: 0,
            ack_last_sent: 0,
        }
    }

    /// Shorthand for a `STRING_MSG` message.
    pub fn text(id: impl Into<String>, receiver: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(
            id,
            NotifyType::StringMsg,
            receiver,
            serde_json::Value::String(text.into()),
        )
    }

    /// Parsed notify type.
    pub fn kind(&self) -> Result<NotifyType, ValidationError> {
        self.notify_type.parse()
    }

    /// Validate type/data agreement and the receiver. The id is checked by
    /// callers that require one.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.receiver.trim().is_empty() {
            return Err(ValidationError::BlankReceiver);
        }
        self.kind()?.check_data(&self.data)
    }

    /// Stamp `created` on first enqueue. Later calls leave it untouched.
    pub fn mark_created(&mut self, now_ms: i64) {
        if self.created == 0 {
            self.created = now_ms;
        }
        if self.ack_last_sent == 0 {
            self.ack_last_sent = now_ms;
        }
    }

    /// Record one more re-send attempt.
    pub fn record_retry(&mut self, now_ms: i64) {
        self.ack_retry_count += 1;
        self.ack_last_sent = now_ms;
    }

    /// Milliseconds since `created`.
    pub fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms - self.created
    }
}
