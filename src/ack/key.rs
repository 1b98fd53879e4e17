use std::fmt;
use std::str::FromStr;

/// Separator between the message id and the session id in the wire form.
pub const ACK_KEY_SEPARATOR: &str = "::";

/// Composite key of one pending delivery: `(message_id, session_id)`.
///
/// Wire form is `"{message_id}::{session_id}"`. Parsing splits on the first
/// `::`, so a session id may itself contain the separator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AckKey {
    message_id: String,
    session_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AckKeyError {
    #[error("ack key is missing the '::' separator: {0}")]
    MissingSeparator(String),
}

impl AckKey {
    pub fn new(message_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            session_id: session_id.into(),
        }
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Parse the wire form.
    pub fn parse(raw: &str) -> Result<Self, AckKeyError> {
        raw.split_once(ACK_KEY_SEPARATOR)
            .map(|(message_id, session_id)| Self::new(message_id, session_id))
            .ok_or_else(|| AckKeyError::MissingSeparator(raw.to_string()))
    }
}

impl fmt::Display for AckKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.message_id, ACK_KEY_SEPARATOR, self.session_id)
    }
}

impl FromStr for AckKey {
    type Err = AckKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
