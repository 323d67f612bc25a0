//! The chat [`Message`] entity.
//!
//! A message is validated on construction and immutable afterwards. Content
//! and sender are never empty; there is no way to obtain a zero-value
//! message.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sender tag used for messages typed by a human peer.
pub const SENDER_USER: &str = "user";
/// Sender tag used for generated replies.
pub const SENDER_AI: &str = "ai";
/// Sender tag used for relay-authored notices.
pub const SENDER_SYSTEM: &str = "system";

/// Text sent in place of a reply that could not be generated.
pub const APOLOGY: &str = "Sorry, I couldn't process your message. Please try again.";

/// Kind of message carried on the wire.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    /// Ordinary chat text (`"message"` on the wire).
    #[default]
    #[serde(rename = "message")]
    Text,
    /// A user-facing failure notice (`"error"` on the wire).
    #[serde(rename = "error")]
    Error,
}

impl MessageType {
    /// Wire name of this type.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "message",
            Self::Error => "error",
        }
    }
}

/// Reasons a message cannot be constructed.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// `content` was empty.
    #[error("message content cannot be empty")]
    EmptyContent,
    /// `sender` was empty.
    #[error("message sender cannot be empty")]
    EmptySender,
}

/// A validated chat message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WireMessage")]
pub struct Message {
    #[serde(rename = "type")]
    kind: MessageType,
    content: String,
    sender: String,
    timestamp: DateTime<Utc>,
}

impl Message {
    /// Build a message stamped with the current time.
    pub fn new(
        kind: MessageType,
        content: impl Into<String>,
        sender: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        Self::with_timestamp(kind, content, sender, Utc::now())
    }

    /// Build a message with an explicit timestamp.
    pub fn with_timestamp(
        kind: MessageType,
        content: impl Into<String>,
        sender: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        let content = content.into();
        let sender = sender.into();
        if content.is_empty() {
            return Err(ValidationError::EmptyContent);
        }
        if sender.is_empty() {
            return Err(ValidationError::EmptySender);
        }
        Ok(Self {
            kind,
            content,
            sender,
            timestamp,
        })
    }

    /// A generated reply attributed to `"ai"`.
    pub fn ai(content: impl Into<String>) -> Result<Self, ValidationError> {
        Self::new(MessageType::Text, content, SENDER_AI)
    }

    /// A failure notice attributed to `"system"`.
    pub fn system_error(content: impl Into<String>) -> Result<Self, ValidationError> {
        Self::new(MessageType::Error, content, SENDER_SYSTEM)
    }

    /// The system apology sent when no reply could be generated.
    ///
    /// Infallible: content and sender are non-empty constants.
    pub fn apology() -> Self {
        Self {
            kind: MessageType::Error,
            content: APOLOGY.to_string(),
            sender: SENDER_SYSTEM.to_string(),
            timestamp: Utc::now(),
        }
    }

    /// Message kind.
    pub fn kind(&self) -> MessageType {
        self.kind
    }

    /// Message text.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Who authored the message (`"user"`, `"ai"`, `"system"`, ...).
    pub fn sender(&self) -> &str {
        &self.sender
    }

    /// Creation time.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Consume the message, keeping only its text.
    pub fn into_content(self) -> String {
        self.content
    }
}

/// Unvalidated wire shape. Peers may omit `type` and `timestamp`.
#[derive(Deserialize)]
struct WireMessage {
    #[serde(rename = "type", default)]
    kind: MessageType,
    content: String,
    sender: String,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

impl TryFrom<WireMessage> for Message {
    type Error = ValidationError;

    fn try_from(wire: WireMessage) -> Result<Self, Self::Error> {
        Self::with_timestamp(
            wire.kind,
            wire.content,
            wire.sender,
            wire.timestamp.unwrap_or_else(Utc::now),
        )
    }
}
