//! JSON wire codec for [`Message`].
//!
//! ```text
//! { "type": "message" | "error", "content": "...", "sender": "...", "timestamp": "<RFC 3339>" }
//! ```
//!
//! Encoding is total over valid messages. Decoding rejects malformed JSON
//! and messages that fail validation, keeping the two failure modes apart so
//! callers can log them differently.

use crate::message::{Message, ValidationError};

/// Errors produced while decoding a wire frame.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The frame was not a JSON message object.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    /// The frame parsed but violated a message invariant.
    #[error("invalid message: {0}")]
    Invalid(#[from] ValidationError),
}

impl CodecError {
    /// Short classification string for logging/metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "malformed",
            Self::Invalid(_) => "invalid",
        }
    }
}

/// Serialize a message to its wire form.
pub fn encode(message: &Message) -> Result<String, CodecError> {
    Ok(serde_json::to_string(message)?)
}

/// Parse and validate a wire frame.
pub fn decode(frame: &[u8]) -> Result<Message, CodecError> {
    let value: serde_json::Value = serde_json::from_slice(frame)?;
    // Re-check invariants explicitly so validation failures surface as
    // `Invalid` rather than a generic serde error.
    if let Some(obj) = value.as_object() {
        if obj.get("content").and_then(|v| v.as_str()) == Some("") {
            return Err(ValidationError::EmptyContent.into());
        }
        if obj.get("sender").and_then(|v| v.as_str()) == Some("") {
            return Err(ValidationError::EmptySender.into());
        }
    }
    Ok(serde_json::from_value(value)?)
}
