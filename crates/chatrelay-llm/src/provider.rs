//! # Provider Traits
//!
//! [`CompletionProvider`] and [`TranscriptionProvider`] are the seams between
//! the relay and its external services. Both are object-safe and used as
//! `Arc<dyn ...>` so tests can swap in the scripted mocks.

use async_trait::async_trait;

/// Errors from a text-completion call.
#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    /// No API credential configured. Raised before any network call.
    #[error("GROQ_API_KEY not set")]
    MissingApiKey,

    /// Transport failure (connect, timeout, body read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body as text.
        body: String,
    },

    /// The response body was not the expected JSON shape.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// The service returned no choices or an empty reply.
    #[error("empty response from completion service")]
    EmptyResponse,
}

impl CompletionError {
    /// Whether retrying the same request could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::MissingApiKey | Self::Decode(_) | Self::EmptyResponse => false,
        }
    }

    /// Category string for logs and metric labels.
    pub fn category(&self) -> &'static str {
        match self {
            Self::MissingApiKey => "auth",
            Self::Http(_) => "network",
            Self::Api { status: 401 | 403, .. } => "auth",
            Self::Api { status: 429, .. } => "rate_limit",
            Self::Api { .. } => "api",
            Self::Decode(_) => "parse",
            Self::EmptyResponse => "empty",
        }
    }
}

/// Errors from an audio transcription call.
#[derive(Debug, thiserror::Error)]
pub enum TranscriptionError {
    /// No API credential configured. Raised before any network call.
    #[error("GROQ_API_KEY not set")]
    MissingApiKey,

    /// Zero-length audio payload.
    #[error("audio payload is empty")]
    EmptyAudio,

    /// Transport failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body as text.
        body: String,
    },

    /// The response body was not the expected JSON shape.
    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl TranscriptionError {
    /// Whether retrying the same request could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::MissingApiKey | Self::EmptyAudio | Self::Decode(_) => false,
        }
    }

    /// Category string for logs and metric labels.
    pub fn category(&self) -> &'static str {
        match self {
            Self::MissingApiKey => "auth",
            Self::EmptyAudio => "invalid_input",
            Self::Http(_) => "network",
            Self::Api { .. } => "api",
            Self::Decode(_) => "parse",
        }
    }
}

/// A service that produces one reply for one user message.
///
/// Calls are independent; there is no conversation history.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Provider identifier (e.g. `"groq"`).
    fn name(&self) -> &str;

    /// Model identifier sent with each request.
    fn model(&self) -> &str;

    /// Produce a reply to `user_text`.
    async fn complete(&self, user_text: &str) -> Result<String, CompletionError>;
}

/// A service that turns recorded audio into text.
#[async_trait]
pub trait TranscriptionProvider: Send + Sync {
    /// Transcribe `audio`. `filename` carries the container format hint.
    async fn transcribe(&self, audio: Vec<u8>, filename: &str) -> Result<String, TranscriptionError>;
}
