//! Groq Whisper transcription client.
//!
//! Sends audio as `multipart/form-data` to `{base_url}/audio/transcriptions`
//! with `response_format=json` and reads back `{ "text": ... }`.

use std::time::Duration;

use async_trait::async_trait;
use chatrelay_settings::{CompletionSettings, TranscriptionSettings};
use reqwest::header::AUTHORIZATION;
use reqwest::multipart::{Form, Part};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use crate::provider::{TranscriptionError, TranscriptionProvider};

/// Connection parameters for [`GroqWhisperClient`].
#[derive(Clone, Debug)]
pub struct WhisperConfig {
    /// Bearer credential shared with the completion client.
    pub api_key: Option<SecretString>,
    /// API base URL without trailing slash.
    pub base_url: String,
    /// Speech model identifier.
    pub model: String,
    /// Spoken language hint.
    pub language: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl WhisperConfig {
    /// Build from the completion section (credential, base URL, timeout) and
    /// the transcription section (model, language).
    pub fn from_settings(completion: &CompletionSettings, transcription: &TranscriptionSettings) -> Self {
        Self {
            api_key: completion.api_key.clone(),
            base_url: completion.base_url.trim_end_matches('/').to_string(),
            model: transcription.model.clone(),
            language: transcription.language.clone(),
            timeout: completion.timeout(),
        }
    }
}

#[derive(Deserialize)]
struct WhisperResponse {
    text: String,
}

/// Transcription provider backed by the Whisper endpoint.
pub struct GroqWhisperClient {
    config: WhisperConfig,
    client: reqwest::Client,
}

impl GroqWhisperClient {
    /// Build a client. Fails only if the HTTP client cannot be constructed.
    pub fn new(config: WhisperConfig) -> Result<Self, TranscriptionError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl TranscriptionProvider for GroqWhisperClient {
    async fn transcribe(&self, audio: Vec<u8>, filename: &str) -> Result<String, TranscriptionError> {
        let Some(key) = &self.config.api_key else {
            return Err(TranscriptionError::MissingApiKey);
        };
        if audio.is_empty() {
            return Err(TranscriptionError::EmptyAudio);
        }

        debug!(bytes = audio.len(), filename, "sending transcription request");

        let form = Form::new()
            .part("file", Part::bytes(audio).file_name(filename.to_string()))
            .text("model", self.config.model.clone())
            .text("language", self.config.language.clone())
            .text("response_format", "json");

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.config.base_url))
            .header(AUTHORIZATION, format!("Bearer {}", key.expose_secret()))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(TranscriptionError::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: WhisperResponse =
            serde_json::from_str(&text).map_err(|e| TranscriptionError::Decode(e.to_string()))?;
        Ok(parsed.text)
    }
}
