//! Groq chat-completions client (OpenAI-compatible, non-streaming).

use std::time::Duration;

use async_trait::async_trait;
use chatrelay_settings::CompletionSettings;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::provider::{CompletionError, CompletionProvider};

/// Connection parameters for [`GroqChatClient`].
#[derive(Clone, Debug)]
pub struct GroqChatConfig {
    /// Bearer credential. `None` makes every call fail fast.
    pub api_key: Option<SecretString>,
    /// API base URL without trailing slash.
    pub base_url: String,
    /// Model identifier.
    pub model: String,
    /// System prompt sent ahead of the user message.
    pub system_prompt: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl From<&CompletionSettings> for GroqChatConfig {
    fn from(s: &CompletionSettings) -> Self {
        Self {
            api_key: s.api_key.clone(),
            base_url: s.base_url.trim_end_matches('/').to_string(),
            model: s.model.clone(),
            system_prompt: s.system_prompt.clone(),
            timeout: s.timeout(),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Completion provider backed by `POST {base_url}/chat/completions`.
pub struct GroqChatClient {
    config: GroqChatConfig,
    client: reqwest::Client,
}

impl GroqChatClient {
    /// Build a client. Fails only if the HTTP client cannot be constructed.
    pub fn new(config: GroqChatConfig) -> Result<Self, CompletionError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        info!(
            model = %config.model,
            base_url = %config.base_url,
            has_key = config.api_key.is_some(),
            "completion client initialized"
        );
        Ok(Self { config, client })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url)
    }
}

#[async_trait]
impl CompletionProvider for GroqChatClient {
    fn name(&self) -> &str {
        "groq"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn complete(&self, user_text: &str) -> Result<String, CompletionError> {
        let Some(key) = &self.config.api_key else {
            return Err(CompletionError::MissingApiKey);
        };

        let body = ChatRequest {
            model: &self.config.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &self.config.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_text,
                },
            ],
            stream: false,
        };

        debug!(model = %self.config.model, chars = user_text.len(), "sending completion request");

        let response = self
            .client
            .post(self.endpoint())
            .header(AUTHORIZATION, format!("Bearer {}", key.expose_secret()))
            .header(CONTENT_TYPE, "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(CompletionError::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: ChatResponse =
            serde_json::from_str(&text).map_err(|e| CompletionError::Decode(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(CompletionError::EmptyResponse)
    }
}
