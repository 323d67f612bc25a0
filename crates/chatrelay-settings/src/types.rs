//! Settings type definitions.
//!
//! Every section implements [`Default`] with production values and is marked
//! `#[serde(default)]`, so a settings file only needs the keys it changes.

use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings for the relay.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySettings {
    /// Listener address.
    pub server: ServerSettings,
    /// Transport keepalive and frame limits.
    pub keepalive: KeepaliveSettings,
    /// Hub queue sizing.
    pub hub: HubSettings,
    /// Text-completion backend.
    pub completion: CompletionSettings,
    /// Audio transcription backend.
    pub transcription: TranscriptionSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl RelaySettings {
    /// Check cross-field invariants. Called once at startup.
    pub fn validate(&self) -> Result<()> {
        let k = &self.keepalive;
        if k.write_wait_secs == 0 {
            return Err(SettingsError::invalid("keepalive.write_wait_secs", "must be positive"));
        }
        if k.ping_period_secs == 0 || k.ping_period_secs >= k.pong_wait_secs {
            return Err(SettingsError::invalid(
                "keepalive.ping_period_secs",
                format!(
                    "{} must be positive and below pong_wait_secs ({})",
                    k.ping_period_secs, k.pong_wait_secs
                ),
            ));
        }
        if k.max_message_size == 0 {
            return Err(SettingsError::invalid("keepalive.max_message_size", "must be positive"));
        }
        if self.hub.outbound_queue_capacity == 0 || self.hub.event_queue_capacity == 0 {
            return Err(SettingsError::invalid("hub", "queue capacities must be positive"));
        }
        if self.completion.max_inflight == 0 {
            return Err(SettingsError::invalid("completion.max_inflight", "must be positive"));
        }
        Ok(())
    }
}

/// Listener address.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Interface to bind.
    pub host: String,
    /// TCP port to bind (`0` picks a free port).
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
        }
    }
}

/// Keepalive timing and frame limits for peer connections.
///
/// `ping_period_secs` must stay below `pong_wait_secs` so a healthy peer
/// always has a probe in flight before its read deadline lapses.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct KeepaliveSettings {
    /// Time allowed to write one frame to the peer.
    pub write_wait_secs: u64,
    /// Time allowed between pongs before the peer is considered dead.
    pub pong_wait_secs: u64,
    /// Interval between pings.
    pub ping_period_secs: u64,
    /// Largest inbound frame accepted, in bytes.
    pub max_message_size: usize,
}

impl Default for KeepaliveSettings {
    fn default() -> Self {
        Self {
            write_wait_secs: 10,
            pong_wait_secs: 60,
            ping_period_secs: 54,
            max_message_size: 512 * 1024,
        }
    }
}

impl KeepaliveSettings {
    /// Write deadline as a [`Duration`].
    pub fn write_wait(&self) -> Duration {
        Duration::from_secs(self.write_wait_secs)
    }

    /// Read deadline as a [`Duration`].
    pub fn pong_wait(&self) -> Duration {
        Duration::from_secs(self.pong_wait_secs)
    }

    /// Ping interval as a [`Duration`].
    pub fn ping_period(&self) -> Duration {
        Duration::from_secs(self.ping_period_secs)
    }
}

/// Hub queue sizing.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HubSettings {
    /// Per-connection outbound queue capacity.
    pub outbound_queue_capacity: usize,
    /// Capacity of the hub's event inbox.
    pub event_queue_capacity: usize,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            outbound_queue_capacity: 256,
            event_queue_capacity: 1024,
        }
    }
}

/// Text-completion backend settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionSettings {
    /// Model identifier sent with every request.
    pub model: String,
    /// OpenAI-compatible API base URL.
    pub base_url: String,
    /// System prompt prepended to every request.
    pub system_prompt: String,
    /// Per-request timeout.
    pub timeout_secs: u64,
    /// Maximum completion calls in flight at once.
    pub max_inflight: usize,
    /// API credential. Environment only.
    #[serde(skip)]
    pub api_key: Option<SecretString>,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            model: "llama-3.3-70b-versatile".into(),
            base_url: "https://api.groq.com/openai/v1".into(),
            system_prompt:
                "You are a helpful and friendly AI assistant. Provide concise and helpful responses."
                    .into(),
            timeout_secs: 60,
            max_inflight: 32,
            api_key: None,
        }
    }
}

impl CompletionSettings {
    /// Request timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Audio transcription backend settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionSettings {
    /// Speech model identifier.
    pub model: String,
    /// Spoken language hint.
    pub language: String,
    /// Largest accepted upload, in bytes.
    pub max_upload_bytes: usize,
}

impl Default for TranscriptionSettings {
    fn default() -> Self {
        Self {
            model: "whisper-large-v3".into(),
            language: "en".into(),
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Log output format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(SettingsError::invalid(
                "logging.format",
                format!("unknown log format: {other}"),
            )),
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default level directive, overridden by `RUST_LOG`.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
    /// Per-module level overrides, e.g. `("chatrelay_server", "debug")`.
    pub modules: Vec<(String, String)>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Pretty,
            modules: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_wire_contract() {
        let s = RelaySettings::default();
        assert_eq!(s.server.port, 8080);
        assert_eq!(s.keepalive.write_wait(), Duration::from_secs(10));
        assert_eq!(s.keepalive.pong_wait(), Duration::from_secs(60));
        assert_eq!(s.keepalive.ping_period(), Duration::from_secs(54));
        assert_eq!(s.keepalive.max_message_size, 524_288);
        assert_eq!(s.hub.outbound_queue_capacity, 256);
        assert_eq!(s.completion.model, "llama-3.3-70b-versatile");
        assert_eq!(s.transcription.max_upload_bytes, 10 * 1024 * 1024);
        assert!(s.completion.api_key.is_none());
    }

    #[test]
    fn default_ping_period_is_nine_tenths_of_pong_wait() {
        let k = KeepaliveSettings::default();
        assert_eq!(k.ping_period_secs, k.pong_wait_secs * 9 / 10);
    }

    #[test]
    fn defaults_validate() {
        RelaySettings::default().validate().unwrap();
    }

    #[test]
    fn ping_period_must_be_below_pong_wait() {
        let mut s = RelaySettings::default();
        s.keepalive.ping_period_secs = 60;
        let err = s.validate().unwrap_err();
        assert!(err.to_string().contains("ping_period_secs"));
    }

    #[test]
    fn zero_write_wait_rejected() {
        let mut s = RelaySettings::default();
        s.keepalive.write_wait_secs = 0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn zero_queue_rejected() {
        let mut s = RelaySettings::default();
        s.hub.outbound_queue_capacity = 0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn zero_inflight_rejected() {
        let mut s = RelaySettings::default();
        s.completion.max_inflight = 0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn api_key_never_serialized() {
        let mut s = RelaySettings::default();
        s.completion.api_key = Some(SecretString::from("gsk_secret".to_string()));
        let json = serde_json::to_string(&s).unwrap();
        assert!(!json.contains("gsk_secret"));
        assert!(!json.contains("api_key"));
    }

    #[test]
    fn log_format_parsing() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("PRETTY".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let s: RelaySettings =
            serde_json::from_str(r#"{"server":{"port":9000},"logging":{"format":"json"}}"#).unwrap();
        assert_eq!(s.server.port, 9000);
        assert_eq!(s.server.host, "0.0.0.0");
        assert_eq!(s.logging.format, LogFormat::Json);
        assert_eq!(s.keepalive.pong_wait_secs, 60);
    }
}
