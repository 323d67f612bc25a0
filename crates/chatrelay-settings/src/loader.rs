//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`RelaySettings::default()`]
//! 2. If a settings file is given, deep-merge its values over defaults
//! 3. Load `.env` from the working directory into the process environment
//! 4. Apply environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::Path;

use secrecy::SecretString;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::{LogFormat, RelaySettings};

/// Load settings from an optional JSON file, then `.env`, then the
/// process environment.
///
/// A missing or unreadable file is [`SettingsError::Read`]; invalid JSON is
/// [`SettingsError::Parse`]. The merged result is validated before it is returned.
pub fn load_settings(path: Option<&Path>) -> Result<RelaySettings> {
    let defaults = serde_json::to_value(RelaySettings::default())?;

    let merged = if let Some(path) = path {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let user: Value = serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        deep_merge(defaults, user)
    } else {
        defaults
    };

    let mut settings: RelaySettings = serde_json::from_value(merged)?;

    match dotenvy::dotenv() {
        Ok(env_path) => debug!(path = %env_path.display(), "loaded .env"),
        Err(e) if e.not_found() => debug!("no .env file, skipping"),
        Err(e) => warn!(error = %e, "failed to load .env, ignoring"),
    }

    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply overrides from the process environment.
pub fn apply_env_overrides(settings: &mut RelaySettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides from an arbitrary variable lookup.
///
/// Empty values are treated as unset. Values that fail to parse or fall out
/// of range are logged and ignored.
pub fn apply_overrides_from(settings: &mut RelaySettings, lookup: impl Fn(&str) -> Option<String>) {
    let env = EnvReader { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("RELAY_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.u16("PORT", 0, 65535) {
        settings.server.port = v;
    }

    // ── Keepalive ───────────────────────────────────────────────────
    if let Some(v) = env.u64("RELAY_WRITE_WAIT_SECS", 1, 3600) {
        settings.keepalive.write_wait_secs = v;
    }
    if let Some(v) = env.u64("RELAY_PONG_WAIT_SECS", 1, 3600) {
        settings.keepalive.pong_wait_secs = v;
    }
    if let Some(v) = env.u64("RELAY_PING_PERIOD_SECS", 1, 3600) {
        settings.keepalive.ping_period_secs = v;
    }
    if let Some(v) = env.usize("RELAY_MAX_MESSAGE_SIZE", 1, 64 * 1024 * 1024) {
        settings.keepalive.max_message_size = v;
    }

    // ── Hub ─────────────────────────────────────────────────────────
    if let Some(v) = env.usize("RELAY_OUTBOUND_QUEUE", 1, 65_536) {
        settings.hub.outbound_queue_capacity = v;
    }

    // ── Completion ──────────────────────────────────────────────────
    if let Some(v) = env.string("GROQ_API_KEY") {
        settings.completion.api_key = Some(SecretString::from(v));
    }
    if let Some(v) = env.string("GROQ_MODEL") {
        settings.completion.model = v;
    }
    if let Some(v) = env.string("GROQ_BASE_URL") {
        settings.completion.base_url = v.trim_end_matches('/').to_string();
    }
    if let Some(v) = env.u64("RELAY_COMPLETION_TIMEOUT_SECS", 1, 600) {
        settings.completion.timeout_secs = v;
    }
    if let Some(v) = env.usize("RELAY_MAX_INFLIGHT", 1, 10_000) {
        settings.completion.max_inflight = v;
    }

    // ── Transcription ───────────────────────────────────────────────
    if let Some(v) = env.string("WHISPER_MODEL") {
        settings.transcription.model = v;
    }
    if let Some(v) = env.usize("RELAY_MAX_UPLOAD_BYTES", 1024, 1_073_741_824) {
        settings.transcription.max_upload_bytes = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("RELAY_LOG_FORMAT") {
        match v.parse::<LogFormat>() {
            Ok(format) => settings.logging.format = format,
            Err(_) => warn!(key = "RELAY_LOG_FORMAT", value = %v, "invalid log format, ignoring"),
        }
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Variable readers (thin wrappers) ────────────────────────────────────────

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn u16(&self, name: &str, min: u16, max: u16) -> Option<u16> {
        let val = self.string(name)?;
        let result = parse_u16_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid u16 env var, ignoring");
        }
        result
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = self.string(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid u64 env var, ignoring");
        }
        result
    }

    fn usize(&self, name: &str, min: usize, max: usize) -> Option<usize> {
        let val = self.string(name)?;
        let result = parse_usize_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid usize env var, ignoring");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use secrecy::ExposeSecret;
    use serde_json::json;

    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_objects_recursively() {
        let target = json!({"server": {"host": "0.0.0.0", "port": 8080}});
        let source = json!({"server": {"port": 9000}});
        let merged = deep_merge(target, source);
        assert_eq!(merged, json!({"server": {"host": "0.0.0.0", "port": 9000}}));
    }

    #[test]
    fn merge_skips_null() {
        let target = json!({"a": 1});
        let merged = deep_merge(target, json!({"a": null}));
        assert_eq!(merged, json!({"a": 1}));
    }

    #[test]
    fn merge_replaces_arrays() {
        let target = json!({"list": [1, 2, 3]});
        let merged = deep_merge(target, json!({"list": [9]}));
        assert_eq!(merged, json!({"list": [9]}));
    }

    #[test]
    fn merge_adds_new_keys() {
        let merged = deep_merge(json!({"a": 1}), json!({"b": 2}));
        assert_eq!(merged, json!({"a": 1, "b": 2}));
    }

    // ── parse helpers ───────────────────────────────────────────────

    #[test]
    fn parse_ranges() {
        assert_eq!(parse_u16_range("8080", 0, 65535), Some(8080));
        assert_eq!(parse_u16_range("70000", 0, 65535), None);
        assert_eq!(parse_u64_range(" 30 ", 1, 60), Some(30));
        assert_eq!(parse_u64_range("0", 1, 60), None);
        assert_eq!(parse_usize_range("abc", 1, 10), None);
        assert_eq!(parse_usize_range("10", 1, 10), Some(10));
    }

    // ── overrides ───────────────────────────────────────────────────

    #[test]
    fn overrides_apply() {
        let mut s = RelaySettings::default();
        apply_overrides_from(
            &mut s,
            vars(&[
                ("PORT", "3000"),
                ("RELAY_HOST", "127.0.0.1"),
                ("RELAY_PONG_WAIT_SECS", "30"),
                ("RELAY_PING_PERIOD_SECS", "27"),
                ("RELAY_OUTBOUND_QUEUE", "16"),
                ("GROQ_MODEL", "llama-3.1-8b-instant"),
                ("GROQ_BASE_URL", "http://localhost:9999/v1/"),
                ("RELAY_MAX_INFLIGHT", "4"),
                ("RELAY_LOG_FORMAT", "json"),
            ]),
        );
        assert_eq!(s.server.port, 3000);
        assert_eq!(s.server.host, "127.0.0.1");
        assert_eq!(s.keepalive.pong_wait_secs, 30);
        assert_eq!(s.keepalive.ping_period_secs, 27);
        assert_eq!(s.hub.outbound_queue_capacity, 16);
        assert_eq!(s.completion.model, "llama-3.1-8b-instant");
        assert_eq!(s.completion.base_url, "http://localhost:9999/v1");
        assert_eq!(s.completion.max_inflight, 4);
        assert_eq!(s.logging.format, LogFormat::Json);
        s.validate().unwrap();
    }

    #[test]
    fn api_key_read_from_env() {
        let mut s = RelaySettings::default();
        apply_overrides_from(&mut s, vars(&[("GROQ_API_KEY", "gsk_test")]));
        let key = s.completion.api_key.unwrap();
        assert_eq!(key.expose_secret(), "gsk_test");
    }

    #[test]
    fn empty_values_are_unset() {
        let mut s = RelaySettings::default();
        apply_overrides_from(&mut s, vars(&[("GROQ_API_KEY", ""), ("RELAY_HOST", "")]));
        assert!(s.completion.api_key.is_none());
        assert_eq!(s.server.host, "0.0.0.0");
    }

    #[test]
    fn invalid_values_ignored() {
        let mut s = RelaySettings::default();
        apply_overrides_from(
            &mut s,
            vars(&[
                ("PORT", "not-a-port"),
                ("RELAY_WRITE_WAIT_SECS", "0"),
                ("RELAY_OUTBOUND_QUEUE", "-1"),
                ("RELAY_LOG_FORMAT", "xml"),
            ]),
        );
        assert_eq!(s.server.port, 8080);
        assert_eq!(s.keepalive.write_wait_secs, 10);
        assert_eq!(s.hub.outbound_queue_capacity, 256);
        assert_eq!(s.logging.format, LogFormat::Pretty);
    }

    // ── load_settings ───────────────────────────────────────────────

    #[test]
    fn load_from_file_merges_over_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"keepalive": {{"write_wait_secs": 5}}, "completion": {{"max_inflight": 8}}}}"#
        )
        .unwrap();
        let s = load_settings(Some(file.path())).unwrap();
        assert_eq!(s.keepalive.write_wait_secs, 5);
        assert_eq!(s.keepalive.pong_wait_secs, 60);
        assert_eq!(s.completion.max_inflight, 8);
    }

    #[test]
    fn load_missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_settings(Some(&dir.path().join("nope.json"))).unwrap_err();
        assert!(matches!(err, crate::SettingsError::Read { .. }));
    }

    #[test]
    fn load_invalid_json_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let err = load_settings(Some(file.path())).unwrap_err();
        assert!(matches!(err, crate::SettingsError::Parse { .. }));
    }

    #[test]
    fn load_rejects_invalid_keepalive() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"keepalive": {{"pong_wait_secs": 10, "ping_period_secs": 20}}}}"#
        )
        .unwrap();
        let err = load_settings(Some(file.path())).unwrap_err();
        assert!(matches!(err, crate::SettingsError::Invalid {
                field: "keepalive.ping_period_secs",
                ..
            }));
    }
}
