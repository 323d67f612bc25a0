//! # chatrelay
//!
//! Chat relay binary: loads settings, installs logging and metrics, wires
//! the Groq clients into the server and runs until ctrl-c.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chatrelay_llm::{GroqChatClient, GroqChatConfig, GroqWhisperClient, WhisperConfig};
use chatrelay_logging::{LoggingConfig, init_logging};
use chatrelay_server::config::ServerConfig;
use chatrelay_server::server::RelayServer;
use chatrelay_settings::{LogFormat, RelaySettings, load_settings};
use clap::Parser;

/// Seconds to wait for background tasks after ctrl-c.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Broadcast chat relay with an AI participant.
#[derive(Parser, Debug)]
#[command(name = "chatrelay", about = "Broadcast chat relay with an AI participant")]
struct Cli {
    /// Path to a JSON settings file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides settings and `PORT`).
    #[arg(long)]
    port: Option<u16>,

    /// Log output format: `pretty` or `json`.
    #[arg(long)]
    log_format: Option<LogFormat>,
}

impl Cli {
    fn apply(&self, settings: &mut RelaySettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(format) = self.log_format {
            settings.logging.format = format;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let mut settings = load_settings(args.config.as_deref()).context("Failed to load settings")?;
    args.apply(&mut settings);

    init_logging(&LoggingConfig::from(&settings.logging)).context("Failed to initialize logging")?;

    let metrics = match chatrelay_server::install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "metrics recorder unavailable, /metrics disabled");
            None
        }
    };

    if settings.completion.api_key.is_none() {
        tracing::warn!("GROQ_API_KEY not set, AI replies will fall back to the apology message");
    }

    let completion = GroqChatClient::new(GroqChatConfig::from(&settings.completion))
        .context("Failed to build completion client")?;
    let transcriber = GroqWhisperClient::new(WhisperConfig::from_settings(
        &settings.completion,
        &settings.transcription,
    ))
    .context("Failed to build transcription client")?;

    let server = RelayServer::new(
        ServerConfig::from(&settings),
        Arc::new(completion),
        Arc::new(transcriber),
        metrics,
    );

    let addr = server.listen().await.context("Failed to bind server")?;
    tracing::info!(
        model = %settings.completion.model,
        "chat relay listening on http://{addr} (ws://{addr}/ws)"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    server.shutdown_gracefully(Some(SHUTDOWN_TIMEOUT)).await;
    tracing::info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_leave_settings_alone() {
        let cli = Cli::parse_from(["chatrelay"]);
        let mut settings = RelaySettings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn cli_overrides_win() {
        let cli = Cli::parse_from([
            "chatrelay",
            "--host",
            "127.0.0.1",
            "--port",
            "9999",
            "--log-format",
            "json",
        ]);
        let mut settings = RelaySettings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 9999);
        assert_eq!(settings.logging.format, LogFormat::Json);
    }

    #[test]
    fn cli_config_path() {
        let cli = Cli::parse_from(["chatrelay", "--config", "/etc/relay.json"]);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/relay.json")));
    }

    #[test]
    fn cli_rejects_bad_port() {
        assert!(Cli::try_parse_from(["chatrelay", "--port", "99999"]).is_err());
    }

    #[tokio::test]
    async fn server_graceful_shutdown() {
        let server = RelayServer::new(
            ServerConfig::default(),
            Arc::new(chatrelay_llm::mock::ScriptedCompletion::new(vec![])),
            Arc::new(chatrelay_llm::mock::ScriptedTranscription::new(vec![])),
            None,
        );
        let _ = server.listen().await.unwrap();

        tokio::time::timeout(
            Duration::from_secs(5),
            server.shutdown_gracefully(Some(Duration::from_secs(2))),
        )
        .await
        .expect("shutdown timed out");
        assert!(server.shutdown().is_shutting_down());
    }
}
