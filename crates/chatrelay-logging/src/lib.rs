//! # chatrelay-logging
//!
//! Installs the global `tracing` subscriber: an [`EnvFilter`] built from the
//! configured level (with `RUST_LOG` taking precedence) feeding either a
//! human-readable or a JSON fmt layer.

#![deny(unsafe_code)]

use chatrelay_settings::{LogFormat, LoggingSettings};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Errors raised while installing the subscriber.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    /// A filter directive did not parse.
    #[error("invalid log filter '{directives}': {source}")]
    Filter {
        /// The directive string that was rejected.
        directives: String,
        /// Parser error.
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },
    /// A global subscriber was already set.
    #[error("logging already initialized: {0}")]
    AlreadyInitialized(#[from] tracing_subscriber::util::TryInitError),
}

/// Subscriber configuration.
#[derive(Clone, Debug)]
pub struct LoggingConfig {
    /// Default level directive (`info`, `debug`, ...).
    pub level: String,
    /// Per-module overrides, e.g. `("chatrelay_server", "trace")`.
    pub modules: Vec<(String, String)>,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::from(&LoggingSettings::default())
    }
}

impl From<&LoggingSettings> for LoggingConfig {
    fn from(s: &LoggingSettings) -> Self {
        Self {
            level: s.level.clone(),
            modules: s.modules.clone(),
            format: s.format,
        }
    }
}

/// Join a level and module overrides into one filter directive string.
pub fn filter_directives(level: &str, modules: &[(String, String)]) -> String {
    let mut directives = level.trim().to_lowercase();
    for (module, module_level) in modules {
        directives.push(',');
        directives.push_str(module);
        directives.push('=');
        directives.push_str(&module_level.to_lowercase());
    }
    directives
}

/// Build an [`EnvFilter`] from a level and module overrides.
pub fn build_filter(level: &str, modules: &[(String, String)]) -> Result<EnvFilter, LoggingError> {
    let directives = filter_directives(level, modules);
    EnvFilter::try_new(&directives).map_err(|source| LoggingError::Filter { directives, source })
}

/// Install the global subscriber. Call once at startup.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => build_filter(&config.level, &config.modules)?,
    };

    let fmt_layer: Box<dyn Layer<Registry> + Send + Sync> = match config.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(fmt_layer.with_filter(filter))
        .try_init()?;
    Ok(())
}
