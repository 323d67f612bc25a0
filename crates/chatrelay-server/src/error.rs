//! Server errors.

use std::io;

/// Failures that abort server startup.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The listener could not bind.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address attempted.
        addr: String,
        /// Underlying I/O error.
        source: io::Error,
    },
    /// Other I/O failure on the listener.
    #[error("server I/O error: {0}")]
    Io(#[from] io::Error),
}
