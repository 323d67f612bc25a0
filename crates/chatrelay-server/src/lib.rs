//! # chatrelay-server
//!
//! Axum server for the chat relay.
//!
//! - [`websocket::hub::Hub`]: serialized registry and broadcaster
//! - [`websocket::connection`]: per-connection read/write pumps with keepalive
//! - [`orchestrator::Orchestrator`]: AI reply generation with apology fallback
//! - [`server::RelayServer`]: router (`/ws`, `/health`, `/api/transcribe`,
//!   `/metrics`), listener and graceful shutdown

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod health;
pub mod metrics;
pub mod orchestrator;
pub mod server;
pub mod shutdown;
pub mod transcription;
pub mod websocket;

pub use config::{HubConfig, KeepaliveConfig, ServerConfig};
pub use error::ServerError;
pub use self::metrics::install_recorder;
pub use orchestrator::Orchestrator;
pub use server::RelayServer;
pub use websocket::hub::{Frame, Hub, HubStopped};
