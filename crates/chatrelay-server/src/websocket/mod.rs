//! WebSocket hub, per-connection pumps, and upgrade handling.

pub mod connection;
pub mod hub;
