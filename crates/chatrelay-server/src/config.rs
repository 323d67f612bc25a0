//! Server configuration.

use std::time::Duration;

use chatrelay_settings::RelaySettings;

/// Keepalive timing and frame limits applied to every peer connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeepaliveConfig {
    /// Deadline for writing one frame.
    pub write_wait: Duration,
    /// Read deadline, renewed on every pong.
    pub pong_wait: Duration,
    /// Interval between pings. Must be below `pong_wait`.
    pub ping_period: Duration,
    /// Largest inbound frame accepted, in bytes.
    pub max_message_size: usize,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            write_wait: Duration::from_secs(10),
            pong_wait: Duration::from_secs(60),
            ping_period: Duration::from_secs(54),
            max_message_size: 512 * 1024,
        }
    }
}

/// Hub queue sizing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HubConfig {
    /// Capacity of each connection's outbound queue.
    pub outbound_queue_capacity: usize,
    /// Capacity of the hub's event inbox.
    pub event_queue_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            outbound_queue_capacity: 256,
            event_queue_capacity: 1024,
        }
    }
}

/// Configuration for the relay server.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` for auto-assign).
    pub port: u16,
    /// Per-connection keepalive.
    pub keepalive: KeepaliveConfig,
    /// Hub queue sizing.
    pub hub: HubConfig,
    /// Maximum completion calls in flight.
    pub max_inflight: usize,
    /// Largest accepted audio upload, in bytes.
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            keepalive: KeepaliveConfig::default(),
            hub: HubConfig::default(),
            max_inflight: 32,
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

impl From<&RelaySettings> for ServerConfig {
    fn from(s: &RelaySettings) -> Self {
        Self {
            host: s.server.host.clone(),
            port: s.server.port,
            keepalive: KeepaliveConfig {
                write_wait: s.keepalive.write_wait(),
                pong_wait: s.keepalive.pong_wait(),
                ping_period: s.keepalive.ping_period(),
                max_message_size: s.keepalive.max_message_size,
            },
            hub: HubConfig {
                outbound_queue_capacity: s.hub.outbound_queue_capacity,
                event_queue_capacity: s.hub.event_queue_capacity,
            },
            max_inflight: s.completion.max_inflight,
            max_upload_bytes: s.transcription.max_upload_bytes,
        }
    }
}

impl ServerConfig {
    /// `host:port` string for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
