//! Listener configuration types.
//!
//! These are the plain structures handed to the transports; zero values
//! fall back to the defaults below.

use serde::Deserialize;

/// Default maximum size of a single datagram (8 KiB).
pub const DEFAULT_PACKET_SIZE: usize = 8 * 1024;
/// Default UDP receive buffer hint (4 MiB).
pub const DEFAULT_BUFFER_SIZE: usize = 4 * 1024 * 1024;
/// Default per-subscriber delivery queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// UDP ingestion configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UdpConfig {
    /// Start the UDP listener.
    pub enabled: bool,
    /// Address to bind to.
    pub address: String,
    /// Max datagram size in bytes; 0 means default.
    pub packet_size: usize,
    /// Socket receive buffer hint in bytes; 0 means default.
    pub buffer_size: usize,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            address: "0.0.0.0:8087".to_string(),
            packet_size: 0,
            buffer_size: 0,
        }
    }
}

impl UdpConfig {
    /// Config bound to `address` with default sizes.
    pub fn with_address(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }

    pub fn effective_packet_size(&self) -> usize {
        if self.packet_size == 0 {
            DEFAULT_PACKET_SIZE
        } else {
            self.packet_size
        }
    }

    pub fn effective_buffer_size(&self) -> usize {
        if self.buffer_size == 0 {
            DEFAULT_BUFFER_SIZE
        } else {
            self.buffer_size
        }
    }
}

/// How the subscriber bridge applies handshake filters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    /// Forward only messages whose key matches the subscriber's filter.
    #[default]
    Tags,
    /// Forward every message to every subscriber, ignoring filters.
    Broadcast,
}

/// HTTP/WebSocket subscriber endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Start the HTTP listener.
    pub enabled: bool,
    /// Address to bind to.
    pub address: String,
    /// Serve runtime statistics at `/stat`.
    pub stats: bool,
    /// Filtering behaviour for subscribers.
    pub filter_mode: FilterMode,
    /// Per-subscriber delivery queue capacity; 0 means default.
    pub queue_capacity: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            address: "0.0.0.0:8090".to_string(),
            stats: true,
            filter_mode: FilterMode::Tags,
            queue_capacity: 0,
        }
    }
}

impl HttpConfig {
    /// Config bound to `address`, other fields default.
    pub fn with_address(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }

    pub fn effective_queue_capacity(&self) -> usize {
        if self.queue_capacity == 0 {
            DEFAULT_QUEUE_CAPACITY
        } else {
            self.queue_capacity
        }
    }
}
