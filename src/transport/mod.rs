//! Network bridges into and out of the dispatcher.
//!
//! - `udp`: signed datagram ingestion
//! - `ws`: WebSocket subscriber delivery and the `/stat` endpoint

pub mod udp;
pub mod ws;

pub use udp::{PacketProcessor, UdpServer};
pub use ws::{BridgeState, HttpServer, SubscriberSession};

/// Startup failures of a transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read local address: {0}")]
    LocalAddr(#[source] std::io::Error),
}
