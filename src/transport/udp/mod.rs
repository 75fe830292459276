//! UDP ingestion server.
//!
//! One long-lived task reads datagrams; each datagram is decoded,
//! authenticated and dispatched in its own task so the receive loop only
//! ever waits on the socket. Per-datagram failures are counted and dropped;
//! datagrams longer than the configured packet size count as parse errors
//! instead of being processed truncated.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::TransportError;
use crate::auth::{AuthError, Authenticator};
use crate::bus::Dispatcher;
use crate::config::UdpConfig;
use crate::encoding::{unmarshal_packet, DecodeError};
use crate::utils::metrics::RuntimeStatistics;

/// Why a datagram was dropped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IngestError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// Decode -> authenticate -> dispatch for a single datagram.
#[derive(Clone)]
pub struct PacketProcessor {
    authenticator: Authenticator,
    dispatcher: Arc<Dispatcher>,
    stats: Arc<RuntimeStatistics>,
}

impl PacketProcessor {
    pub fn new(
        authenticator: Authenticator,
        dispatcher: Arc<Dispatcher>,
        stats: Arc<RuntimeStatistics>,
    ) -> Self {
        Self {
            authenticator,
            dispatcher,
            stats,
        }
    }

    /// Processes one datagram, returning how many listeners it was sent to.
    ///
    /// Failures bump the parse or auth counter.
    pub fn process(&self, data: &[u8]) -> Result<usize, IngestError> {
        let packet = unmarshal_packet(data).inspect_err(|_| {
            RuntimeStatistics::inc(&self.stats.udp_error_parse);
        })?;

        self.authenticator.verify(&packet).inspect_err(|_| {
            RuntimeStatistics::inc(&self.stats.udp_error_auth);
        })?;

        Ok(self.dispatcher.send(packet.message))
    }
}

/// Running UDP listener.
pub struct UdpServer {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl UdpServer {
    /// Binds the socket and starts the receive loop.
    ///
    /// A bind failure is returned to the caller; nothing is spawned.
    pub async fn start(
        config: &UdpConfig,
        processor: PacketProcessor,
    ) -> Result<Self, TransportError> {
        let packet_size = config.effective_packet_size();
        let buffer_size = config.effective_buffer_size();

        let socket = UdpSocket::bind(&config.address)
            .await
            .map_err(|source| TransportError::Bind {
                addr: config.address.clone(),
                source,
            })?;
        apply_receive_buffer(&socket, buffer_size);
        let local_addr = socket.local_addr().map_err(TransportError::LocalAddr)?;

        info!(
            addr = %local_addr,
            max_packet_size = packet_size,
            buffer_size,
            "Listening UDP"
        );

        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(receive_loop(socket, packet_size, processor, shutdown_rx));

        Ok(Self {
            local_addr,
            shutdown,
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops the receive loop and closes the socket.
    ///
    /// Datagrams already handed to processing tasks still complete.
    pub async fn stop(self) {
        info!(addr = %self.local_addr, "Closing UDP listener");
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "UDP receive loop ended abnormally");
        }
    }
}

async fn receive_loop(
    socket: UdpSocket,
    packet_size: usize,
    processor: PacketProcessor,
    mut shutdown: watch::Receiver<bool>,
) {
    // One spare byte tells an oversized datagram apart from a full one.
    let mut buf = vec![0u8; packet_size + 1];

    loop {
        tokio::select! {
            biased;

            _ = shutdown.changed() => break,

            received = socket.recv_from(&mut buf) => {
                RuntimeStatistics::inc(&processor.stats.udp_packets);
                match received {
                    Ok((len, peer)) if len > packet_size => {
                        RuntimeStatistics::inc(&processor.stats.udp_error_parse);
                        debug!(peer = %peer, max_packet_size = packet_size, "Dropped oversized datagram");
                    }
                    Ok((len, peer)) => {
                        let data = buf[..len].to_vec();
                        let processor = processor.clone();
                        tokio::spawn(async move {
                            if let Err(e) = processor.process(&data) {
                                debug!(peer = %peer, error = %e, "Dropped datagram");
                            }
                        });
                    }
                    Err(e) => {
                        RuntimeStatistics::inc(&processor.stats.udp_error_conn);
                        debug!(error = %e, "UDP read error");
                    }
                }
            }
        }
    }

    debug!("UDP receive loop stopped");
}

#[cfg(unix)]
fn apply_receive_buffer(socket: &UdpSocket, size: usize) {
    use nix::sys::socket::{setsockopt, sockopt};

    if let Err(e) = setsockopt(socket, sockopt::RcvBuf, &size) {
        warn!(error = %e, size, "Failed to set UDP receive buffer size");
    }
}

#[cfg(not(unix))]
fn apply_receive_buffer(_socket: &UdpSocket, size: usize) {
    debug!(size, "UDP receive buffer hint not applied on this platform");
}
