//! WebSocket subscriber bridge and HTTP surface.
//!
//! Routes:
//! - `/`: WebSocket upgrade, one [`SubscriberSession`] per connection
//! - `/stat`: JSON runtime statistics (when enabled)
//!
//! Each connection has a bounded outbound queue drained by a single writer
//! task, the only owner of the socket's write half. Delivery frames that do
//! not fit are dropped and counted.

mod filter;
mod session;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub use filter::SubscriptionFilter;
pub use session::{
    delivery_frame, error_frame, uuid_frame, ForwardingListener, Handshake, SessionClosed,
    SubscriberSession, CONNECTED_FRAME, SUBSCRIBE_COMMAND,
};

use super::TransportError;
use crate::auth::{AuthError, Authenticator};
use crate::bus::Dispatcher;
use crate::config::{FilterMode, HttpConfig};
use crate::utils::metrics::{RuntimeStatistics, StatsSnapshot};

/// Rejected handshake; `Display` is the text of the `error` frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandshakeError {
    #[error("Wrong handshake packet")]
    WrongFieldCount(usize),

    #[error("Unknown command {0}")]
    UnknownCommand(String),

    #[error("Invalid filter {0}")]
    InvalidFilter(String),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// Everything a subscriber session needs from the broker.
#[derive(Clone)]
pub struct BridgeState {
    pub dispatcher: Arc<Dispatcher>,
    pub authenticator: Authenticator,
    pub stats: Arc<RuntimeStatistics>,
    pub filter_mode: FilterMode,
    pub queue_capacity: usize,
}

impl BridgeState {
    pub fn new(
        config: &HttpConfig,
        dispatcher: Arc<Dispatcher>,
        authenticator: Authenticator,
        stats: Arc<RuntimeStatistics>,
    ) -> Self {
        Self {
            dispatcher,
            authenticator,
            stats,
            filter_mode: config.filter_mode,
            queue_capacity: config.effective_queue_capacity(),
        }
    }
}

#[derive(Clone)]
struct AppState {
    bridge: BridgeState,
    shutdown: watch::Receiver<bool>,
}

/// Running HTTP/WebSocket listener.
pub struct HttpServer {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl HttpServer {
    /// Binds the listener and starts serving.
    pub async fn start(config: &HttpConfig, bridge: BridgeState) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(&config.address)
            .await
            .map_err(|source| TransportError::Bind {
                addr: config.address.clone(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(TransportError::LocalAddr)?;

        let (shutdown, shutdown_rx) = watch::channel(false);
        let app = router(
            AppState {
                bridge,
                shutdown: shutdown_rx.clone(),
            },
            config.stats,
        );

        if config.stats {
            info!("Stats available at /stat");
        }
        info!(addr = %local_addr, "Starting HTTP server");

        let mut server_shutdown = shutdown_rx;
        let task = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = server_shutdown.changed().await;
                })
                .await;
            if let Err(e) = served {
                warn!(error = %e, "HTTP server stopped with error");
            }
        });

        Ok(Self {
            local_addr,
            shutdown,
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting connections and closes open subscriber sessions.
    pub async fn stop(self) {
        info!(addr = %self.local_addr, "Stopping HTTP server");
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "HTTP server task ended abnormally");
        }
    }
}

fn router(state: AppState, stats: bool) -> Router {
    let mut router = Router::new().route("/", get(ws_handler));
    if stats {
        router = router.route("/stat", get(stat_handler));
    }
    router.with_state(state)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| serve_socket(state, socket))
}

async fn stat_handler(State(state): State<AppState>) -> Json<StatsSnapshot> {
    Json(state.bridge.stats.snapshot())
}

async fn serve_socket(state: AppState, socket: WebSocket) {
    let AppState {
        bridge,
        mut shutdown,
    } = state;
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(bridge.queue_capacity);

    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if let Err(e) = sink.send(WsMessage::Text(frame.into())).await {
                debug!(error = %e, "WebSocket write failed");
                break;
            }
        }
        let _ = sink.close().await;
    });

    let mut session = SubscriberSession::new(bridge, tx);
    debug!(session = %session.id(), "New websocket connection");

    if session.greet().await.is_ok() {
        loop {
            let inbound = tokio::select! {
                _ = shutdown.changed() => break,
                inbound = stream.next() => inbound,
            };

            let handled = match inbound {
                Some(Ok(WsMessage::Text(text))) => session.handle_command(text.as_str()).await,
                Some(Ok(WsMessage::Binary(bytes))) => {
                    session.handle_command(&String::from_utf8_lossy(&bytes)).await
                }
                Some(Ok(WsMessage::Close(_))) | None => break,
                Some(Ok(_)) => Ok(()),
                Some(Err(e)) => {
                    debug!(session = %session.id(), error = %e, "WebSocket read error");
                    break;
                }
            };

            if handled.is_err() {
                break;
            }
        }
    }

    session.close();
    drop(session);
    writer.abort();
}
