//! Shared utilities for integration tests.
//!
//! Starts a broker on ephemeral loopback ports and provides WebSocket and
//! UDP client helpers.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use eos::auth::{sign, Authenticator, RealmSecretTable};
use eos::bus::Dispatcher;
use eos::config::{FilterMode, HttpConfig, UdpConfig};
use eos::transport::{BridgeState, HttpServer, PacketProcessor, UdpServer};
use eos::utils::metrics::RuntimeStatistics;

pub const REALM: &str = "shop";
pub const SECRET: &str = "s3cr3t";

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A running broker bound to `127.0.0.1:0`.
pub struct TestBroker {
    pub udp: UdpServer,
    pub http: HttpServer,
    pub dispatcher: Arc<Dispatcher>,
    pub stats: Arc<RuntimeStatistics>,
}

impl TestBroker {
    pub async fn start(filter_mode: FilterMode) -> Self {
        let stats = Arc::new(RuntimeStatistics::new());
        let dispatcher = Arc::new(Dispatcher::with_stats(Arc::clone(&stats)));
        let authenticator = Authenticator::new(RealmSecretTable::new().with_realm(REALM, SECRET));

        let udp = UdpServer::start(
            &UdpConfig::with_address("127.0.0.1:0"),
            PacketProcessor::new(
                authenticator.clone(),
                Arc::clone(&dispatcher),
                Arc::clone(&stats),
            ),
        )
        .await
        .expect("udp bind");

        let mut http_config = HttpConfig::with_address("127.0.0.1:0");
        http_config.filter_mode = filter_mode;
        let bridge = BridgeState::new(
            &http_config,
            Arc::clone(&dispatcher),
            authenticator,
            Arc::clone(&stats),
        );
        let http = HttpServer::start(&http_config, bridge)
            .await
            .expect("http bind");

        Self {
            udp,
            http,
            dispatcher,
            stats,
        }
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/", self.http.local_addr())
    }

    pub fn http_addr(&self) -> SocketAddr {
        self.http.local_addr()
    }

    /// Connects a client and consumes the `uuid` frame.
    pub async fn connect(&self) -> (WsClient, String) {
        let (mut ws, _) = connect_async(self.ws_url()).await.expect("ws connect");
        let greeting = next_text(&mut ws).await;
        let id = greeting
            .strip_prefix("uuid\n")
            .expect("uuid frame first")
            .to_string();
        (ws, id)
    }

    /// Sends a signed datagram from an ephemeral socket.
    pub async fn publish(&self, address: &str, nonce: &str, payload: &str) {
        self.publish_raw(signed_datagram(address, nonce, payload, SECRET).as_bytes())
            .await;
    }

    pub async fn publish_raw(&self, data: &[u8]) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.expect("udp client");
        socket
            .send_to(data, self.udp.local_addr())
            .await
            .expect("udp send");
    }

    pub async fn wait_for_listeners(&self, count: usize) {
        wait_until(|| self.dispatcher.count() == count).await;
    }

    pub async fn stop(self) {
        self.http.stop().await;
        self.udp.stop().await;
    }
}

/// `nonce\nsignature\naddress\npayload`
pub fn signed_datagram(address: &str, nonce: &str, payload: &str, secret: &str) -> String {
    format!(
        "{}\n{}\n{}\n{}",
        nonce,
        sign(nonce, payload, secret),
        address,
        payload
    )
}

pub fn handshake(nonce: &str, filter: &str) -> String {
    format!(
        "subscribe\n{}\n{}\n{}\n{}",
        REALM,
        nonce,
        filter,
        sign(nonce, filter, SECRET)
    )
}

pub async fn send_text(ws: &mut WsClient, text: &str) {
    ws.send(Message::Text(text.to_string().into()))
        .await
        .expect("ws send");
}

/// Subscribes and waits for `connected`.
pub async fn subscribe(ws: &mut WsClient, nonce: &str, filter: &str) {
    send_text(ws, &handshake(nonce, filter)).await;
    assert_eq!(next_text(ws).await, "connected");
}

pub async fn next_text(ws: &mut WsClient) -> String {
    try_next_text(ws, Duration::from_secs(2))
        .await
        .expect("no text frame in time")
}

pub async fn try_next_text(ws: &mut WsClient, wait: Duration) -> Option<String> {
    let deadline = tokio::time::Instant::now() + wait;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        match timeout(remaining, ws.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => return Some(text.to_string()),
            Ok(Some(Ok(Message::Close(_)))) | Ok(None) | Ok(Some(Err(_))) | Err(_) => {
                return None
            }
            Ok(Some(Ok(_))) => continue,
        }
    }
}

pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    timeout(Duration::from_secs(2), async {
        while !cond() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
