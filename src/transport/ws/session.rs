//! Per-connection subscriber state.
//!
//! A session owns the outbound frame queue of one connection. The first
//! valid `subscribe` handshake registers a [`ForwardingListener`] with the
//! dispatcher; later handshakes are acknowledged but do not subscribe
//! again. Dropping the session unregisters the listener.

use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::filter::SubscriptionFilter;
use super::{BridgeState, HandshakeError};
use crate::bus::{Listener, SubscriptionHandle};
use crate::config::FilterMode;
use crate::model::Message;
use crate::utils::metrics::RuntimeStatistics;

/// Command tag of the handshake frame.
pub const SUBSCRIBE_COMMAND: &str = "subscribe";
/// Handshake acknowledgement frame.
pub const CONNECTED_FRAME: &str = "connected";

const HANDSHAKE_FIELDS: usize = 5;

/// `uuid\n<session-id>`, sent once on connect.
pub fn uuid_frame(id: &Uuid) -> String {
    format!("uuid\n{}", id.to_string().to_uppercase())
}

/// `log\n<key.path>\n<payload>`.
pub fn delivery_frame(message: &Message) -> String {
    format!("log\n{}\n{}", message.key.path(), message.payload)
}

/// `error\n<message>`.
pub fn error_frame(error: &HandshakeError) -> String {
    format!("error\n{}", error)
}

/// `subscribe\n<realm>\n<nonce>\n<filter>\n<hash>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub realm: String,
    pub nonce: String,
    pub filter: String,
    pub hash: String,
}

impl Handshake {
    pub fn parse(frame: &str) -> Result<Self, HandshakeError> {
        let fields: Vec<&str> = frame.split('\n').collect();
        if fields.len() != HANDSHAKE_FIELDS {
            return Err(HandshakeError::WrongFieldCount(fields.len()));
        }
        if fields[0] != SUBSCRIBE_COMMAND {
            return Err(HandshakeError::UnknownCommand(fields[0].to_string()));
        }

        Ok(Self {
            realm: fields[1].to_string(),
            nonce: fields[2].to_string(),
            filter: fields[3].to_string(),
            hash: fields[4].to_string(),
        })
    }
}

/// The outbound queue is gone; the connection is finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("session outbound queue closed")]
pub struct SessionClosed;

pub struct SubscriberSession {
    id: Uuid,
    state: BridgeState,
    outbound: mpsc::Sender<String>,
    subscription: Option<SubscriptionHandle>,
}

impl SubscriberSession {
    pub fn new(state: BridgeState, outbound: mpsc::Sender<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            state,
            outbound,
            subscription: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    /// Queues the session id frame.
    pub async fn greet(&self) -> Result<(), SessionClosed> {
        self.queue(uuid_frame(&self.id)).await
    }

    /// Handles one inbound text frame.
    ///
    /// Replies with `connected` or an `error` frame; a bad handshake leaves
    /// the connection open for another attempt.
    pub async fn handle_command(&mut self, frame: &str) -> Result<(), SessionClosed> {
        let accepted = Handshake::parse(frame).and_then(|h| {
            self.authorize(&h)
                .map(|filter| (h, filter))
        });

        match accepted {
            Ok((handshake, filter)) => {
                info!(
                    session = %self.id,
                    realm = %handshake.realm,
                    nonce = %handshake.nonce,
                    filter = %handshake.filter,
                    "Subscriber handshake accepted"
                );
                self.queue(CONNECTED_FRAME.to_string()).await?;
                self.subscribe(filter);
                Ok(())
            }
            Err(e) => {
                info!(session = %self.id, error = %e, "Subscriber handshake rejected");
                self.queue(error_frame(&e)).await
            }
        }
    }

    /// Unregisters the listener, if any. Safe to call repeatedly.
    pub fn close(&mut self) {
        if let Some(handle) = self.subscription.take() {
            self.state.dispatcher.unregister(handle);
            info!(session = %self.id, handle = %handle, "Subscriber disconnected");
        }
    }

    fn authorize(&self, handshake: &Handshake) -> Result<SubscriptionFilter, HandshakeError> {
        self.state.authenticator.verify_handshake(
            &handshake.realm,
            &handshake.nonce,
            &handshake.filter,
            &handshake.hash,
        )?;
        SubscriptionFilter::parse(&handshake.realm, &handshake.filter)
    }

    fn subscribe(&mut self, filter: SubscriptionFilter) {
        if self.subscription.is_some() {
            debug!(session = %self.id, "Already subscribed, ignoring handshake");
            return;
        }

        let filter = match self.state.filter_mode {
            FilterMode::Tags => Some(filter),
            FilterMode::Broadcast => None,
        };
        let listener = ForwardingListener::new(
            self.id,
            filter,
            self.outbound.clone(),
            Arc::clone(&self.state.stats),
        );
        self.subscription = Some(self.state.dispatcher.register(Arc::new(listener)));
    }

    async fn queue(&self, frame: String) -> Result<(), SessionClosed> {
        self.outbound.send(frame).await.map_err(|_| SessionClosed)
    }
}

impl Drop for SubscriberSession {
    fn drop(&mut self) {
        self.close();
    }
}

struct Forwarder {
    session: Uuid,
    /// `None` forwards everything.
    filter: Option<SubscriptionFilter>,
    outbound: mpsc::Sender<String>,
    stats: Arc<RuntimeStatistics>,
}

impl Forwarder {
    fn forward(&self, message: &Message) {
        if let Some(filter) = &self.filter {
            if !filter.matches(&message.key) {
                return;
            }
        }

        match self.outbound.try_send(delivery_frame(message)) {
            Ok(()) => RuntimeStatistics::inc(&self.stats.delivered),
            Err(TrySendError::Full(_)) => {
                RuntimeStatistics::inc(&self.stats.dropped);
                warn!(session = %self.session, key = %message.key, "Subscriber queue full, dropping message");
            }
            Err(TrySendError::Closed(_)) => {
                RuntimeStatistics::inc(&self.stats.dropped);
                debug!(session = %self.session, "Subscriber gone, dropping message");
            }
        }
    }
}

/// Dispatcher listener that filters messages and queues delivery frames
/// for one subscriber connection.
pub struct ForwardingListener {
    inner: Arc<Forwarder>,
}

impl ForwardingListener {
    fn new(
        session: Uuid,
        filter: Option<SubscriptionFilter>,
        outbound: mpsc::Sender<String>,
        stats: Arc<RuntimeStatistics>,
    ) -> Self {
        Self {
            inner: Arc::new(Forwarder {
                session,
                filter,
                outbound,
                stats,
            }),
        }
    }
}

impl Listener for ForwardingListener {
    fn on_message(&self, message: Arc<Message>) -> BoxFuture<'static, ()> {
        let inner = Arc::clone(&self.inner);
        Box::pin(async move { inner.forward(&message) })
    }
}
