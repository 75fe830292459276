//! Test helpers shared by unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::mpsc;

use crate::bus::Listener;
use crate::encoding::parse_key;
use crate::model::Message;

/// Builds a message for a valid address.
pub fn make_message(address: &str, payload: &str) -> Message {
    Message::new(parse_key(address).expect("valid test address"), payload)
}

/// Listener that counts deliveries and forwards each message to a channel.
///
/// Both happen in the returned future, so only executed deliveries count.
pub struct CountingListener {
    count: Arc<AtomicUsize>,
    tx: mpsc::UnboundedSender<Arc<Message>>,
}

impl CountingListener {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Arc<Message>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let listener = Arc::new(Self {
            count: Arc::new(AtomicUsize::new(0)),
            tx,
        });
        (listener, rx)
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl Listener for CountingListener {
    fn on_message(&self, message: Arc<Message>) -> BoxFuture<'static, ()> {
        let count = Arc::clone(&self.count);
        let tx = self.tx.clone();
        Box::pin(async move {
            count.fetch_add(1, Ordering::SeqCst);
            let _ = tx.send(message);
        })
    }
}
