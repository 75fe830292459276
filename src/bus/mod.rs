//! Subscriber registry and fan-out.
//!
//! This module contains:
//! - `Listener` trait: a subscriber callback receiving dispatched messages
//! - `listener_fn`: adapter turning an async closure into a `Listener`
//! - `Dispatcher`: handle-keyed registry with copy-on-write snapshots

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::model::Message;

pub mod dispatcher;

pub use dispatcher::{Dispatcher, SubscriptionHandle};

/// Receives every message dispatched while it is registered.
///
/// Each call, including the synchronous part before the future is
/// returned, runs inside its own task, so implementations must not assume
/// they are invoked in order or one at a time.
pub trait Listener: Send + Sync {
    fn on_message(&self, message: Arc<Message>) -> BoxFuture<'static, ()>;
}

/// Listener backed by a closure.
pub struct FnListener<F> {
    f: F,
}

impl<F, Fut> Listener for FnListener<F>
where
    F: Fn(Arc<Message>) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn on_message(&self, message: Arc<Message>) -> BoxFuture<'static, ()> {
        Box::pin((self.f)(message))
    }
}

/// Wraps an async closure as a shareable listener.
///
/// ```ignore
/// let listener = listener_fn(|m| async move { println!("{}", m.key) });
/// let handle = dispatcher.register(listener);
/// ```
pub fn listener_fn<F, Fut>(f: F) -> Arc<dyn Listener>
where
    F: Fn(Arc<Message>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(FnListener { f })
}
