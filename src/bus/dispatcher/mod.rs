//! Handle-keyed fan-out registry.
//!
//! The registry is an immutable snapshot (`Arc<[Subscription]>`) behind a
//! single pointer. `register`/`unregister` serialize on the writer mutex,
//! build a new snapshot and swap it in. `send` only clones the current
//! pointer, so it never waits for a writer that is rebuilding and never
//! sees a half-built registry. The pointer itself sits behind an `RwLock`:
//! a reader can briefly contend with a swap, never with a rebuild.
//!
//! Delivery spawns one task per listener per message, and the listener's
//! `on_message` is called inside that task. There is no ordering
//! between subscribers and none per subscriber either: a consumer needing
//! order must serialize on its side (single task draining an ordered
//! queue). Nothing here bounds the number of in-flight delivery tasks, so
//! slow listeners should hand off to a bounded queue with a drop policy,
//! as the WebSocket bridge does.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::{debug, error, info};

use super::Listener;
use crate::model::Message;
use crate::utils::metrics::RuntimeStatistics;

/// Opaque registration handle returned by [`Dispatcher::register`].
///
/// Handles are never reused within a dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

impl fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone)]
struct Subscription {
    handle: SubscriptionHandle,
    listener: Arc<dyn Listener>,
}

/// Concurrency-safe multi-subscriber dispatcher.
pub struct Dispatcher {
    /// Serializes writers; holds the next handle id.
    writer: Mutex<u64>,
    /// Current registry snapshot.
    snapshot: RwLock<Arc<[Subscription]>>,
    stats: Arc<RuntimeStatistics>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    /// Create a dispatcher with its own statistics.
    pub fn new() -> Self {
        Self::with_stats(Arc::new(RuntimeStatistics::new()))
    }

    /// Create a dispatcher reporting its listener count into `stats`.
    pub fn with_stats(stats: Arc<RuntimeStatistics>) -> Self {
        let empty: Arc<[Subscription]> = Arc::from(Vec::new());
        Self {
            writer: Mutex::new(0),
            snapshot: RwLock::new(empty),
            stats,
        }
    }

    pub fn stats(&self) -> &Arc<RuntimeStatistics> {
        &self.stats
    }

    /// Installs a listener.
    ///
    /// Registering the same listener twice yields two independent handles.
    pub fn register(&self, listener: Arc<dyn Listener>) -> SubscriptionHandle {
        let mut next_id = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let handle = SubscriptionHandle(*next_id);
        *next_id += 1;

        let mut entries: Vec<Subscription> = self.load().iter().cloned().collect();
        entries.push(Subscription { handle, listener });
        let total = entries.len();
        self.store(entries);
        drop(next_id);

        info!(handle = %handle, total, "New listener added to dispatcher");
        handle
    }

    /// Removes the listener behind `handle`.
    ///
    /// Returns false (and changes nothing) if it was already removed.
    pub fn unregister(&self, handle: SubscriptionHandle) -> bool {
        let guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);

        let current = self.load();
        if !current.iter().any(|s| s.handle == handle) {
            debug!(handle = %handle, "Listener already removed");
            return false;
        }

        let entries: Vec<Subscription> = current
            .iter()
            .filter(|s| s.handle != handle)
            .cloned()
            .collect();
        let total = entries.len();
        self.store(entries);
        drop(guard);

        info!(handle = %handle, total, "Listener removed from dispatcher");
        true
    }

    /// Number of registered listeners.
    pub fn count(&self) -> usize {
        self.load().len()
    }

    /// Delivers `message` to every registered listener, one task each.
    ///
    /// Never blocks and never waits for delivery. Must be called from
    /// within a Tokio runtime. Returns the number of listeners targeted.
    pub fn send(&self, message: Message) -> usize {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                error!(error = %e, "Dispatch outside of a Tokio runtime");
                return 0;
            }
        };

        let subscriptions = self.load();
        let message = Arc::new(message);
        for subscription in subscriptions.iter() {
            let listener = Arc::clone(&subscription.listener);
            let message = Arc::clone(&message);
            runtime.spawn(async move { listener.on_message(message).await });
        }
        subscriptions.len()
    }

    fn load(&self) -> Arc<[Subscription]> {
        let snapshot = self.snapshot.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&*snapshot)
    }

    // Caller holds the writer mutex.
    fn store(&self, entries: Vec<Subscription>) {
        let total = entries.len();
        let next: Arc<[Subscription]> = Arc::from(entries);
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = next;
        self.stats.set_active_listeners(total);
    }
}

#[cfg(test)]
mod tests;
