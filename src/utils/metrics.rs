//! Runtime statistics counters.
//!
//! One `RuntimeStatistics` is created per server instance and shared via
//! `Arc` by the ingestion loop, the dispatcher and the subscriber bridge.
//! Counters are monotonic; `active_listeners` mirrors the dispatcher's
//! registry size.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;

/// Live counters.
#[derive(Debug, Default)]
pub struct RuntimeStatistics {
    /// Datagrams read (successfully or not) from the UDP socket.
    pub udp_packets: AtomicU64,
    /// Socket read errors.
    pub udp_error_conn: AtomicU64,
    /// Datagrams that failed to decode.
    pub udp_error_parse: AtomicU64,
    /// Datagrams that failed authentication.
    pub udp_error_auth: AtomicU64,
    /// Frames queued to subscribers.
    pub delivered: AtomicU64,
    /// Frames dropped because a subscriber queue was full or closed.
    pub dropped: AtomicU64,
    /// Currently registered dispatcher listeners.
    pub active_listeners: AtomicUsize,
}

/// Point-in-time copy of [`RuntimeStatistics`], rendered by `/stat`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub udp_packets: u64,
    pub udp_error_conn: u64,
    pub udp_error_parse: u64,
    pub udp_error_auth: u64,
    pub delivered: u64,
    pub dropped: u64,
    pub active_listeners: usize,
}

impl RuntimeStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_active_listeners(&self, count: usize) {
        self.active_listeners.store(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            udp_packets: self.udp_packets.load(Ordering::Relaxed),
            udp_error_conn: self.udp_error_conn.load(Ordering::Relaxed),
            udp_error_parse: self.udp_error_parse.load(Ordering::Relaxed),
            udp_error_auth: self.udp_error_auth.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            active_listeners: self.active_listeners.load(Ordering::Relaxed),
        }
    }
}
