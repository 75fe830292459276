//! Bootstrap utilities for the eos binary.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use super::metrics::{RuntimeStatistics, StatsSnapshot};
use crate::config::LOG_ENV_VAR;

/// Initialize tracing with the EOS_LOG environment variable.
///
/// Defaults to "info" level if EOS_LOG is not set.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

/// Spawns a task logging packet rate and error counters every `interval`.
///
/// Returns `None` when `interval` is zero.
pub fn spawn_stats_reporter(
    stats: Arc<RuntimeStatistics>,
    interval: Duration,
) -> Option<JoinHandle<()>> {
    if interval.is_zero() {
        return None;
    }

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // First tick completes immediately.
        ticker.tick().await;

        let mut previous = stats.snapshot();
        loop {
            ticker.tick().await;
            let current = stats.snapshot();
            report(&previous, &current, interval);
            previous = current;
        }
    }))
}

fn report(previous: &StatsSnapshot, current: &StatsSnapshot, interval: Duration) {
    let rps = packet_rate(previous, current, interval);
    info!(
        rps = %format!("{:.2}", rps),
        packets = current.udp_packets,
        error_conn = current.udp_error_conn,
        error_parse = current.udp_error_parse,
        error_auth = current.udp_error_auth,
        delivered = current.delivered,
        dropped = current.dropped,
        listeners = current.active_listeners,
        "Runtime statistics"
    );
}

/// Packets per second between two snapshots.
pub fn packet_rate(previous: &StatsSnapshot, current: &StatsSnapshot, interval: Duration) -> f64 {
    let secs = interval.as_secs_f64();
    if secs == 0.0 {
        return 0.0;
    }
    current.udp_packets.saturating_sub(previous.udp_packets) as f64 / secs
}
