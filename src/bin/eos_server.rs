//! eos-server: realtime event broker
//!
//! ## Architecture
//! ```text
//! [producers] --(signed UDP datagrams)--> [eos-server] --(WebSocket)--> [subscribers]
//! ```
//!
//! ## Configuration
//! - First argument or EOS_CONFIG: YAML configuration file
//! - EOS__SECTION__KEY: per-field overrides (e.g. EOS__UDP__ADDRESS)
//! - EOS_LOG: tracing filter (default: info)

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use eos::auth::Authenticator;
use eos::bus::Dispatcher;
use eos::config::Config;
use eos::transport::{BridgeState, HttpServer, PacketProcessor, UdpServer};
use eos::utils::bootstrap::{init_tracing, shutdown_signal, spawn_stats_reporter};
use eos::utils::metrics::RuntimeStatistics;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args().nth(1);
    let config = Config::load(config_path.as_deref())?;
    init_tracing();

    let realms = config.realm_table();
    if realms.is_empty() {
        warn!("No realms configured, every packet and handshake will be rejected");
    }
    info!(realms = ?realms.realms(), "Realms loaded");

    let authenticator = Authenticator::new(realms);
    let stats = Arc::new(RuntimeStatistics::new());
    let dispatcher = Arc::new(Dispatcher::with_stats(Arc::clone(&stats)));

    let udp = if config.udp.enabled {
        let processor = PacketProcessor::new(
            authenticator.clone(),
            Arc::clone(&dispatcher),
            Arc::clone(&stats),
        );
        Some(UdpServer::start(&config.udp, processor).await?)
    } else {
        info!("UDP ingestion disabled");
        None
    };

    let http = if config.http.enabled {
        let bridge = BridgeState::new(
            &config.http,
            Arc::clone(&dispatcher),
            authenticator,
            Arc::clone(&stats),
        );
        match HttpServer::start(&config.http, bridge).await {
            Ok(server) => Some(server),
            Err(e) => {
                if let Some(udp) = udp {
                    udp.stop().await;
                }
                return Err(e.into());
            }
        }
    } else {
        info!("WebSocket bridge disabled");
        None
    };

    let reporter = spawn_stats_reporter(
        Arc::clone(&stats),
        Duration::from_secs(config.stats_interval_secs),
    );

    info!("eos-server started");
    shutdown_signal().await;
    info!("Shutting down");

    if let Some(reporter) = reporter {
        reporter.abort();
    }
    if let Some(http) = http {
        http.stop().await;
    }
    if let Some(udp) = udp {
        udp.stop().await;
    }

    info!(stats = ?stats.snapshot(), "eos-server stopped");
    Ok(())
}
