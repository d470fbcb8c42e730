//! crestd: the Crest node daemon.
//!
//! Wires the peer table, the proxy selector, and the API server together
//! and runs the periodic selector maintenance.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use crest_api::ApiState;
use crest_core::config::CrestConfig;
use crest_core::node::NodeState;
use crest_core::peer::Peer;
use crest_services::{maintenance_loop, PeerSelector, PeerTable};

/// Blacklist purge + serving-set reconnect cadence.
const MAINTENANCE_PERIOD: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = CrestConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = CrestConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        CrestConfig::default()
    });
    let config = Arc::new(config);

    let node = Arc::new(NodeState::from_config(&config));
    tracing::info!(
        light_client = node.is_light_client(),
        proxy_available = node.proxy_available(),
        "crestd starting"
    );
    if !config.proxy.forced_server_url.is_empty() {
        tracing::info!(url = %config.proxy.forced_server_url, "forced remote API server configured");
    }

    // Peer table, bootstrapped from configured seeds until the gossip
    // layer takes over.
    let table = PeerTable::new();
    for seed in &config.peers.seeds {
        table.insert(Peer::from(seed.clone()));
    }
    tracing::info!(peers = table.len(), "peer table seeded");

    let selector = Arc::new(PeerSelector::new(Arc::new(table.clone()), &config.proxy));

    let maintenance_task = tokio::spawn(maintenance_loop(
        selector.clone(),
        MAINTENANCE_PERIOD,
    ));

    let state = ApiState::new(config.clone(), node.clone(), table.clone(), selector.clone())?;
    let api_task = tokio::spawn(crest_api::serve(state));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => tracing::info!("shutdown signal received"),
        r = maintenance_task        => tracing::error!("maintenance task exited: {:?}", r),
        r = api_task                => tracing::error!("API server exited: {:?}", r),
    }

    Ok(())
}
