//! Operator endpoints: proxy introspection and the forced-peer override.
//!
//! These are node administration, not part of the public request surface;
//! the daemon serves them on the loopback bind only.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use axum::routing::get;
use axum::Router;
use serde::{Deserialize, Serialize};

use crest_core::node::epoch_secs;
use crest_core::peer::Peer;
use crest_services::directory::PeerDirectory;

use crate::ApiState;

pub fn routes() -> Router<ApiState> {
    Router::new()
        .route("/proxy", get(handle_proxy_status))
        .route(
            "/proxy/forced-peer",
            axum::routing::post(handle_forced_peer_set).delete(handle_forced_peer_clear),
        )
        .route("/peers", get(handle_peers))
        .route("/node/downloading", axum::routing::post(handle_set_downloading))
}

// ── /proxy (GET) ──────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ProxyStatusResponse {
    pub available: bool,
    pub active: bool,
    pub light_client: bool,
    pub forced_server_url: Option<String>,
    pub forced_peer: Option<String>,
    pub main_peer_announced_address: Option<String>,
    pub serving_set: Vec<String>,
    pub blacklist: Vec<BlacklistEntry>,
}

#[derive(Serialize)]
pub struct BlacklistEntry {
    pub host: String,
    pub expires_in_secs: u64,
}

pub async fn handle_proxy_status(State(state): State<ApiState>) -> Json<ProxyStatusResponse> {
    let now = epoch_secs();
    let blacklist = state
        .selector
        .blacklist_entries()
        .into_iter()
        .map(|(host, expiry)| BlacklistEntry {
            host,
            expires_in_secs: expiry.saturating_sub(now),
        })
        .collect();

    let forced_server_url = Some(state.config.proxy.forced_server_url.clone())
        .filter(|url| !url.is_empty());

    Json(ProxyStatusResponse {
        available: state.node.proxy_available(),
        active: state.node.proxy_active(),
        light_client: state.node.is_light_client(),
        forced_server_url,
        forced_peer: state.selector.forced_peer().map(|f| f.host.clone()),
        main_peer_announced_address: state
            .selector
            .main_peer_announced_address()
            .map(|a| a.as_ref().clone()),
        serving_set: state
            .selector
            .serving_set()
            .map(|hosts| hosts.as_ref().clone())
            .unwrap_or_default(),
        blacklist,
    })
}

// ── /proxy/forced-peer (POST, DELETE) ─────────────────────────────────────────

#[derive(Deserialize)]
pub struct ForcedPeerRequest {
    pub host: String,
}

#[derive(Serialize)]
pub struct ForcedPeerResponse {
    pub host: Option<String>,
}

pub async fn handle_forced_peer_set(
    State(state): State<ApiState>,
    Json(req): Json<ForcedPeerRequest>,
) -> Result<Json<ForcedPeerResponse>, (StatusCode, String)> {
    let peer = state
        .table
        .resolve(&req.host)
        .ok_or((StatusCode::NOT_FOUND, format!("unknown peer host: {}", req.host)))?;

    state.selector.set_forced_peer(Some(&peer));
    tracing::info!(host = %peer.host, "forced proxy peer set");

    Ok(Json(ForcedPeerResponse {
        host: Some(peer.host),
    }))
}

pub async fn handle_forced_peer_clear(
    State(state): State<ApiState>,
) -> Json<ForcedPeerResponse> {
    state.selector.set_forced_peer(None);
    tracing::info!("forced proxy peer cleared");
    Json(ForcedPeerResponse { host: None })
}

// ── /peers (GET) ──────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct PeersResponse {
    pub peers: Vec<PeerInfo>,
}

#[derive(Serialize)]
pub struct PeerInfo {
    pub host: String,
    pub announced_address: String,
    pub api_port: u16,
    pub api_ssl_port: u16,
    pub state: String,
    pub chain_state: String,
    pub version: String,
    pub disabled_apis: Vec<String>,
    pub connectable: bool,
    pub blacklisted: bool,
}

pub async fn handle_peers(State(state): State<ApiState>) -> Json<PeersResponse> {
    let now = epoch_secs();
    let peers = state
        .table
        .all()
        .into_iter()
        .map(|peer| peer_info(&state, peer, now))
        .collect();
    Json(PeersResponse { peers })
}

fn peer_info(state: &ApiState, peer: Peer, now: u64) -> PeerInfo {
    let connectable = state.selector.connectable(&peer);
    let blacklisted = state.selector.is_blacklisted(&peer.host, now);
    let mut disabled_apis: Vec<String> = peer.disabled_apis.into_iter().collect();
    disabled_apis.sort_unstable();
    PeerInfo {
        host: peer.host,
        announced_address: peer.announced_address,
        api_port: peer.api_port,
        api_ssl_port: peer.api_ssl_port,
        state: format!("{:?}", peer.state),
        chain_state: format!("{:?}", peer.chain_state),
        version: peer.version.to_string(),
        disabled_apis,
        connectable,
        blacklisted,
    }
}

// ── /node/downloading (POST) ──────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct DownloadingRequest {
    pub downloading: bool,
}

#[derive(Serialize)]
pub struct DownloadingResponse {
    pub downloading: bool,
    pub proxy_active: bool,
}

/// The chain engine owns this flag in a full deployment; the endpoint
/// lets operators and tests drive it while no engine is attached.
pub async fn handle_set_downloading(
    State(state): State<ApiState>,
    Json(req): Json<DownloadingRequest>,
) -> Json<DownloadingResponse> {
    state.node.set_downloading(req.downloading);
    Json(DownloadingResponse {
        downloading: state.node.is_downloading(),
        proxy_active: state.node.proxy_active(),
    })
}
