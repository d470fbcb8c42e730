//! Crest gateway integration harness.
//!
//! Tests run a real gateway and stub upstream peers over loopback HTTP,
//! all in-process. Each test builds its own node and upstreams; nothing
//! is shared between tests.

mod admin;
mod forwarding;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::{Json, Router};
use serde_json::json;

use crest_api::ApiState;
use crest_core::config::CrestConfig;
use crest_core::node::NodeState;
use crest_core::peer::{ChainState, Peer, PeerState, Version};
use crest_services::{PeerSelector, PeerTable};

// ── Gateway under test ────────────────────────────────────────────────────────

pub struct Gateway {
    pub url: String,
    pub state: ApiState,
}

impl Gateway {
    pub fn api(&self, query: &str) -> String {
        format!("{}/api?{}", self.url, query)
    }

    pub fn admin(&self, path: &str) -> String {
        format!("{}/admin{}", self.url, path)
    }
}

pub fn light_client_config() -> CrestConfig {
    let mut config = CrestConfig::default();
    config.node.light_client = true;
    config
}

/// Start a gateway on an ephemeral loopback port with the given peers
/// already in its table.
pub async fn start_gateway(config: CrestConfig, peers: Vec<Peer>) -> Result<Gateway> {
    let config = Arc::new(config);
    let node = Arc::new(NodeState::from_config(&config));
    let table = PeerTable::new();
    for peer in peers {
        table.insert(peer);
    }
    let selector = Arc::new(PeerSelector::new(Arc::new(table.clone()), &config.proxy));
    let state = ApiState::new(config, node, table, selector)?;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let app = crest_api::router(state.clone());
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    Ok(Gateway {
        url: format!("http://{}", addr),
        state,
    })
}

// ── Stub upstream peers ───────────────────────────────────────────────────────

#[derive(Clone)]
struct UpstreamState {
    id: &'static str,
    hits: Arc<AtomicUsize>,
    completed_bodies: Arc<AtomicUsize>,
}

/// A fake remote peer's API server. Counts connections and fully-read
/// request bodies, echoes the query back, and tags responses with its id.
pub struct Upstream {
    pub addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    completed_bodies: Arc<AtomicUsize>,
}

impl Upstream {
    pub async fn start(id: &'static str) -> Result<Self> {
        let hits = Arc::new(AtomicUsize::new(0));
        let completed_bodies = Arc::new(AtomicUsize::new(0));
        let state = UpstreamState {
            id,
            hits: hits.clone(),
            completed_bodies: completed_bodies.clone(),
        };

        let app = Router::new()
            .route("/api", any(upstream_handler))
            .with_state(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Ok(Self {
            addr,
            hits,
            completed_bodies,
        })
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn completed_bodies(&self) -> usize {
        self.completed_bodies.load(Ordering::SeqCst)
    }

    /// A connected, up-to-date peer entry pointing at this upstream.
    /// `host` must resolve to loopback ("127.0.0.1" or "localhost").
    pub fn peer(&self, host: &str) -> Peer {
        let mut peer = Peer::new(host);
        peer.api_port = self.addr.port();
        peer.state = PeerState::Connected;
        peer.chain_state = ChainState::UpToDate;
        peer.version = Version::new(1, 4, 0);
        peer
    }
}

async fn upstream_handler(State(state): State<UpstreamState>, req: Request) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);
    let query = req.uri().query().unwrap_or("").to_string();

    if query.contains("slow=1") {
        tokio::time::sleep(Duration::from_secs(3)).await;
    }

    match axum::body::to_bytes(req.into_body(), usize::MAX).await {
        Ok(_) => {
            state.completed_bodies.fetch_add(1, Ordering::SeqCst);
            (
                [("x-served-by", state.id)],
                Json(json!({ "upstream": state.id, "query": query })),
            )
                .into_response()
        }
        Err(_) => StatusCode::BAD_REQUEST.into_response(),
    }
}

/// A peer entry pointing at a port nothing listens on.
pub fn dead_peer(host: &str) -> Peer {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let mut peer = Peer::new(host);
    peer.api_port = port;
    peer.state = PeerState::Connected;
    peer.chain_state = ChainState::UpToDate;
    peer.version = Version::new(1, 4, 0);
    peer
}

// ── Smoke test for the harness itself ─────────────────────────────────────────

#[tokio::test]
async fn upstream_stub_answers_directly() {
    let upstream = Upstream::start("smoke").await.unwrap();
    let url = format!("http://{}/api?requestType=getBlock", upstream.addr);
    let resp = reqwest::get(&url).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["upstream"], "smoke");
    assert_eq!(upstream.hits(), 1);
}
