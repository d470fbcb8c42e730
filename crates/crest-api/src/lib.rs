//! HTTP surface of the node: the forwarding gateway and the admin API.

pub mod access;
pub mod admin;
pub mod gateway;
pub mod proxy;
pub mod registry;
pub mod responses;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::routing::any;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use crest_core::config::CrestConfig;
use crest_core::node::NodeState;
use crest_services::{PeerSelector, PeerTable};

use access::AccessList;
use registry::HandlerRegistry;

/// Path the API is served under, locally and on every remote peer.
pub const API_PATH: &str = "/api";

#[derive(Clone)]
pub struct ApiState {
    pub config: Arc<CrestConfig>,
    pub node: Arc<NodeState>,
    pub table: PeerTable,
    pub selector: Arc<PeerSelector>,
    pub registry: Arc<HandlerRegistry>,
    pub access: Arc<AccessList>,
    pub client: reqwest::Client,
}

impl ApiState {
    pub fn new(
        config: Arc<CrestConfig>,
        node: Arc<NodeState>,
        table: PeerTable,
        selector: Arc<PeerSelector>,
    ) -> anyhow::Result<Self> {
        let access = Arc::new(AccessList::new(&config.api.allowed_hosts));
        // Redirects from a peer go back to the caller verbatim, the proxy
        // never chases them.
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("failed to build forwarding HTTP client")?;
        Ok(Self {
            config,
            node,
            table,
            selector,
            registry: Arc::new(HandlerRegistry::standard()),
            access,
            client,
        })
    }
}

pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(API_PATH, any(gateway::handle))
        .nest("/admin", admin::routes())
        .layer(cors)
        .with_state(state)
}

pub async fn serve(state: ApiState) -> anyhow::Result<()> {
    let bind = format!("{}:{}", state.config.api.bind, state.config.api.port);
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind API server on {bind}"))?;
    tracing::info!(%bind, "API listening");
    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
