//! Request-type registry: classification flags, tags, and the local
//! handlers behind them.
//!
//! The registry is read-only after construction. Forwarding decisions
//! only need the flags and tags; the handler functions answer whatever
//! the gateway decides to serve locally.

use std::collections::{HashMap, HashSet};

use serde_json::{json, Value};

use crest_core::node::epoch_secs;
use crest_core::peer::PROTOCOL_VERSION;

use crate::responses;
use crate::ApiState;

/// Coarse category labels on request types, used for forwarding and
/// visibility decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiTag {
    Accounts,
    Blocks,
    Transactions,
    Info,
    Network,
    Utils,
    Debug,
    Forging,
}

/// Request types answered locally even while proxying: callers asking
/// about this node's status must hear about this node, not a peer.
pub const NEVER_FORWARDED_REQUESTS: [&str; 2] = ["getBlockchainStatus", "getState"];

/// Tags never forwarded: answers would describe a third party's
/// internals, or leak this node's view of the network topology.
pub const NEVER_FORWARDED_TAGS: [ApiTag; 3] = [ApiTag::Utils, ApiTag::Debug, ApiTag::Network];

pub type LocalHandler = fn(&ApiState, &QueryParams) -> Value;

/// First-value view of the request's query parameters.
#[derive(Debug, Default)]
pub struct QueryParams(pub HashMap<String, String>);

impl QueryParams {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }
}

pub struct ApiHandler {
    /// Needs chain state to produce an answer.
    pub requires_blockchain: bool,
    /// Only a full client can answer this, never a remote peer.
    pub requires_full_client: bool,
    pub tags: &'static [ApiTag],
    pub run: LocalHandler,
}

impl ApiHandler {
    /// May this request type ever leave the node? Activation state is the
    /// caller's concern; this is the per-type part of the decision.
    pub fn forwardable(&self, name: &str) -> bool {
        self.requires_blockchain
            && !self.requires_full_client
            && !NEVER_FORWARDED_REQUESTS.contains(&name)
            && !self.tags.iter().any(|t| NEVER_FORWARDED_TAGS.contains(t))
    }
}

pub enum Lookup<'a> {
    Found(&'a ApiHandler),
    Disabled,
    Unknown,
}

pub struct HandlerRegistry {
    handlers: HashMap<&'static str, ApiHandler>,
    disabled: HashSet<&'static str>,
}

impl HandlerRegistry {
    /// The standard request-type table.
    pub fn standard() -> Self {
        let mut handlers = HashMap::new();
        let mut register = |name: &'static str,
                            requires_blockchain: bool,
                            requires_full_client: bool,
                            tags: &'static [ApiTag],
                            run: LocalHandler| {
            handlers.insert(
                name,
                ApiHandler {
                    requires_blockchain,
                    requires_full_client,
                    tags,
                    run,
                },
            );
        };

        register("getBlockchainStatus", true, false, &[ApiTag::Info], blockchain_status);
        register("getState", true, false, &[ApiTag::Info], state);
        register("getBlock", true, false, &[ApiTag::Blocks], ledger_backed);
        register("getTransaction", true, false, &[ApiTag::Transactions], ledger_backed);
        register("broadcastTransaction", true, false, &[ApiTag::Transactions], ledger_backed);
        register("getBalance", true, false, &[ApiTag::Accounts], ledger_backed);
        register("getAccount", true, false, &[ApiTag::Accounts], ledger_backed);
        register("getPeers", false, false, &[ApiTag::Network], peers);
        register("getTime", false, false, &[ApiTag::Utils], time);
        register("getConstants", false, false, &[ApiTag::Utils], constants);
        register("dumpState", true, true, &[ApiTag::Debug], dump_state);
        register("getForging", true, true, &[ApiTag::Forging], forging);

        let mut disabled = HashSet::new();
        disabled.insert("fullReset");

        Self { handlers, disabled }
    }

    pub fn lookup(&self, request_type: &str) -> Lookup<'_> {
        match self.handlers.get(request_type) {
            Some(handler) => Lookup::Found(handler),
            None if self.disabled.contains(request_type) => Lookup::Disabled,
            None => Lookup::Unknown,
        }
    }

    pub fn request_types(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.handlers.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

// ── Local handlers ────────────────────────────────────────────────────────────
//
// Ledger-backed request types are answered by the chain engine, which
// lives outside this crate. Until one is wired in, a node that could not
// forward such a request reports the chain as locally unavailable.

fn ledger_backed(_state: &ApiState, _params: &QueryParams) -> Value {
    responses::blockchain_unavailable()
}

fn blockchain_status(state: &ApiState, _params: &QueryParams) -> Value {
    json!({
        "application": "Crest",
        "version": PROTOCOL_VERSION.to_string(),
        "height": state.node.height(),
        "isLightClient": state.node.is_light_client(),
        "isDownloading": state.node.is_downloading(),
        "blockchainState": if state.node.is_downloading() { "DOWNLOADING" } else { "UP_TO_DATE" },
    })
}

fn state(state: &ApiState, params: &QueryParams) -> Value {
    let mut value = blockchain_status(state, params);
    value["numberOfPeers"] = json!(state.table.len());
    value["proxyActive"] = json!(state.node.proxy_active());
    value
}

fn peers(state: &ApiState, _params: &QueryParams) -> Value {
    let peers: Vec<String> = state.table.all().into_iter().map(|p| p.host).collect();
    json!({ "peers": peers })
}

fn time(_state: &ApiState, _params: &QueryParams) -> Value {
    json!({ "time": epoch_secs() })
}

fn constants(state: &ApiState, _params: &QueryParams) -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION.to_string(),
        "apiPath": crate::API_PATH,
        "requestTypes": state.registry.request_types(),
    })
}

fn dump_state(state: &ApiState, _params: &QueryParams) -> Value {
    json!({
        "isLightClient": state.node.is_light_client(),
        "isDownloading": state.node.is_downloading(),
        "proxyAvailable": state.node.proxy_available(),
        "proxyActive": state.node.proxy_active(),
        "knownPeers": state.table.len(),
        "servingSet": state
            .selector
            .serving_set()
            .map(|hosts| hosts.as_ref().clone())
            .unwrap_or_default(),
        "blacklistedPeers": state.selector.blacklist_entries().len(),
    })
}

fn forging(_state: &ApiState, _params: &QueryParams) -> Value {
    json!({ "generators": [] })
}
