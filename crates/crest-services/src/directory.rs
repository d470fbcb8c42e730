//! Peer directory: the gateway's window onto known peers.
//!
//! The gateway never owns peers. It resolves host keys through this trait
//! on every use and issues connect hints; the transport layer behind it
//! owns discovery, handshakes, and state transitions.

use std::sync::Arc;

use dashmap::DashMap;

use crest_core::peer::{Peer, PeerState};

/// Read-plus-hint interface the selector and gateway talk to.
pub trait PeerDirectory: Send + Sync {
    /// Look up a peer by host key. Returns a copy of its current state.
    fn resolve(&self, host: &str) -> Option<Peer>;

    /// All peers matching the predicate, in no particular order.
    fn peers_where(&self, predicate: &dyn Fn(&Peer) -> bool) -> Vec<Peer>;

    /// Fire-and-forget hint to (re)connect a peer. No result is awaited;
    /// the effect, if any, shows up in later `resolve` calls.
    fn request_connect(&self, host: &str);
}

/// In-memory peer table keyed by host, shared across tasks.
#[derive(Clone, Default)]
pub struct PeerTable {
    peers: Arc<DashMap<String, Peer>>,
}

impl PeerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a peer. The host key is taken from the peer.
    pub fn insert(&self, peer: Peer) {
        self.peers.insert(peer.host.clone(), peer);
    }

    pub fn remove(&self, host: &str) {
        self.peers.remove(host);
    }

    pub fn set_state(&self, host: &str, state: PeerState) {
        if let Some(mut entry) = self.peers.get_mut(host) {
            entry.state = state;
        }
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Snapshot of every known peer, for operator inspection.
    pub fn all(&self) -> Vec<Peer> {
        self.peers.iter().map(|e| e.value().clone()).collect()
    }
}

impl PeerDirectory for PeerTable {
    fn resolve(&self, host: &str) -> Option<Peer> {
        self.peers.get(host).map(|e| e.value().clone())
    }

    fn peers_where(&self, predicate: &dyn Fn(&Peer) -> bool) -> Vec<Peer> {
        self.peers
            .iter()
            .filter(|e| predicate(e.value()))
            .map(|e| e.value().clone())
            .collect()
    }

    fn request_connect(&self, host: &str) {
        // The dial itself belongs to the transport layer. The table only
        // records that a reconnect was asked for.
        if let Some(mut entry) = self.peers.get_mut(host) {
            if entry.state == PeerState::Disconnected {
                entry.state = PeerState::Connecting;
                tracing::debug!(host, "connect requested for proxy peer");
            }
        }
    }
}
