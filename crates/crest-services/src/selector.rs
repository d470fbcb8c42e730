//! Serving-peer selection for the API proxy.
//!
//! The selector keeps a cached "serving set": a small list of hosts that
//! together cover every request type at least one healthy peer offers.
//! Requests walk the cached set lock-free; a miss triggers a recompute
//! that publishes a fresh set by atomic swap. Failed hosts go onto a
//! time-bounded blacklist and force a recompute when they were part of
//! the published set.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use dashmap::DashMap;
use rand::Rng;

use crest_core::config::ProxyConfig;
use crest_core::node::epoch_secs;
use crest_core::peer::{ChainState, Peer, PeerState, Version, PROTOCOL_VERSION};

use crate::directory::PeerDirectory;

/// Operator-set override: all forwarding goes to this peer, health checks
/// and selection bypassed. Operator intent is absolute.
#[derive(Debug, Clone)]
pub struct ForcedPeer {
    pub host: String,
    pub announced_address: String,
}

pub struct PeerSelector {
    directory: Arc<dyn PeerDirectory>,

    /// Published serving set. Replaced wholesale, never mutated in place.
    serving_set: ArcSwapOption<Vec<String>>,

    /// Announced address of the first peer of the current serving set,
    /// for operator display.
    main_peer_announced: ArcSwapOption<String>,

    forced: ArcSwapOption<ForcedPeer>,

    /// Host -> epoch-seconds expiry. Entries are independent; purge and
    /// insert interleave freely.
    blacklist: DashMap<String, u64>,

    blacklist_period_secs: u64,
    min_peer_version: Version,
}

impl PeerSelector {
    pub fn new(directory: Arc<dyn PeerDirectory>, proxy: &ProxyConfig) -> Self {
        Self {
            directory,
            serving_set: ArcSwapOption::empty(),
            main_peer_announced: ArcSwapOption::empty(),
            forced: ArcSwapOption::empty(),
            blacklist: DashMap::new(),
            blacklist_period_secs: proxy.blacklist_period_secs,
            min_peer_version: proxy.min_peer_version,
        }
    }

    /// Pick a peer able to serve `request_type`, or None if no remote
    /// peer is currently usable.
    ///
    /// Fast path: walk the published serving set in order and return the
    /// first member that is still connectable and does not disable the
    /// request type. On a miss, recompute the set from the current
    /// candidate pool and publish it for subsequent calls.
    pub fn serving_peer(&self, request_type: &str, now: u64) -> Option<Peer> {
        if let Some(forced) = self.forced.load_full() {
            return self.directory.resolve(&forced.host);
        }

        if let Some(hosts) = self.serving_set.load_full() {
            for host in hosts.iter() {
                if let Some(peer) = self.directory.resolve(host) {
                    if self.connectable(&peer) && !peer.disables(request_type) {
                        return Some(peer);
                    }
                }
            }
        }

        self.select_serving_set(request_type, now)
    }

    /// Recompute and publish the serving set; returns the peer serving
    /// `request_type`, if the new set contains one.
    ///
    /// Greedy multi-round set cover: the first peer is drawn uniformly at
    /// random; its disabled request types become the residual still to be
    /// covered. Each further round discards candidates whose disabled set
    /// is a superset of the residual (they add no new coverage), draws one
    /// of the rest at random, and intersects the residual with the pick's
    /// disabled set. Terminates when the residual is empty or candidates
    /// run out, so the set is bounded by the number of distinct request
    /// types. Candidates that merely intersect the residual are kept; the
    /// conservative rule is intentional.
    fn select_serving_set(&self, request_type: &str, now: u64) -> Option<Peer> {
        let mut candidates = self
            .directory
            .peers_where(&|p| self.connectable(p) && !self.is_blacklisted(&p.host, now));
        if candidates.is_empty() {
            return None;
        }

        let mut rng = rand::thread_rng();
        let first = candidates.swap_remove(rng.gen_range(0..candidates.len()));

        let mut hosts = vec![first.host.clone()];
        let mut residual: HashSet<String> = first.disabled_apis.clone();
        self.main_peer_announced
            .store(Some(Arc::new(first.announced_address.clone())));

        let mut result = (!first.disables(request_type)).then_some(first);

        while !residual.is_empty() && !candidates.is_empty() {
            candidates.retain(|p| !residual.is_subset(&p.disabled_apis));
            if candidates.is_empty() {
                break;
            }
            let peer = candidates.swap_remove(rng.gen_range(0..candidates.len()));
            hosts.push(peer.host.clone());
            residual.retain(|api| peer.disabled_apis.contains(api));
            if result.is_none() && !peer.disables(request_type) {
                result = Some(peer);
            }
        }

        tracing::debug!(hosts = ?hosts, "proxy serving set selected");
        self.serving_set.store(Some(Arc::new(hosts)));
        result
    }

    /// The health predicate for forwarding targets. Evaluated against the
    /// peer's current state on every use, never cached.
    pub fn connectable(&self, peer: &Peer) -> bool {
        peer.offers_api()
            && peer.state == PeerState::Connected
            && peer.version >= self.min_peer_version
            && peer.version <= PROTOCOL_VERSION
            && peer.chain_state == ChainState::UpToDate
    }

    pub fn is_blacklisted(&self, host: &str, now: u64) -> bool {
        self.blacklist
            .get(host)
            .map(|entry| *entry.value() > now)
            .unwrap_or(false)
    }

    /// Exclude a host from selection until `now + blacklist period`.
    ///
    /// A blacklisted host that sits in the published serving set would
    /// keep getting walked around, so the whole set is dropped and the
    /// next request recomputes it.
    pub fn blacklist_host(&self, host: &str, now: u64) {
        if let Some(hosts) = self.serving_set.load_full() {
            if hosts.iter().any(|h| h == host) {
                self.serving_set.store(None);
            }
        }
        self.blacklist
            .insert(host.to_string(), now + self.blacklist_period_secs);
        tracing::debug!(host, period_secs = self.blacklist_period_secs, "API peer blacklisted");
    }

    /// Drop expired blacklist entries and ask the directory to keep the
    /// serving-set peers connected. Runs on a fixed interval, decoupled
    /// from request traffic.
    pub fn maintain(&self, now: u64) {
        self.blacklist.retain(|host, expiry| {
            if *expiry <= now {
                tracing::debug!(host = %host, "unblacklisting API peer");
                false
            } else {
                true
            }
        });

        if let Some(hosts) = self.serving_set.load_full() {
            for host in hosts.iter() {
                self.directory.request_connect(host);
            }
        }
    }

    pub fn set_forced_peer(&self, peer: Option<&Peer>) {
        match peer {
            Some(peer) => {
                self.main_peer_announced
                    .store(Some(Arc::new(peer.announced_address.clone())));
                self.forced.store(Some(Arc::new(ForcedPeer {
                    host: peer.host.clone(),
                    announced_address: peer.announced_address.clone(),
                })));
            }
            None => self.forced.store(None),
        }
    }

    pub fn forced_peer(&self) -> Option<Arc<ForcedPeer>> {
        self.forced.load_full()
    }

    pub fn main_peer_announced_address(&self) -> Option<Arc<String>> {
        self.main_peer_announced.load_full()
    }

    /// The currently published serving set, for operator inspection.
    pub fn serving_set(&self) -> Option<Arc<Vec<String>>> {
        self.serving_set.load_full()
    }

    /// Active blacklist entries as (host, expiry) pairs.
    pub fn blacklist_entries(&self) -> Vec<(String, u64)> {
        self.blacklist
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect()
    }
}

/// Periodic selector maintenance, spawned by the daemon.
pub async fn maintenance_loop(selector: Arc<PeerSelector>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        selector.maintain(epoch_secs());
    }
}
