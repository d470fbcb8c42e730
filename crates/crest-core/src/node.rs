//! Node-wide runtime state and the proxy-activation predicate.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::CrestConfig;

/// Seconds since the Unix epoch. The node's clock for blacklist expiry.
pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Runtime state shared across the API layer.
///
/// The flags that feed the proxy-activation predicate live here as
/// atomics; the chain engine flips `downloading` as it catches up.
pub struct NodeState {
    light_client: bool,
    proxy_enabled: bool,
    open_api_port: u16,
    open_api_ssl_port: u16,
    downloading: AtomicBool,
    height: AtomicU64,
}

impl NodeState {
    pub fn from_config(config: &CrestConfig) -> Self {
        Self {
            light_client: config.node.light_client,
            proxy_enabled: config.proxy.enabled,
            open_api_port: config.api.open_port,
            open_api_ssl_port: config.api.open_ssl_port,
            downloading: AtomicBool::new(false),
            height: AtomicU64::new(0),
        }
    }

    pub fn is_light_client(&self) -> bool {
        self.light_client
    }

    /// Can this node ever forward requests?
    ///
    /// Light clients always can. A full node can only when forwarding is
    /// configured on and it does not expose a public API of its own.
    pub fn proxy_available(&self) -> bool {
        self.light_client
            || (self.proxy_enabled && self.open_api_port == 0 && self.open_api_ssl_port == 0)
    }

    /// Should requests be forwarded right now?
    ///
    /// A full node proxies only while it is still catching up; once the
    /// local chain is current it answers everything itself.
    pub fn proxy_active(&self) -> bool {
        self.light_client || (self.proxy_available() && self.is_downloading())
    }

    pub fn is_downloading(&self) -> bool {
        self.downloading.load(Ordering::Relaxed)
    }

    pub fn set_downloading(&self, value: bool) {
        self.downloading.store(value, Ordering::Relaxed);
    }

    pub fn height(&self) -> u64 {
        self.height.load(Ordering::Relaxed)
    }

    pub fn set_height(&self, value: u64) {
        self.height.store(value, Ordering::Relaxed);
    }
}
