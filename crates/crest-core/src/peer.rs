//! Peer model: what the node knows about each remote peer.
//!
//! Peers are owned by the peer table; everything else holds only the host
//! key and re-resolves it on each use, since a peer may disappear or change
//! state between two selections.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Connection state of a peer's API endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// How far behind the network a peer reports itself to be.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainState {
    UpToDate,
    Syncing,
    #[default]
    Unknown,
}

/// Tracked state for a known peer, keyed by host.
#[derive(Debug, Clone)]
pub struct Peer {
    /// Host key. Unique identifier for this peer.
    pub host: String,

    /// Address the peer announces for itself (may differ from `host`
    /// behind NAT). Shown to operators, used verbatim in admin output.
    pub announced_address: String,

    /// Plain-HTTP API port. 0 = not offered.
    pub api_port: u16,

    /// TLS API port. 0 = not offered.
    pub api_ssl_port: u16,

    pub state: PeerState,
    pub chain_state: ChainState,

    /// Protocol version the peer reported at handshake.
    pub version: Version,

    /// Request types this peer refuses to answer.
    pub disabled_apis: HashSet<String>,

    /// Server-side idle timeout the peer advertises for its API, in
    /// milliseconds. A forwarding client should stay under this.
    pub api_idle_timeout_ms: u64,
}

impl Peer {
    pub fn new(host: impl Into<String>) -> Self {
        let host = host.into();
        Self {
            announced_address: host.clone(),
            host,
            api_port: 0,
            api_ssl_port: 0,
            state: PeerState::Disconnected,
            chain_state: ChainState::Unknown,
            version: Version::default(),
            disabled_apis: HashSet::new(),
            api_idle_timeout_ms: 30_000,
        }
    }

    /// Does this peer offer an API endpoint at all, plain or TLS?
    pub fn offers_api(&self) -> bool {
        self.api_port != 0 || self.api_ssl_port != 0
    }

    /// TLS preferred over plain when both are offered.
    pub fn offers_api_ssl(&self) -> bool {
        self.api_ssl_port != 0
    }

    pub fn disables(&self, request_type: &str) -> bool {
        self.disabled_apis.contains(request_type)
    }
}

impl From<crate::config::SeedPeer> for Peer {
    fn from(seed: crate::config::SeedPeer) -> Self {
        Self {
            announced_address: seed.announced().to_string(),
            api_port: seed.api_port,
            api_ssl_port: seed.api_ssl_port,
            state: PeerState::Connected,
            chain_state: ChainState::UpToDate,
            version: seed.version,
            disabled_apis: seed.disabled_apis.into_iter().collect(),
            api_idle_timeout_ms: seed.api_idle_timeout_ms,
            host: seed.host,
        }
    }
}

/// Protocol version, `major.minor.patch`.
///
/// Ordering is lexicographic on the three components, which is what the
/// too-old / too-new checks in peer selection rely on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
}

/// Version this node speaks. Peers reporting anything newer are treated
/// as unknown-future and skipped for proxying.
pub const PROTOCOL_VERSION: Version = Version {
    major: 1,
    minor: 4,
    patch: 0,
};

impl Version {
    pub const fn new(major: u16, minor: u16, patch: u16) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid version string: {0:?}")]
pub struct VersionParseError(pub String);

impl FromStr for Version {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('.');
        let mut next = || {
            parts
                .next()
                .and_then(|p| p.parse::<u16>().ok())
                .ok_or_else(|| VersionParseError(s.to_string()))
        };
        let version = Version {
            major: next()?,
            minor: next()?,
            patch: next()?,
        };
        if parts.next().is_some() {
            return Err(VersionParseError(s.to_string()));
        }
        Ok(version)
    }
}

impl Serialize for Version {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
