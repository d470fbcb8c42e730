//! Configuration system for Crest.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $CREST_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/crest/config.toml
//!   3. ~/.config/crest/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::peer::Version;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CrestConfig {
    pub node: NodeConfig,
    pub api: ApiConfig,
    pub proxy: ProxyConfig,
    pub peers: PeersConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Run without local chain state. Every blockchain request must then
    /// be answered by a remote peer.
    pub light_client: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Local bind address for the API server.
    pub bind: String,
    /// Local bind port for the API server.
    pub port: u16,
    /// Publicly open plain-API port announced to the network. 0 = closed.
    pub open_port: u16,
    /// Publicly open TLS-API port announced to the network. 0 = closed.
    pub open_ssl_port: u16,
    /// Hosts allowed to talk to the API. "*" allows everyone.
    pub allowed_hosts: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Forward API requests to remote peers while this node cannot answer
    /// them itself. Light clients proxy regardless of this flag.
    pub enabled: bool,
    /// How long a failed peer stays off the candidate list, in seconds.
    pub blacklist_period_secs: u64,
    /// When non-empty, every forwarded request goes to this URL and peer
    /// selection is bypassed entirely.
    pub forced_server_url: String,
    /// Oldest peer protocol version still accepted as a forwarding target.
    pub min_peer_version: Version,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PeersConfig {
    /// Peers loaded into the peer table at startup.
    pub seeds: Vec<SeedPeer>,
}

/// A statically configured peer. Stands in for gossip-discovered peers on
/// fresh nodes; seeds enter the table already connected and up to date.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedPeer {
    pub host: String,
    /// Defaults to `host` when empty.
    pub announced_address: String,
    pub api_port: u16,
    pub api_ssl_port: u16,
    pub version: Version,
    /// Request types this peer refuses to serve.
    pub disabled_apis: Vec<String>,
    pub api_idle_timeout_ms: u64,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            light_client: false,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 27876,
            open_port: 0,
            open_ssl_port: 0,
            allowed_hosts: vec![
                "127.0.0.1".to_string(),
                "::1".to_string(),
                "localhost".to_string(),
            ],
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            blacklist_period_secs: 1800,
            forced_server_url: String::new(),
            min_peer_version: Version::new(1, 2, 0),
        }
    }
}

impl Default for SeedPeer {
    fn default() -> Self {
        Self {
            host: String::new(),
            announced_address: String::new(),
            api_port: 27876,
            api_ssl_port: 0,
            version: Version::new(1, 4, 0),
            disabled_apis: Vec::new(),
            api_idle_timeout_ms: 30_000,
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("crest")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl CrestConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            CrestConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("CREST_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&CrestConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text)
                .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply CREST_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("CREST_NODE__LIGHT_CLIENT") {
            self.node.light_client = v == "true" || v == "1";
        }
        if let Ok(v) = std::env::var("CREST_API__BIND") {
            self.api.bind = v;
        }
        if let Ok(v) = std::env::var("CREST_API__PORT") {
            if let Ok(p) = v.parse() {
                self.api.port = p;
            }
        }
        if let Ok(v) = std::env::var("CREST_PROXY__ENABLED") {
            self.proxy.enabled = v == "true" || v == "1";
        }
        if let Ok(v) = std::env::var("CREST_PROXY__BLACKLIST_PERIOD_SECS") {
            if let Ok(p) = v.parse() {
                self.proxy.blacklist_period_secs = p;
            }
        }
        if let Ok(v) = std::env::var("CREST_PROXY__FORCED_SERVER_URL") {
            self.proxy.forced_server_url = v;
        }
    }
}

impl SeedPeer {
    /// Announced address, falling back to the host key.
    pub fn announced(&self) -> &str {
        if self.announced_address.is_empty() {
            &self.host
        } else {
            &self.announced_address
        }
    }
}
