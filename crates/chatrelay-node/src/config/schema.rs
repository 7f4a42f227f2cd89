use std::collections::HashMap;

use serde::Deserialize;
use chatrelay_core::error::{Result, RelayError};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeConfig {
    pub version: u32,

    #[serde(default)]
    pub node: NodeSection,

    #[serde(default)]
    pub log: LogSection,

    #[serde(default)]
    pub relay: RelaySection,

    #[serde(default)]
    pub auth: AuthSection,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            version: 1,
            node: NodeSection::default(),
            log: LogSection::default(),
            relay: RelaySection::default(),
            auth: AuthSection::default(),
        }
    }
}

impl NodeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(RelayError::UnsupportedVersion);
        }

        self.node.validate()?;
        self.log.validate()?;
        self.relay.validate()?;

        Ok(())
    }

    /// Address other nodes use to reach this one.
    pub fn public_url(&self) -> String {
        match &self.node.public_url {
            Some(u) => normalize_url(u),
            None => format!("http://localhost:{}", self.node.port),
        }
    }

    /// Where the message log snapshot lives.
    pub fn snapshot_path(&self) -> String {
        self.log
            .snapshot_path
            .clone()
            .unwrap_or_else(|| format!("messages-{}.json", self.node.port))
    }

    /// Configured peers minus this node itself (compared by address, since
    /// the shared peer list usually names every node).
    pub fn effective_peers(&self) -> Vec<String> {
        let port = self.node.port;
        let own = [
            self.public_url(),
            format!("http://localhost:{port}"),
            format!("http://127.0.0.1:{port}"),
        ];

        let mut peers: Vec<String> = Vec::new();
        for raw in &self.relay.peers {
            let peer = normalize_url(raw);
            if own.contains(&peer) {
                tracing::info!(peer = %peer, "excluding self from peer list");
                continue;
            }
            if !peers.contains(&peer) {
                peers.push(peer);
            }
        }
        peers
    }
}

pub fn normalize_url(u: &str) -> String {
    u.trim().trim_end_matches('/').to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeSection {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub public_url: Option<String>,

    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,

    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,

    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: None,
            ping_interval_ms: default_ping_interval_ms(),
            idle_timeout_ms: default_idle_timeout_ms(),
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

impl NodeSection {
    pub fn validate(&self) -> Result<()> {
        if !(5000..=120000).contains(&self.ping_interval_ms) {
            return Err(RelayError::BadRequest(
                "node.ping_interval_ms must be between 5000 and 120000".into(),
            ));
        }
        if !(10000..=600000).contains(&self.idle_timeout_ms) {
            return Err(RelayError::BadRequest(
                "node.idle_timeout_ms must be between 10000 and 600000".into(),
            ));
        }
        if self.idle_timeout_ms <= self.ping_interval_ms {
            return Err(RelayError::BadRequest(
                "node.idle_timeout_ms must be greater than ping_interval_ms".into(),
            ));
        }
        if self.max_frame_bytes == 0 {
            return Err(RelayError::BadRequest("node.max_frame_bytes must be positive".into()));
        }
        Ok(())
    }
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    3010
}
fn default_ping_interval_ms() -> u64 {
    20000
}
fn default_idle_timeout_ms() -> u64 {
    60000
}
fn default_max_frame_bytes() -> usize {
    64 * 1024
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogSection {
    #[serde(default = "default_max_len")]
    pub max_len: usize,

    #[serde(default = "default_seed_len")]
    pub seed_len: usize,

    #[serde(default)]
    pub snapshot_path: Option<String>,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            max_len: default_max_len(),
            seed_len: default_seed_len(),
            snapshot_path: None,
        }
    }
}

impl LogSection {
    pub fn validate(&self) -> Result<()> {
        if self.max_len == 0 {
            return Err(RelayError::BadRequest("log.max_len must be positive".into()));
        }
        if self.seed_len == 0 || self.seed_len > self.max_len {
            return Err(RelayError::BadRequest(
                "log.seed_len must be between 1 and log.max_len".into(),
            ));
        }
        Ok(())
    }
}

fn default_max_len() -> usize {
    1000
}
fn default_seed_len() -> usize {
    200
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelaySection {
    #[serde(default)]
    pub peers: Vec<String>,

    #[serde(default = "default_relay_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for RelaySection {
    fn default() -> Self {
        Self {
            peers: Vec::new(),
            timeout_ms: default_relay_timeout_ms(),
        }
    }
}

impl RelaySection {
    pub fn validate(&self) -> Result<()> {
        if !(100..=30000).contains(&self.timeout_ms) {
            return Err(RelayError::BadRequest(
                "relay.timeout_ms must be between 100 and 30000".into(),
            ));
        }
        for p in &self.peers {
            if !(p.starts_with("http://") || p.starts_with("https://")) {
                return Err(RelayError::BadRequest(format!(
                    "relay.peers entry must be an http(s) url: {p}"
                )));
            }
        }
        Ok(())
    }
}

fn default_relay_timeout_ms() -> u64 {
    3000
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthSection {
    /// ticket -> user id. Empty means every connection is accepted.
    #[serde(default)]
    pub tickets: HashMap<String, String>,
}
