//! Node config loader (strict parsing + environment overrides).

pub mod schema;

use std::fs;
use std::path::Path;

use chatrelay_core::error::{Result, RelayError};

pub use schema::{AuthSection, LogSection, NodeConfig, NodeSection, RelaySection};

/// Config file consulted when `CHATRELAY_CONFIG` is unset.
pub const DEFAULT_CONFIG_FILE: &str = "chatrelay.yaml";

pub fn load_from_file(path: &str) -> Result<NodeConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| RelayError::Internal(format!("read config failed: {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<NodeConfig> {
    let cfg: NodeConfig = serde_yaml::from_str(s)
        .map_err(|e| RelayError::BadRequest(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Resolve the node config the way the binary does: optional YAML file,
/// then `PORT` / `PEERS` / `MAX_MESSAGES` / `SNAPSHOT_PATH` from the
/// environment, then validation.
pub fn load_from_env() -> Result<NodeConfig> {
    let explicit = std::env::var("CHATRELAY_CONFIG").ok();
    let mut cfg = match explicit.as_deref() {
        Some(path) => load_from_file(path)?,
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => load_from_file(DEFAULT_CONFIG_FILE)?,
        None => NodeConfig::default(),
    };
    apply_env(&mut cfg, |k| std::env::var(k).ok())?;
    cfg.validate()?;
    Ok(cfg)
}

/// Overlay environment values onto `cfg`. `lookup` abstracts the process
/// environment so tests can feed their own values.
pub fn apply_env<F>(cfg: &mut NodeConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(port) = lookup("PORT") {
        cfg.node.port = port
            .trim()
            .parse()
            .map_err(|e| RelayError::BadRequest(format!("PORT must be a port number: {e}")))?;
    }
    if let Some(peers) = lookup("PEERS") {
        cfg.relay.peers = peers
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();
    }
    if let Some(max) = lookup("MAX_MESSAGES") {
        cfg.log.max_len = max
            .trim()
            .parse()
            .map_err(|e| RelayError::BadRequest(format!("MAX_MESSAGES must be a number: {e}")))?;
        cfg.log.seed_len = cfg.log.seed_len.min(cfg.log.max_len);
    }
    if let Some(path) = lookup("SNAPSHOT_PATH") {
        cfg.log.snapshot_path = Some(path);
    }
    Ok(())
}
