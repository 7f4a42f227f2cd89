//! Shared application state for a chatrelay node.
//!
//! Wires the message store, realtime core, peer relay, identity resolver and
//! metrics together. Startup errors are explicit (Result instead of panic).

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use chatrelay_core::error::Result;

use crate::config::NodeConfig;
use crate::identity::{IdentityResolver, TicketTable};
use crate::obs::NodeMetrics;
use crate::realtime::RealtimeCore;
use crate::relay::PeerRelay;
use crate::store::{FileSnapshot, MessageStore, NoSnapshot};

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
    realtime: Arc<RealtimeCore>,
    relay: Arc<PeerRelay>,
    identity: Arc<dyn IdentityResolver>,
}

struct AppStateInner {
    cfg: NodeConfig,
    metrics: Arc<NodeMetrics>,
    /// Flips to `true` once; live sessions close when it does.
    shutdown: watch::Sender<bool>,
}

impl AppState {
    /// Build a node whose log is loaded from and persisted to
    /// `cfg.snapshot_path()`. Must run inside a tokio runtime.
    pub fn new(cfg: NodeConfig) -> Result<Self> {
        let path = cfg.snapshot_path();
        let sink = FileSnapshot::spawn(&path);
        let store = MessageStore::load(Path::new(&path), cfg.log.max_len, sink);
        Self::with_store(cfg, store)
    }

    /// Build a node that keeps its log in memory only.
    pub fn in_memory(cfg: NodeConfig) -> Result<Self> {
        let store = MessageStore::new(cfg.log.max_len, Arc::new(NoSnapshot));
        Self::with_store(cfg, store)
    }

    pub fn with_store(cfg: NodeConfig, store: MessageStore) -> Result<Self> {
        let metrics = Arc::new(NodeMetrics::new());

        let peers = cfg.effective_peers();
        let relay = PeerRelay::new(
            peers,
            Duration::from_millis(cfg.relay.timeout_ms),
            Arc::clone(&metrics),
        )?;

        let realtime = RealtimeCore::new(
            store,
            cfg.log.seed_len,
            cfg.node.port.to_string(),
            Arc::clone(&metrics),
        );

        let identity: Arc<dyn IdentityResolver> =
            Arc::new(TicketTable::new(cfg.auth.tickets.clone()));

        tracing::info!(
            port = cfg.node.port,
            peers = ?relay.peers(),
            max_len = cfg.log.max_len,
            "node state ready"
        );

        Ok(Self {
            inner: Arc::new(AppStateInner {
                cfg,
                metrics,
                shutdown: watch::channel(false).0,
            }),
            realtime: Arc::new(realtime),
            relay: Arc::new(relay),
            identity,
        })
    }

    /// Swap the identity resolver (e.g. for an external auth service).
    pub fn with_identity(mut self, identity: Arc<dyn IdentityResolver>) -> Self {
        self.identity = identity;
        self
    }

    pub fn cfg(&self) -> &NodeConfig {
        &self.inner.cfg
    }

    pub fn metrics(&self) -> &NodeMetrics {
        &self.inner.metrics
    }

    pub fn realtime(&self) -> Arc<RealtimeCore> {
        Arc::clone(&self.realtime)
    }

    pub fn relay(&self) -> Arc<PeerRelay> {
        Arc::clone(&self.relay)
    }

    pub fn identity(&self) -> Arc<dyn IdentityResolver> {
        Arc::clone(&self.identity)
    }

    /// Ask every live WebSocket session to close.
    pub fn begin_shutdown(&self) {
        if !self.inner.shutdown.send_replace(true) {
            tracing::info!(port = self.inner.cfg.node.port, "closing client sessions");
        }
    }

    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.inner.shutdown.subscribe()
    }
}
