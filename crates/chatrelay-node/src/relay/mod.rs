//! Peer relay: best-effort envelope propagation between nodes.
//!
//! Outbound, every newly stored local envelope is POSTed once to each peer
//! on its own detached task with a bounded timeout. Failures are logged and
//! counted, never retried, and never reach the local broadcast path.
//!
//! Inbound, relayed envelopes are deduplicated by id against the local
//! store. A duplicate is acknowledged like a new one; only the broadcast is
//! skipped.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use chatrelay_core::error::{Result, RelayError};
use chatrelay_core::Envelope;

use crate::obs::NodeMetrics;
use crate::realtime::RealtimeCore;

/// Path peers accept relayed envelopes on.
pub const RELAY_PATH: &str = "/internal/relay";

pub struct PeerRelay {
    peers: Arc<[String]>,
    client: reqwest::Client,
    metrics: Arc<NodeMetrics>,
}

impl PeerRelay {
    /// `peers` must already exclude this node.
    pub fn new(peers: Vec<String>, timeout: Duration, metrics: Arc<NodeMetrics>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RelayError::Internal(format!("relay http client init failed: {e}")))?;
        Ok(Self {
            peers: peers.into(),
            client,
            metrics,
        })
    }

    pub fn peers(&self) -> &[String] {
        &self.peers
    }

    /// Fire-and-forget: one attempt per peer, each on its own task.
    pub fn forward(&self, env: &Envelope) {
        if self.peers.is_empty() {
            return;
        }
        let env = Arc::new(env.clone());

        for peer in self.peers.iter() {
            let url = format!("{peer}{RELAY_PATH}");
            let peer = peer.clone();
            let env = Arc::clone(&env);
            let client = self.client.clone();
            let metrics = Arc::clone(&self.metrics);

            tokio::spawn(async move {
                match client.post(&url).json(&*env).send().await {
                    Ok(resp) if resp.status().is_success() => {
                        metrics.relay_forward.inc(&[("outcome", "ok")]);
                        tracing::debug!(peer = %peer, id = %env.id, "relayed to peer");
                    }
                    Ok(resp) => {
                        metrics.relay_forward.inc(&[("outcome", "status")]);
                        tracing::warn!(peer = %peer, id = %env.id, status = %resp.status(), "peer refused relay");
                    }
                    Err(e) => {
                        metrics.relay_forward.inc(&[("outcome", "error")]);
                        tracing::warn!(
                            peer = %peer,
                            id = %env.id,
                            timeout = e.is_timeout(),
                            error = %e,
                            "relay to peer failed"
                        );
                    }
                }
            });
        }
    }

    /// Accept an envelope from a peer. `Ok(true)` when newly stored,
    /// `Ok(false)` for a duplicate, `Err` when it carries no id.
    pub fn receive(&self, core: &RealtimeCore, body: Value) -> Result<bool> {
        let env = Envelope::from_relay(body).map_err(|e| {
            self.metrics.messages.inc(&[("origin", "relay"), ("outcome", "rejected")]);
            tracing::warn!(error = %e, "rejected relay payload");
            e
        })?;
        Ok(core.accept_relayed(env))
    }
}
