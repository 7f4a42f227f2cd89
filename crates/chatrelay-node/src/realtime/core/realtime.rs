use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::extract::ws::Message;
use tokio::sync::mpsc;

use chatrelay_core::error::RelayError;
use chatrelay_core::protocol::event::{ErrorBody, ServerEvent, UserEntry};
use chatrelay_core::{ChatPayload, Envelope};

use crate::obs::NodeMetrics;
use crate::realtime::core::{Connection, ConnectionId, PresenceTracker, SessionRegistry};
use crate::realtime::types::PreparedMsg;
use crate::store::MessageStore;

/// Mutable node state. Every event takes this lock once, mutates, and
/// enqueues its broadcasts before releasing it, so local clients observe
/// envelopes in store acceptance order.
struct NodeState {
    store: MessageStore,
    presence: PresenceTracker,
}

/// RealtimeCore: node-level dispatch (store + presence + egress).
pub struct RealtimeCore {
    sessions: SessionRegistry,
    state: Mutex<NodeState>,
    seed_len: usize,
    node_label: String,
    metrics: Arc<NodeMetrics>,
}

impl RealtimeCore {
    pub fn new(store: MessageStore, seed_len: usize, node_label: impl Into<String>, metrics: Arc<NodeMetrics>) -> Self {
        Self {
            sessions: SessionRegistry::new(),
            state: Mutex::new(NodeState {
                store,
                presence: PresenceTracker::new(),
            }),
            seed_len,
            node_label: node_label.into(),
            metrics,
        }
    }

    fn lock(&self) -> MutexGuard<'_, NodeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new connection: seed it with the recent log, then push the
    /// updated presence snapshot to everyone (the newcomer included).
    pub fn connect(&self, tx: mpsc::Sender<Message>) -> ConnectionId {
        let id = self.sessions.next_id();
        let conn = Connection { tx };

        let mut st = self.lock();
        st.presence.on_connect(id);
        let seed = ServerEvent::MessageLog(st.store.recent(self.seed_len));
        if let Some(msg) = self.prepare(&seed) {
            if !conn.push(msg) {
                self.metrics.egress_dropped.inc(&[("event", "message_log")]);
            }
        }
        self.sessions.insert(id, conn);
        self.broadcast_presence(&st);
        self.update_clients_gauge(&st);
        drop(st);

        tracing::info!(conn = %id, "client connected");
        id
    }

    /// Explicit name change; everyone (sender included) sees the new roster.
    pub fn set_name(&self, id: ConnectionId, name: &str) {
        let name = name.trim();
        let mut guard = self.lock();
        let st = &mut *guard;
        if st.presence.on_set_name(id, name) {
            tracing::debug!(conn = %id, name, "display name set");
            self.broadcast_presence(st);
        }
    }

    /// Accept a chat message from a local client.
    ///
    /// Returns the envelope when it was newly stored; the caller forwards it
    /// to peers. The sender is excluded from the local broadcast.
    pub fn accept_local(&self, id: ConnectionId, payload: ChatPayload) -> Option<Envelope> {
        let mut guard = self.lock();
        let st = &mut *guard;

        let mut renamed = false;
        if let Some(from) = payload.sender().map(str::to_string) {
            if st.presence.is_unnamed(id) {
                renamed = st.presence.on_set_name(id, &from);
            }
        }

        let env = payload.into_envelope(st.presence.display_name(id));
        let inserted = st.store.append(env.clone());
        if inserted {
            self.metrics.messages.inc(&[("origin", "local"), ("outcome", "stored")]);
            tracing::debug!(conn = %id, id = %env.id, "local message stored");
            self.broadcast(&ServerEvent::ChatMessage(env.clone()), Some(id));
        } else {
            self.metrics.messages.inc(&[("origin", "local"), ("outcome", "duplicate")]);
        }

        if renamed {
            self.broadcast_presence(st);
        }

        inserted.then_some(env)
    }

    /// Accept an envelope relayed by a peer. Returns whether it was new;
    /// only new envelopes are broadcast, to every local client.
    pub fn accept_relayed(&self, env: Envelope) -> bool {
        let mut guard = self.lock();
        let st = &mut *guard;
        let id = env.id.clone();
        let inserted = st.store.append(env.clone());
        if inserted {
            self.metrics.messages.inc(&[("origin", "relay"), ("outcome", "stored")]);
            tracing::debug!(id = %id, "relayed message stored");
            self.broadcast(&ServerEvent::ChatMessage(env), None);
        } else {
            self.metrics.messages.inc(&[("origin", "relay"), ("outcome", "duplicate")]);
            tracing::debug!(id = %id, "relayed message already known");
        }
        inserted
    }

    /// Drop a connection and push the shrunken roster to the remaining clients.
    pub fn disconnect(&self, id: ConnectionId) {
        let mut guard = self.lock();
        let st = &mut *guard;
        self.sessions.remove(id);
        if st.presence.on_disconnect(id) {
            self.broadcast_presence(st);
        }
        self.update_clients_gauge(st);
        tracing::info!(conn = %id, "client disconnected");
    }

    /// Tell one connection its last frame was rejected.
    pub fn send_error(&self, id: ConnectionId, err: &RelayError) {
        let Some(conn) = self.sessions.get(id) else { return };
        if let Some(msg) = self.prepare(&ServerEvent::Error(ErrorBody::from_error(err))) {
            conn.push(msg);
        }
    }

    pub fn users(&self) -> Vec<UserEntry> {
        self.lock().presence.snapshot()
    }

    pub fn recent(&self, n: usize) -> Vec<Envelope> {
        self.lock().store.recent(n)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().store.contains(id)
    }

    pub fn log_len(&self) -> usize {
        self.lock().store.len()
    }

    pub fn connection_count(&self) -> usize {
        self.sessions.len()
    }

    fn prepare(&self, ev: &ServerEvent) -> Option<Message> {
        match PreparedMsg::prepare(ev) {
            Ok(p) => Some(p.to_ws_message()),
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode server event");
                None
            }
        }
    }

    fn broadcast(&self, ev: &ServerEvent, skip: Option<ConnectionId>) {
        let Some(msg) = self.prepare(ev) else { return };
        let lagging = self.sessions.push_all(&msg, skip);
        if lagging.is_empty() {
            return;
        }
        self.metrics.egress_dropped.add(&[("event", "broadcast")], lagging.len() as u64);
        // Lagging clients are closed: the session ends once its backlog is
        // flushed and the client comes back with a fresh `message_log`.
        for id in lagging {
            if self.sessions.remove(id).is_some() {
                tracing::warn!(conn = %id, "outbound queue full, closing connection");
            }
        }
    }

    fn broadcast_presence(&self, st: &NodeState) {
        self.broadcast(&ServerEvent::Users(st.presence.snapshot()), None);
    }

    fn update_clients_gauge(&self, st: &NodeState) {
        self.metrics
            .clients
            .set(&[("node", self.node_label.as_str())], st.presence.len() as i64);
    }
}
