use axum::extract::ws::Message;
use dashmap::DashMap;
use tokio::sync::mpsc;

use std::sync::atomic::{AtomicU64, Ordering};

use super::presence::ConnectionId;

/// One connection's outbound queue sender.
#[derive(Clone)]
pub struct Connection {
    pub tx: mpsc::Sender<Message>,
}

impl Connection {
    /// Lossy enqueue: a full or closed queue drops the frame.
    /// Returns whether the frame was queued.
    pub fn push(&self, msg: Message) -> bool {
        self.tx.try_send(msg).is_ok()
    }
}

/// Session registry: `connection id -> outbound queue`.
pub struct SessionRegistry {
    sessions: DashMap<ConnectionId, Connection>,
    seq: AtomicU64,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            seq: AtomicU64::new(1),
        }
    }

    /// Allocate the next connection id.
    pub fn next_id(&self) -> ConnectionId {
        ConnectionId(self.seq.fetch_add(1, Ordering::Relaxed))
    }

    pub fn insert(&self, id: ConnectionId, conn: Connection) {
        self.sessions.insert(id, conn);
    }

    pub fn remove(&self, id: ConnectionId) -> Option<Connection> {
        self.sessions.remove(&id).map(|(_, conn)| conn)
    }

    pub fn get(&self, id: ConnectionId) -> Option<Connection> {
        self.sessions.get(&id).map(|r| r.value().clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Enqueue `msg` on every connection except `skip`.
    /// Returns the connections whose queue rejected the frame.
    pub fn push_all(&self, msg: &Message, skip: Option<ConnectionId>) -> Vec<ConnectionId> {
        let mut rejected = Vec::new();
        for entry in self.sessions.iter() {
            if Some(*entry.key()) == skip {
                continue;
            }
            if !entry.value().push(msg.clone()) {
                rejected.push(*entry.key());
            }
        }
        rejected
    }
}
