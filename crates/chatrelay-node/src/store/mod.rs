//! Bounded, deduplicating message log for one node.
//!
//! Insertion order is arrival order at this node. The log never holds two
//! envelopes with the same id and never exceeds its cap; the oldest entry is
//! evicted first. Every mutation hands a full copy of the log to the
//! configured [`SnapshotSink`]; persistence failures never reach the caller.

mod snapshot;

use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::sync::Arc;

use chatrelay_core::Envelope;

pub use snapshot::{FileSnapshot, NoSnapshot, SnapshotSink};

pub struct MessageStore {
    entries: VecDeque<Envelope>,
    ids: HashSet<String>,
    cap: usize,
    sink: Arc<dyn SnapshotSink>,
}

impl MessageStore {
    pub fn new(cap: usize, sink: Arc<dyn SnapshotSink>) -> Self {
        let cap = cap.max(1);
        Self {
            entries: VecDeque::with_capacity(cap.min(4096)),
            ids: HashSet::new(),
            cap,
            sink,
        }
    }

    /// Build a store seeded from a prior snapshot file. A missing or corrupt
    /// file yields an empty log.
    pub fn load(path: &Path, cap: usize, sink: Arc<dyn SnapshotSink>) -> Self {
        let mut store = Self::new(cap, sink);
        let prior = match snapshot::read_snapshot(path) {
            Ok(Some(v)) => v,
            Ok(None) => {
                tracing::info!(path = %path.display(), "no message snapshot, starting empty");
                return store;
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "unreadable message snapshot, starting empty");
                return store;
            }
        };

        let total = prior.len();
        for env in prior {
            if store.ids.contains(&env.id) {
                continue;
            }
            store.push_evicting(env);
        }
        tracing::info!(path = %path.display(), total, kept = store.len(), "message snapshot loaded");
        store
    }

    /// Insert unless the id is already present. Returns whether it was new.
    pub fn append(&mut self, env: Envelope) -> bool {
        if self.ids.contains(&env.id) {
            return false;
        }
        self.push_evicting(env);
        self.sink.schedule(self.entries.iter().cloned().collect());
        true
    }

    /// The most recent `n` entries, oldest first.
    pub fn recent(&self, n: usize) -> Vec<Envelope> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    fn push_evicting(&mut self, env: Envelope) {
        self.ids.insert(env.id.clone());
        self.entries.push_back(env);
        while self.entries.len() > self.cap {
            if let Some(old) = self.entries.pop_front() {
                self.ids.remove(&old.id);
            }
        }
    }
}
