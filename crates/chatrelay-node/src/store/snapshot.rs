//! Write-behind persistence for the message log.
//!
//! The whole log is rewritten on every mutation. Writes happen on a
//! background task fed through a `watch` channel, so a burst of appends
//! collapses into one write of the latest state.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::watch;

use chatrelay_core::Envelope;

/// Receives full copies of the log after each mutation.
pub trait SnapshotSink: Send + Sync {
    fn schedule(&self, entries: Vec<Envelope>);
}

/// Discards snapshots (in-memory node).
pub struct NoSnapshot;

impl SnapshotSink for NoSnapshot {
    fn schedule(&self, _entries: Vec<Envelope>) {}
}

/// Persists snapshots to one JSON file.
pub struct FileSnapshot {
    tx: watch::Sender<Option<Arc<Vec<Envelope>>>>,
}

impl FileSnapshot {
    /// Start the writer task. Must be called inside a tokio runtime.
    pub fn spawn(path: impl Into<PathBuf>) -> Arc<Self> {
        let path = path.into();
        let (tx, mut rx) = watch::channel::<Option<Arc<Vec<Envelope>>>>(None);

        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let latest = rx.borrow_and_update().clone();
                let Some(entries) = latest else { continue };
                match write_snapshot(&path, &entries).await {
                    Ok(()) => tracing::debug!(path = %path.display(), len = entries.len(), "message snapshot written"),
                    Err(e) => tracing::warn!(path = %path.display(), error = %e, "message snapshot write failed"),
                }
            }
        });

        Arc::new(Self { tx })
    }
}

impl SnapshotSink for FileSnapshot {
    fn schedule(&self, entries: Vec<Envelope>) {
        self.tx.send_replace(Some(Arc::new(entries)));
    }
}

async fn write_snapshot(path: &Path, entries: &[Envelope]) -> io::Result<()> {
    let bytes = serde_json::to_vec(entries)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await
}

/// `Ok(None)` when no snapshot exists yet.
pub(crate) fn read_snapshot(path: &Path) -> io::Result<Option<Vec<Envelope>>> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}
