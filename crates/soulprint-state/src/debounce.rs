//! Debounced single-writer persistence.
//!
//! Concurrent writers within the process serialize through one task per file;
//! bursts of updates collapse into one disk write after a quiet window.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use soulprint_core::constants::FLUSH_DEBOUNCE_MS;
use soulprint_core::error::SoulprintError;

use crate::files::write_bytes_atomic;

/// Handle to a spawned writer task. Dropping every handle flushes any pending
/// snapshot and stops the task.
#[derive(Clone)]
pub struct DebouncedWriter {
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl DebouncedWriter {
    /// Spawn the writer for `path` with the default ~2 s debounce.
    pub fn spawn(path: PathBuf) -> Self {
        Self::spawn_with(path, Duration::from_millis(FLUSH_DEBOUNCE_MS))
    }

    pub fn spawn_with(path: PathBuf, debounce: Duration) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
        tokio::spawn(async move {
            while let Some(first) = rx.recv().await {
                let mut latest = first;
                // Coalesce everything arriving inside the quiet window.
                loop {
                    match tokio::time::timeout(debounce, rx.recv()).await {
                        Ok(Some(newer)) => latest = newer,
                        Ok(None) | Err(_) => break,
                    }
                }
                if let Err(e) = write_bytes_atomic(&path, &latest) {
                    warn!(path = %path.display(), error = %e, "state flush failed");
                } else {
                    debug!(path = %path.display(), bytes = latest.len(), "state flushed");
                }
            }
        });
        Self { tx }
    }

    /// Queue a snapshot for writing. Serialization errors are logged, not
    /// surfaced; persistence must never block or fail the caller's path.
    pub fn write<T: Serialize>(&self, value: &T) {
        match serde_json::to_vec_pretty(value) {
            Ok(bytes) => {
                let _ = self.tx.send(bytes);
            }
            Err(e) => warn!(error = %e, "state snapshot serialization failed"),
        }
    }

    /// Queue pre-serialized bytes.
    pub fn write_bytes(&self, bytes: Vec<u8>) -> Result<(), SoulprintError> {
        self.tx
            .send(bytes)
            .map_err(|_| SoulprintError::Storage("writer task gone".into()))
    }
}
