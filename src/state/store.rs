// src/state/store.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::{MonitorError, Result};
use crate::source::WorkflowCheckpoints;
use crate::state::atomic_write;

/// Durable map of `(source, workflow) -> highest run number already
/// dispatched`.
///
/// The whole file is read into memory at startup and rewritten atomically on
/// every advance. One mutex serializes all access; `advance` performs the
/// compare, the in-memory update, and the durable write without releasing
/// it, so two workers can never race a stale number onto disk.
///
/// Invariant: values are monotonically non-decreasing per key. A stale or
/// duplicate `advance` is a no-op, never an error.
pub struct CheckpointStore {
    path: PathBuf,
    inner: Mutex<CheckpointMap>,
}

/// source -> workflow -> run number. Nested maps keep the TOML readable:
///
/// ```toml
/// [checkpoint."owner/repo"]
/// build = 43
/// ```
type CheckpointMap = BTreeMap<String, BTreeMap<String, u64>>;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
    #[serde(default)]
    checkpoint: CheckpointMap,
}

impl CheckpointStore {
    /// Load the store from `path`. A missing file is an empty store; an
    /// unreadable or malformed file is an error (silently starting from
    /// scratch would re-run every action in the window).
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let map = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            let file: StateFile = toml::from_str(&contents).map_err(|e| {
                MonitorError::State(format!("malformed checkpoint file {:?}: {}", path, e))
            })?;
            info!(path = ?path, sources = file.checkpoint.len(), "loaded checkpoint state");
            file.checkpoint
        } else {
            info!(path = ?path, "no checkpoint state file; starting empty");
            CheckpointMap::new()
        };

        Ok(Self {
            path,
            inner: Mutex::new(map),
        })
    }

    /// Highest run number already dispatched for `(source, workflow)`, or
    /// `None` if nothing has been dispatched for that key yet.
    pub fn get(&self, source: &str, workflow: &str) -> Option<u64> {
        let map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.get(source).and_then(|wf| wf.get(workflow)).copied()
    }

    /// Snapshot of all checkpoints for one source, keyed by workflow.
    pub fn source_view(&self, source: &str) -> WorkflowCheckpoints {
        let map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.get(source).cloned().unwrap_or_default()
    }

    /// Advance the checkpoint for `(source, workflow)` to `number`.
    ///
    /// Accepts only if `number` is greater than the stored value; otherwise
    /// it is an idempotent no-op returning `Ok(false)`. The durable write
    /// happens inside the same critical section as the compare-and-update.
    pub fn advance(&self, source: &str, workflow: &str, number: u64) -> Result<bool> {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        let entry = map
            .entry(source.to_string())
            .or_default()
            .entry(workflow.to_string())
            .or_insert(0);

        if number <= *entry {
            debug!(
                source,
                workflow,
                number,
                stored = *entry,
                "stale checkpoint advance ignored"
            );
            return Ok(false);
        }

        let previous = *entry;
        *entry = number;
        Self::persist(&self.path, &map)?;

        debug!(source, workflow, from = previous, to = number, "checkpoint advanced");
        Ok(true)
    }

    /// Delete the checkpoint file, if present. The documented reset
    /// operation: every run still inside the source's recency window will be
    /// re-processed on the next cycle.
    pub fn reset_file(path: &Path) -> Result<()> {
        match std::fs::remove_file(path) {
            Ok(()) => {
                warn!(path = ?path, "checkpoint state file deleted; recent runs will re-process");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn persist(path: &Path, map: &CheckpointMap) -> Result<()> {
        let file = StateFile {
            checkpoint: map.clone(),
        };
        let rendered = toml::to_string_pretty(&file)?;
        atomic_write(path, rendered.as_bytes())
            .map_err(|e| MonitorError::State(format!("writing checkpoint file {:?}: {}", path, e)))
    }
}
