// src/engine/health.rs

use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::config::HealthSection;
use crate::state::atomic_write;

/// Liveness marker: rewrites a small file with `OK - <timestamp>` on an
/// interval while the process is running, for an external watchdog to stat.
///
/// Best effort. A failed write is logged and retried on the next tick; it
/// never brings the poll loop down.
pub struct HealthMarker {
    file: PathBuf,
    interval: Duration,
}

impl HealthMarker {
    /// Build a marker from config, or `None` when the feature is disabled.
    pub fn from_config(cfg: &HealthSection) -> Option<Self> {
        if !cfg.enabled {
            return None;
        }
        Some(Self {
            file: cfg.file.clone(),
            interval: Duration::from_secs(cfg.interval_secs.max(1)),
        })
    }

    /// Touch the marker once immediately, then on every interval tick until
    /// shutdown is signalled.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        loop {
            self.touch();
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.changed() => {}
            }
            if *shutdown.borrow() {
                return;
            }
        }
    }

    fn touch(&self) {
        let line = format!("OK - {}\n", Utc::now().to_rfc3339());
        match atomic_write(&self.file, line.as_bytes()) {
            Ok(()) => debug!(file = ?self.file, "health marker updated"),
            Err(err) => warn!(file = ?self.file, error = %err, "failed to update health marker"),
        }
    }
}
