//! In-memory source client used to drive the engine without a network.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use std::time::Duration;

use cimon::config::SourceConfig;
use cimon::source::{Run, SourceClient, SourceError, WorkflowCheckpoints};

/// A canned source client: each source has a fixed list of completed runs,
/// and named sources can be made to fail every call or stall before
/// answering. Applies the same branch-filter and checkpoint semantics a real
/// client would, and records how often each source was checked.
#[derive(Default)]
pub struct FakeSource {
    runs: Mutex<BTreeMap<String, Vec<Run>>>,
    failing: Mutex<BTreeSet<String>>,
    delays: Mutex<BTreeMap<String, Duration>>,
    calls: Mutex<BTreeMap<String, usize>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_runs(self, source: &str, runs: Vec<Run>) -> Self {
        self.runs
            .lock()
            .unwrap()
            .insert(source.to_string(), runs);
        self
    }

    pub fn failing_for(self, source: &str) -> Self {
        self.failing.lock().unwrap().insert(source.to_string());
        self
    }

    /// Stall every call for `source` by `delay` before answering.
    pub fn delayed_for(self, source: &str, delay: Duration) -> Self {
        self.delays
            .lock()
            .unwrap()
            .insert(source.to_string(), delay);
        self
    }

    pub fn calls_for(&self, source: &str) -> usize {
        self.calls.lock().unwrap().get(source).copied().unwrap_or(0)
    }
}

impl SourceClient for FakeSource {
    fn list_new_runs(
        &self,
        source: &str,
        filters: &SourceConfig,
        since: &WorkflowCheckpoints,
    ) -> impl Future<Output = Result<Vec<Run>, SourceError>> + Send {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(source.to_string())
            .or_insert(0) += 1;

        let delay = self.delays.lock().unwrap().get(source).copied();

        let result = if self.failing.lock().unwrap().contains(source) {
            Err(SourceError::Api {
                status: 500,
                message: "injected failure".to_string(),
            })
        } else {
            let runs = self
                .runs
                .lock()
                .unwrap()
                .get(source)
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .filter(|r| filters.matches_branch(&r.branch))
                .filter(|r| since.get(&r.workflow).is_none_or(|&seen| r.number > seen))
                .collect();
            Ok(runs)
        };

        async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            result
        }
    }
}
