// src/dispatch/coordinator.rs

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::{ActionConfig, ExecutionMap};
use crate::dispatch::resolve;
use crate::exec::{self, ActionOutcome, PreparedAction, RunContext};
use crate::source::Run;
use crate::state::CheckpointStore;

/// How much captured output to repeat in the per-action summary log line.
const LOG_OUTPUT_LINES: usize = 20;

/// Terminal state of one run's dispatch. The checkpoint has advanced in
/// both cases: a failed action is not retried on later polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Checkpointed,
    CheckpointedWithFailures { failed: usize },
}

impl DispatchOutcome {
    pub fn failed_actions(self) -> usize {
        match self {
            DispatchOutcome::Checkpointed => 0,
            DispatchOutcome::CheckpointedWithFailures { failed } => failed,
        }
    }
}

/// Dispatches one qualifying run: resolves its action list, executes the
/// actions strictly in order under the process-wide execution lock, then
/// advances the checkpoint exactly once.
///
/// The execution lock serializes subprocess side effects across *all* runs,
/// including runs detected concurrently by different poll workers, so
/// command output in the log never interleaves. The checkpoint store has its
/// own internal lock and is deliberately not covered by the execution lock.
pub struct Dispatcher {
    actions: BTreeMap<String, ActionConfig>,
    execution: ExecutionMap,
    store: Arc<CheckpointStore>,
    exec_lock: Arc<Mutex<()>>,
}

impl Dispatcher {
    pub fn new(
        actions: BTreeMap<String, ActionConfig>,
        execution: ExecutionMap,
        store: Arc<CheckpointStore>,
        exec_lock: Arc<Mutex<()>>,
    ) -> Self {
        Self {
            actions,
            execution,
            store,
            exec_lock,
        }
    }

    /// Dispatch one run end to end. Always terminates in a checkpointed
    /// state; per-action failures never block later actions or the
    /// checkpoint advance.
    pub async fn dispatch(&self, source: &str, run: &Run) -> crate::errors::Result<DispatchOutcome> {
        debug!(
            source,
            workflow = %run.workflow,
            number = run.number,
            "resolving actions for run"
        );

        let prepared = self.resolve_actions(source, run);

        if prepared.is_empty() {
            info!(
                source,
                workflow = %run.workflow,
                number = run.number,
                branch = %run.branch,
                "no actions configured; checkpointing run as seen"
            );
            self.store.advance(source, &run.workflow, run.number)?;
            return Ok(DispatchOutcome::Checkpointed);
        }

        info!(
            source,
            workflow = %run.workflow,
            number = run.number,
            branch = %run.branch,
            sha = %run.sha,
            actions = prepared.len(),
            "dispatching run"
        );

        let ctx = RunContext::new(source, run);
        let total = prepared.len();
        let mut failed = 0usize;

        {
            let _guard = self.exec_lock.lock().await;
            for (i, action) in prepared.iter().enumerate() {
                info!(
                    source,
                    action = %action.name,
                    step = format!("{}/{}", i + 1, total),
                    "executing action"
                );
                let outcome = exec::execute(action, &ctx).await;
                log_outcome(source, run, &outcome);
                if !outcome.status.is_success() {
                    failed += 1;
                }
            }
        }

        // Only after the full list has been attempted, never partially.
        self.store.advance(source, &run.workflow, run.number)?;

        let outcome = if failed == 0 {
            DispatchOutcome::Checkpointed
        } else {
            DispatchOutcome::CheckpointedWithFailures { failed }
        };
        info!(
            source,
            workflow = %run.workflow,
            number = run.number,
            failed,
            total,
            "run dispatched and checkpointed"
        );
        Ok(outcome)
    }

    /// Resolve the run's action names into prepared actions. An unknown name
    /// here means the config changed underneath us or validation was
    /// bypassed; that one action is skipped with a warning, the rest still
    /// run.
    fn resolve_actions(&self, source: &str, run: &Run) -> Vec<PreparedAction> {
        resolve(&self.execution, source, &run.branch)
            .iter()
            .filter_map(|name| match self.actions.get(name) {
                Some(cfg) => Some(PreparedAction::from_config(name, cfg)),
                None => {
                    warn!(source, action = %name, "action definition not found; skipping");
                    None
                }
            })
            .collect()
    }
}

fn log_outcome(source: &str, run: &Run, outcome: &ActionOutcome) {
    let stdout_tail = tail(&outcome.stdout);
    let stderr_tail = tail(&outcome.stderr);

    if outcome.status.is_success() {
        info!(
            source,
            action = %outcome.name,
            run_number = run.number,
            duration_ms = outcome.duration.as_millis() as u64,
            "action succeeded"
        );
        if !stdout_tail.is_empty() {
            debug!(action = %outcome.name, "output: {stdout_tail}");
        }
    } else {
        warn!(
            source,
            action = %outcome.name,
            run_number = run.number,
            status = ?outcome.status,
            duration_ms = outcome.duration.as_millis() as u64,
            stdout = %stdout_tail,
            stderr = %stderr_tail,
            "action did not succeed"
        );
    }
}

/// Last few captured lines, joined for a single log field.
fn tail(lines: &[String]) -> String {
    let start = lines.len().saturating_sub(LOG_OUTPUT_LINES);
    lines[start..].join(" | ")
}
