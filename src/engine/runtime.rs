// src/engine/runtime.rs

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Semaphore, watch};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::config::{PollSection, SourceConfig};
use crate::dispatch::Dispatcher;
use crate::source::{Run, RunConclusion, SourceClient};
use crate::state::CheckpointStore;

/// Tally of one poll cycle, logged at the end of the cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleStats {
    pub sources_ok: usize,
    pub sources_failed: usize,
    pub sources_timed_out: usize,
    pub runs_dispatched: usize,
}

/// The poll loop: checks every configured source on a fixed-delay schedule
/// and feeds qualifying runs to the dispatcher.
///
/// Fixed delay means the interval is measured from the end of one cycle to
/// the start of the next, so a slow cycle never causes overlapping cycles.
/// Source checks within a cycle run concurrently, bounded by
/// `poll.max_workers`, and each check is abandoned (not cancelled remotely,
/// just dropped) when it overruns `poll.source_timeout_secs`. An abandoned
/// or failed check is retried from the same checkpoints on the next cycle.
pub struct Engine<C: SourceClient + 'static> {
    poll: PollSection,
    sources: BTreeMap<String, SourceConfig>,
    client: Arc<C>,
    store: Arc<CheckpointStore>,
    dispatcher: Arc<Dispatcher>,
    shutdown: watch::Receiver<bool>,
}

impl<C: SourceClient + 'static> Engine<C> {
    pub fn new(
        poll: PollSection,
        sources: BTreeMap<String, SourceConfig>,
        client: Arc<C>,
        store: Arc<CheckpointStore>,
        dispatcher: Arc<Dispatcher>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            poll,
            sources,
            client,
            store,
            dispatcher,
            shutdown,
        }
    }

    /// Run poll cycles until shutdown is signalled (or after a single cycle
    /// when `once` is set). A run dispatch already in progress is allowed to
    /// finish; shutdown is only observed between cycles and during the
    /// inter-cycle sleep.
    pub async fn run(mut self, once: bool) -> crate::errors::Result<()> {
        let interval = Duration::from_secs(self.poll.interval_secs);
        info!(
            sources = self.sources.len(),
            interval_secs = self.poll.interval_secs,
            parallel = self.poll.parallel,
            max_workers = self.poll.max_workers,
            "poll loop started"
        );

        loop {
            let stats = self.run_cycle().await;
            info!(
                ok = stats.sources_ok,
                failed = stats.sources_failed,
                timed_out = stats.sources_timed_out,
                dispatched = stats.runs_dispatched,
                "poll cycle finished"
            );

            if once {
                info!("single-cycle mode; exiting");
                return Ok(());
            }
            if *self.shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = self.shutdown.changed() => {}
            }
            if *self.shutdown.borrow() {
                break;
            }
        }

        info!("poll loop stopped");
        Ok(())
    }

    /// Check every source once. Failures and timeouts are per-source; one
    /// bad source never affects the others.
    pub async fn run_cycle(&self) -> CycleStats {
        let mut stats = CycleStats::default();
        let check_timeout = Duration::from_secs(self.poll.source_timeout_secs);

        if self.poll.parallel && self.sources.len() > 1 {
            let semaphore = Arc::new(Semaphore::new(self.poll.max_workers.max(1)));
            let mut handles = Vec::with_capacity(self.sources.len());

            for (name, filters) in &self.sources {
                let name = name.clone();
                let filters = filters.clone();
                let semaphore = semaphore.clone();
                let client = self.client.clone();
                let store = self.store.clone();
                let dispatcher = self.dispatcher.clone();

                handles.push(tokio::spawn(async move {
                    // Closed only if the semaphore is dropped, which it is not.
                    let Ok(_permit) = semaphore.acquire().await else {
                        return (name, CheckResult::Failed);
                    };
                    let result = timeout(
                        check_timeout,
                        check_source(&*client, &store, &dispatcher, &name, &filters),
                    )
                    .await;
                    (name, fold_check(result))
                }));
            }

            for handle in handles {
                match handle.await {
                    Ok((name, result)) => record(&mut stats, &name, result),
                    Err(err) => {
                        error!(error = %err, "source check task panicked");
                        stats.sources_failed += 1;
                    }
                }
            }
        } else {
            for (name, filters) in &self.sources {
                let result = timeout(
                    check_timeout,
                    check_source(&*self.client, &self.store, &self.dispatcher, name, filters),
                )
                .await;
                record(&mut stats, name, fold_check(result));
            }
        }

        stats
    }
}

enum CheckResult {
    Ok { dispatched: usize },
    Failed,
    TimedOut,
}

fn fold_check(result: Result<Result<usize, ()>, tokio::time::error::Elapsed>) -> CheckResult {
    match result {
        Ok(Ok(dispatched)) => CheckResult::Ok { dispatched },
        Ok(Err(())) => CheckResult::Failed,
        Err(_) => CheckResult::TimedOut,
    }
}

fn record(stats: &mut CycleStats, source: &str, result: CheckResult) {
    match result {
        CheckResult::Ok { dispatched } => {
            stats.sources_ok += 1;
            stats.runs_dispatched += dispatched;
        }
        CheckResult::Failed => {
            stats.sources_failed += 1;
        }
        CheckResult::TimedOut => {
            warn!(source, "source check timed out; retrying next cycle");
            stats.sources_timed_out += 1;
        }
    }
}

/// Check one source: list new completed runs, order them, and dispatch each
/// qualifying one. Errors are logged here and reported as `Err(())`; the
/// caller only needs the tally.
async fn check_source<C: SourceClient>(
    client: &C,
    store: &CheckpointStore,
    dispatcher: &Dispatcher,
    source: &str,
    filters: &SourceConfig,
) -> Result<usize, ()> {
    let since = store.source_view(source);
    debug!(source, checkpoints = since.len(), "checking source");

    let runs = match client.list_new_runs(source, filters, &since).await {
        Ok(runs) => runs,
        Err(err) => {
            warn!(source, error = %err, "source check failed; retrying next cycle");
            return Err(());
        }
    };

    if runs.is_empty() {
        debug!(source, "no new runs");
        return Ok(0);
    }

    let mut dispatched = 0usize;
    for run in order_runs(runs) {
        match run.conclusion {
            RunConclusion::Success => {}
            conclusion => {
                // Not advancing the checkpoint: a later success of the same
                // run number cannot exist, but a re-run will get a new number.
                debug!(
                    source,
                    workflow = %run.workflow,
                    number = run.number,
                    ?conclusion,
                    "run did not succeed; skipping without checkpointing"
                );
                continue;
            }
        }

        if let Some(&seen) = since.get(&run.workflow)
            && run.number <= seen
        {
            continue;
        }

        match dispatcher.dispatch(source, &run).await {
            Ok(outcome) => {
                dispatched += 1;
                if outcome.failed_actions() > 0 {
                    warn!(
                        source,
                        workflow = %run.workflow,
                        number = run.number,
                        failed = outcome.failed_actions(),
                        "run dispatched with action failures"
                    );
                }
            }
            Err(err) => {
                error!(
                    source,
                    workflow = %run.workflow,
                    number = run.number,
                    error = %err,
                    "dispatch failed; aborting source check"
                );
                return Err(());
            }
        }
    }

    Ok(dispatched)
}

/// Ascending run number within each workflow, workflows interleaved in
/// workflow-name order. Dispatch order is what makes the per-workflow
/// checkpoint advance monotonically.
fn order_runs(mut runs: Vec<Run>) -> Vec<Run> {
    runs.sort_by(|a, b| a.workflow.cmp(&b.workflow).then(a.number.cmp(&b.number)));
    runs
}
