//! Small constructors for the fixtures most tests need.

use std::collections::BTreeMap;
use std::sync::Arc;

use cimon::config::{ActionConfig, ExecutionMap};
use cimon::dispatch::Dispatcher;
use cimon::source::{Run, RunConclusion};
use cimon::state::CheckpointStore;

/// A successful completed run with plausible metadata.
pub fn run(workflow: &str, number: u64) -> Run {
    Run {
        workflow: workflow.to_string(),
        workflow_id: 77,
        number,
        id: 1_000_000 + number,
        branch: "main".to_string(),
        sha: format!("{number:040x}"),
        message: format!("commit for run {number}"),
        author: "dev".to_string(),
        conclusion: RunConclusion::Success,
        completed_at: Some(chrono::Utc::now()),
    }
}

pub fn run_on_branch(workflow: &str, number: u64, branch: &str) -> Run {
    Run {
        branch: branch.to_string(),
        ..run(workflow, number)
    }
}

pub fn failed_run(workflow: &str, number: u64) -> Run {
    Run {
        conclusion: RunConclusion::Failure,
        ..run(workflow, number)
    }
}

/// Action running a raw shell command with no explicit timeout.
pub fn action(command: &str) -> ActionConfig {
    ActionConfig {
        command: command.to_string(),
        working_dir: None,
        timeout_secs: None,
        description: None,
    }
}

/// Execution map with a single `(source, branch) -> actions` entry.
pub fn single_entry_map(source: &str, branch: &str, actions: &[&str]) -> ExecutionMap {
    let mut branches = BTreeMap::new();
    branches.insert(
        branch.to_string(),
        actions.iter().map(|s| s.to_string()).collect(),
    );
    let mut map = ExecutionMap::new();
    map.insert(source.to_string(), branches);
    map
}

/// A dispatcher over a fresh store in `dir`, with its own execution lock.
pub fn dispatcher(
    dir: &tempfile::TempDir,
    actions: BTreeMap<String, ActionConfig>,
    execution: ExecutionMap,
) -> (Arc<CheckpointStore>, Dispatcher) {
    let store = Arc::new(CheckpointStore::load(dir.path().join("state.toml")).unwrap());
    let lock = Arc::new(tokio::sync::Mutex::new(()));
    let dispatcher = Dispatcher::new(actions, execution, store.clone(), lock);
    (store, dispatcher)
}
