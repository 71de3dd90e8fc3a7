//! End-to-end dispatch scenarios: resolve, execute, checkpoint.

#![cfg(unix)]

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;

use cimon::config::ActionConfig;
use cimon::dispatch::{DispatchOutcome, Dispatcher};
use cimon::state::CheckpointStore;

use common::builders;

const SOURCE: &str = "owner/repo";

#[tokio::test]
async fn consecutive_runs_execute_once_each_and_checkpoint_the_latest() {
    common::init_tracing();
    let dir = tempfile::TempDir::new().unwrap();
    let log = dir.path().join("notify.log");

    let mut actions = BTreeMap::new();
    actions.insert(
        "notify".to_string(),
        builders::action(&format!("echo \"run $RUN_NUMBER\" >> {}", log.display())),
    );
    let execution = builders::single_entry_map(SOURCE, "main", &["notify"]);
    let (store, dispatcher) = builders::dispatcher(&dir, actions, execution);

    for number in [42, 43] {
        let outcome = dispatcher
            .dispatch(SOURCE, &builders::run("build", number))
            .await
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::Checkpointed);
    }

    assert_eq!(std::fs::read_to_string(&log).unwrap(), "run 42\nrun 43\n");
    assert_eq!(store.get(SOURCE, "build"), Some(43));
}

#[tokio::test]
async fn run_without_execution_entry_still_checkpoints() {
    common::init_tracing();
    let dir = tempfile::TempDir::new().unwrap();

    let mut actions = BTreeMap::new();
    actions.insert("notify".to_string(), builders::action("echo hi"));
    // Map only covers a different branch.
    let execution = builders::single_entry_map(SOURCE, "release", &["notify"]);
    let (store, dispatcher) = builders::dispatcher(&dir, actions, execution);

    let outcome = dispatcher
        .dispatch(SOURCE, &builders::run("build", 7))
        .await
        .unwrap();

    assert_eq!(outcome, DispatchOutcome::Checkpointed);
    assert_eq!(store.get(SOURCE, "build"), Some(7));
}

#[tokio::test]
async fn failing_action_is_counted_but_run_is_still_checkpointed() {
    common::init_tracing();
    let dir = tempfile::TempDir::new().unwrap();
    let log = dir.path().join("after.log");

    let mut actions = BTreeMap::new();
    actions.insert("broken".to_string(), builders::action("exit 1"));
    actions.insert(
        "after".to_string(),
        builders::action(&format!("echo ran >> {}", log.display())),
    );
    let execution = builders::single_entry_map(SOURCE, "main", &["broken", "after"]);
    let (store, dispatcher) = builders::dispatcher(&dir, actions, execution);

    let outcome = dispatcher
        .dispatch(SOURCE, &builders::run("build", 9))
        .await
        .unwrap();

    assert_eq!(outcome, DispatchOutcome::CheckpointedWithFailures { failed: 1 });
    // The action after the failing one still ran.
    assert_eq!(std::fs::read_to_string(&log).unwrap(), "ran\n");
    assert_eq!(store.get(SOURCE, "build"), Some(9));
}

#[tokio::test]
async fn actions_run_in_configured_order() {
    common::init_tracing();
    let dir = tempfile::TempDir::new().unwrap();
    let log = dir.path().join("order.log");

    let mut actions = BTreeMap::new();
    for name in ["restart", "notify", "cleanup"] {
        actions.insert(
            name.to_string(),
            builders::action(&format!("echo {name} >> {}", log.display())),
        );
    }
    // Configured order differs from the map's alphabetical key order.
    let execution = builders::single_entry_map(SOURCE, "main", &["restart", "notify", "cleanup"]);
    let (_store, dispatcher) = builders::dispatcher(&dir, actions, execution);

    dispatcher
        .dispatch(SOURCE, &builders::run("build", 1))
        .await
        .unwrap();

    assert_eq!(
        std::fs::read_to_string(&log).unwrap(),
        "restart\nnotify\ncleanup\n"
    );
}

#[tokio::test]
async fn unknown_action_name_is_skipped_not_fatal() {
    common::init_tracing();
    let dir = tempfile::TempDir::new().unwrap();
    let log = dir.path().join("known.log");

    let mut actions = BTreeMap::new();
    actions.insert(
        "known".to_string(),
        builders::action(&format!("echo known >> {}", log.display())),
    );
    let execution = builders::single_entry_map(SOURCE, "main", &["ghost", "known"]);
    let (store, dispatcher) = builders::dispatcher(&dir, actions, execution);

    let outcome = dispatcher
        .dispatch(SOURCE, &builders::run("build", 2))
        .await
        .unwrap();

    assert_eq!(outcome, DispatchOutcome::Checkpointed);
    assert_eq!(std::fs::read_to_string(&log).unwrap(), "known\n");
    assert_eq!(store.get(SOURCE, "build"), Some(2));
}

#[tokio::test]
async fn shared_execution_lock_serializes_concurrent_dispatches() {
    common::init_tracing();
    let dir = tempfile::TempDir::new().unwrap();
    let seq = dir.path().join("sequence.log");

    let store = Arc::new(CheckpointStore::load(dir.path().join("state.toml")).unwrap());
    let lock = Arc::new(tokio::sync::Mutex::new(()));

    let make_dispatcher = |source: &str| {
        let mut actions: BTreeMap<String, ActionConfig> = BTreeMap::new();
        actions.insert(
            "mark".to_string(),
            builders::action(&format!(
                "echo \"start $SOURCE_NAME\" >> {path}; sleep 0.3; echo \"end $SOURCE_NAME\" >> {path}",
                path = seq.display()
            )),
        );
        let execution = builders::single_entry_map(source, "main", &["mark"]);
        Dispatcher::new(actions, execution, store.clone(), lock.clone())
    };

    let a = make_dispatcher("team/alpha");
    let b = make_dispatcher("team/beta");

    let run_a = builders::run("build", 1);
    let run_b = builders::run("build", 1);
    let (ra, rb) = tokio::join!(
        a.dispatch("team/alpha", &run_a),
        b.dispatch("team/beta", &run_b),
    );
    ra.unwrap();
    rb.unwrap();

    // Whichever order the lock granted, starts and ends never interleave.
    let lines: Vec<String> = std::fs::read_to_string(&seq)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0].replace("start", "end"), lines[1]);
    assert_eq!(lines[2].replace("start", "end"), lines[3]);
}
