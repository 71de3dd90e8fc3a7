// src/lib.rs

pub mod cli;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod source;
pub mod state;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tracing::info;

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::dispatch::Dispatcher;
use crate::engine::{Engine, HealthMarker};
use crate::source::GithubClient;
use crate::state::CheckpointStore;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - checkpoint store
/// - GitHub source client
/// - dispatcher + poll engine
/// - (optional) health marker
/// - Ctrl-C / SIGTERM handling
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    if args.reset_state {
        CheckpointStore::reset_file(&cfg.state.file)?;
    }

    let store = Arc::new(CheckpointStore::load(cfg.state.file.clone())?);
    let client = Arc::new(GithubClient::from_config(&cfg.github)?);

    // One lock for all subprocess side effects, shared by every poll worker.
    let exec_lock = Arc::new(tokio::sync::Mutex::new(()));
    let dispatcher = Arc::new(Dispatcher::new(
        cfg.action.clone(),
        cfg.execution.clone(),
        store.clone(),
        exec_lock,
    ));

    // Signal → graceful shutdown between cycles.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    spawn_signal_listener(shutdown_tx);

    if let Some(marker) = HealthMarker::from_config(&cfg.health) {
        tokio::spawn(marker.run(shutdown_rx.clone()));
    }

    let engine = Engine::new(
        cfg.poll.clone(),
        cfg.source.clone(),
        client,
        store,
        dispatcher,
        shutdown_rx,
    );
    engine.run(args.once).await?;
    Ok(())
}

/// Flip the shutdown flag on Ctrl-C or (on unix) SIGTERM.
fn spawn_signal_listener(tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    eprintln!("failed to install SIGTERM handler: {e}");
                    return;
                }
            };
            tokio::select! {
                res = tokio::signal::ctrl_c() => {
                    if let Err(e) = res {
                        eprintln!("failed to listen for Ctrl+C: {e}");
                        return;
                    }
                    info!("Ctrl-C received; shutting down after current cycle");
                }
                _ = sigterm.recv() => {
                    info!("SIGTERM received; shutting down after current cycle");
                }
            }
        }

        #[cfg(not(unix))]
        {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            info!("Ctrl-C received; shutting down after current cycle");
        }

        let _ = tx.send(true);
    });
}

/// Simple dry-run output: print sources, actions and the execution map.
fn print_dry_run(cfg: &ConfigFile) {
    println!("cimon dry-run");
    println!("  poll.interval_secs = {}", cfg.poll.interval_secs);
    println!("  poll.max_workers = {}", cfg.poll.max_workers);
    println!("  state.file = {}", cfg.state.file.display());
    println!();

    println!("sources ({}):", cfg.source.len());
    for (name, source) in cfg.source.iter() {
        println!("  - {name}");
        if !source.workflows.is_empty() {
            println!("      workflows: {:?}", source.workflows);
        }
        if !source.branches.is_empty() {
            println!("      branches: {:?}", source.branches);
        }
    }
    println!();

    println!("actions ({}):", cfg.action.len());
    for (name, action) in cfg.action.iter() {
        println!("  - {name}");
        println!("      cmd: {}", action.command);
        if let Some(ref dir) = action.working_dir {
            println!("      working_dir: {}", dir.display());
        }
        if let Some(secs) = action.timeout_secs {
            println!("      timeout_secs: {secs}");
        }
        if let Some(ref desc) = action.description {
            println!("      description: {desc}");
        }
    }
    println!();

    println!("execution map:");
    for (source, branches) in cfg.execution.iter() {
        for (branch, actions) in branches.iter() {
            println!("  {source} / {branch} -> {actions:?}");
        }
    }
}
