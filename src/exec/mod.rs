// src/exec/mod.rs

//! Process execution layer.
//!
//! This module is responsible for actually running the commands behind
//! action definitions, using `tokio::process::Command`, and classifying
//! what happened.
//!
//! - [`action`] owns the single-action executor: spawn, timeout, output
//!   capture, outcome classification.
//! - [`context`] defines the run context injected into every subprocess as
//!   environment variables.

pub mod action;
pub mod context;

pub use action::{ActionOutcome, ActionStatus, PreparedAction, execute, resolve_timeout};
pub use context::RunContext;
