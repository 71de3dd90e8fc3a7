// src/dispatch/mod.rs

//! Run dispatch: resolving which actions a qualifying run triggers and
//! executing them exactly once.
//!
//! - [`resolve`] is the pure `(source, branch) -> action names` lookup.
//! - [`coordinator`] owns per-run execution order, the process-wide
//!   execution lock, and the checkpoint advance.

pub mod coordinator;
pub mod resolve;

pub use coordinator::{DispatchOutcome, Dispatcher};
pub use resolve::resolve;
