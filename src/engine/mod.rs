// src/engine/mod.rs

//! The long-running core: the poll scheduler in [`runtime`] and the
//! optional liveness marker in [`health`].

pub mod health;
pub mod runtime;

pub use health::HealthMarker;
pub use runtime::{CycleStats, Engine};
