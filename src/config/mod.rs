// src/config/mod.rs

//! Configuration loading and validation for cimon.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate invariants like execution-map references (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path};
pub use model::{
    ActionConfig, ConfigFile, ExecutionMap, GithubSection, HealthSection, PollSection,
    SourceConfig, StateSection,
};
pub use validate::validate_config;
