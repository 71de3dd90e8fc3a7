// src/source/mod.rs

//! Source client boundary.
//!
//! A source is one monitored origin of workflow runs (for GitHub: a
//! repository). The engine only ever talks to a source through the
//! [`SourceClient`] trait, which keeps the polling/dispatch core testable
//! with an in-memory fake. The real implementation lives in [`github`].

pub mod github;

use std::collections::BTreeMap;

use thiserror::Error;

use crate::config::SourceConfig;

pub use github::GithubClient;

/// Per-workflow checkpoints for one source: workflow name -> highest run
/// number already dispatched. Passed to the client so it can skip runs the
/// engine would discard anyway.
pub type WorkflowCheckpoints = BTreeMap<String, u64>;

/// Completion status of a run as reported by the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunConclusion {
    Success,
    Failure,
    Other,
}

/// One completed workflow run reported by a source client.
///
/// Ephemeral: never persisted beyond the checkpoint it advances.
#[derive(Debug, Clone)]
pub struct Run {
    /// Workflow name (e.g. "build").
    pub workflow: String,
    /// Numeric workflow id on the source side.
    pub workflow_id: u64,
    /// Run number, monotonic per workflow. This is what checkpoints track.
    pub number: u64,
    /// Source-side run id (distinct from the number).
    pub id: u64,
    pub branch: String,
    pub sha: String,
    pub message: String,
    pub author: String,
    pub conclusion: RunConclusion,
    /// Completion timestamp as reported by the source.
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Failures from a source client. All variants are transient from the
/// engine's point of view: the check is logged, skipped for this cycle, and
/// retried on the next tick. No variant ever advances a checkpoint.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("API returned status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("unexpected API payload: {0}")]
    Decode(String),
}

/// Capability: list completed runs for `source` newer than the given
/// checkpoints, in no particular order (the engine sorts). Implementations
/// must never return a partially-populated result: on any failure the whole
/// call fails with a [`SourceError`].
pub trait SourceClient: Send + Sync {
    fn list_new_runs(
        &self,
        source: &str,
        filters: &SourceConfig,
        since: &WorkflowCheckpoints,
    ) -> impl Future<Output = Result<Vec<Run>, SourceError>> + Send;
}
