// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

/// Execution map: source name (or `"*"`) -> branch name (or `"*"`) -> ordered
/// action names.
pub type ExecutionMap = BTreeMap<String, BTreeMap<String, Vec<String>>>;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [poll]
/// interval_secs = 60
/// max_workers = 3
///
/// [source."owner/repo"]
/// workflows = ["build"]
/// branches = ["main"]
///
/// [action.notify]
/// command = "curl -fsS https://hooks.example/notify"
///
/// [execution."owner/repo"]
/// main = ["notify"]
/// ```
///
/// All sections except `[source.*]` are optional and have defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    /// Polling behaviour from `[poll]`.
    #[serde(default)]
    pub poll: PollSection,

    /// Source client settings from `[github]`.
    #[serde(default)]
    pub github: GithubSection,

    /// Durable checkpoint state from `[state]`.
    #[serde(default)]
    pub state: StateSection,

    /// Optional liveness marker from `[health]`.
    #[serde(default)]
    pub health: HealthSection,

    /// Monitored sources from `[source.<name>]`, keyed by source name
    /// (for GitHub: `owner/repo`).
    #[serde(default)]
    pub source: BTreeMap<String, SourceConfig>,

    /// Action definitions from `[action.<name>]`.
    #[serde(default)]
    pub action: BTreeMap<String, ActionConfig>,

    /// Execution map from `[execution.<source>]` tables.
    #[serde(default)]
    pub execution: ExecutionMap,
}

/// `[poll]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct PollSection {
    /// Seconds to sleep between the end of one poll cycle and the start of
    /// the next (fixed delay, not fixed rate).
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Check sources concurrently. With a single source this has no effect.
    #[serde(default = "default_parallel")]
    pub parallel: bool,

    /// Maximum number of source checks in flight at once.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Per-source check timeout in seconds. A check that overruns is
    /// abandoned for the cycle and retried on the next tick.
    #[serde(default = "default_source_timeout_secs")]
    pub source_timeout_secs: u64,
}

fn default_interval_secs() -> u64 {
    60
}

fn default_parallel() -> bool {
    true
}

fn default_max_workers() -> usize {
    3
}

fn default_source_timeout_secs() -> u64 {
    60
}

impl Default for PollSection {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            parallel: default_parallel(),
            max_workers: default_max_workers(),
            source_timeout_secs: default_source_timeout_secs(),
        }
    }
}

/// `[github]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct GithubSection {
    /// API base URL; override for GitHub Enterprise.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// API token. Falls back to the `GITHUB_TOKEN` environment variable
    /// when unset.
    #[serde(default)]
    pub token: Option<String>,

    /// Per-request HTTP timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Only consider runs that completed within this many seconds. Bounds
    /// how far back a fresh (or reset) state file will re-process.
    #[serde(default = "default_recent_window_secs")]
    pub recent_window_secs: u64,
}

fn default_api_base_url() -> String {
    "https://api.github.com".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_recent_window_secs() -> u64 {
    300
}

impl Default for GithubSection {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            token: None,
            request_timeout_secs: default_request_timeout_secs(),
            recent_window_secs: default_recent_window_secs(),
        }
    }
}

/// `[state]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct StateSection {
    /// Checkpoint file path. Human-inspectable TOML; deleting it forces
    /// re-processing of everything still inside the recency window.
    #[serde(default = "default_state_file")]
    pub file: PathBuf,
}

fn default_state_file() -> PathBuf {
    PathBuf::from("cimon-state.toml")
}

impl Default for StateSection {
    fn default() -> Self {
        Self {
            file: default_state_file(),
        }
    }
}

/// `[health]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthSection {
    #[serde(default)]
    pub enabled: bool,

    /// Marker file rewritten with `OK - <timestamp>` while the loop is alive.
    #[serde(default = "default_health_file")]
    pub file: PathBuf,

    #[serde(default = "default_health_interval_secs")]
    pub interval_secs: u64,
}

fn default_health_file() -> PathBuf {
    PathBuf::from("cimon-health")
}

fn default_health_interval_secs() -> u64 {
    300
}

impl Default for HealthSection {
    fn default() -> Self {
        Self {
            enabled: false,
            file: default_health_file(),
            interval_secs: default_health_interval_secs(),
        }
    }
}

/// `[source.<name>]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceConfig {
    /// Workflow filters: names, ids, or workflow file names. Empty = all.
    #[serde(default)]
    pub workflows: Vec<String>,

    /// Branch filters. Empty = all branches.
    #[serde(default)]
    pub branches: Vec<String>,
}

impl SourceConfig {
    /// Whether a run's branch passes this source's branch filters.
    pub fn matches_branch(&self, branch: &str) -> bool {
        self.branches.is_empty() || self.branches.iter().any(|b| b == branch)
    }

    /// Whether a workflow passes this source's workflow filters. The filter
    /// may name the workflow, its numeric id, or its file name
    /// (e.g. `build.yml` for `.github/workflows/build.yml`).
    pub fn matches_workflow(&self, name: &str, id: u64, path: &str) -> bool {
        if self.workflows.is_empty() {
            return true;
        }
        let file = path.rsplit('/').next().unwrap_or(path);
        self.workflows
            .iter()
            .any(|w| w == name || w == file || *w == id.to_string())
    }
}

/// `[action.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ActionConfig {
    /// Shell command to execute. Run context is supplied as environment
    /// variables (`SOURCE_NAME`, `RUN_NUMBER`, ...), not textual splicing.
    pub command: String,

    /// Working directory; the process's own cwd when unset.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    /// Explicit timeout. When unset, a heuristic based on the command text
    /// applies (see `exec::resolve_timeout`).
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Free-form description used in logs.
    #[serde(default)]
    pub description: Option<String>,
}
