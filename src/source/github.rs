// src/source/github.rs

//! GitHub Actions implementation of the source client boundary.
//!
//! Lists recent completed workflow runs for a repository via the REST API
//! (`GET /repos/{owner}/{repo}/actions/runs?status=completed`) and narrows
//! them down to what the engine cares about: runs matching the source's
//! workflow/branch filters, completed within the recency window, with a run
//! number above the per-workflow checkpoint.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::{GithubSection, SourceConfig};
use crate::source::{Run, RunConclusion, SourceClient, SourceError, WorkflowCheckpoints};

const PER_PAGE: u32 = 100;

/// HTTP client for the GitHub Actions API.
pub struct GithubClient {
    http: reqwest::Client,
    base_url: String,
    recent_window: Duration,
}

impl GithubClient {
    /// Build a client from the `[github]` config section.
    ///
    /// The token comes from the config or, failing that, the `GITHUB_TOKEN`
    /// environment variable. A missing token is a startup error: every
    /// Actions API call would fail with 401 anyway.
    pub fn from_config(cfg: &GithubSection) -> anyhow::Result<Self> {
        let token = cfg
            .token
            .clone()
            .or_else(|| std::env::var("GITHUB_TOKEN").ok())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "no GitHub token: set [github].token or the GITHUB_TOKEN environment variable"
                )
            })?;

        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| anyhow::anyhow!("GitHub token contains invalid header characters"))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static("cimon"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: cfg.api_base_url.trim_end_matches('/').to_string(),
            recent_window: Duration::from_secs(cfg.recent_window_secs),
        })
    }

    async fn fetch_completed_runs(&self, repo: &str) -> Result<Vec<ApiRun>, SourceError> {
        let url = format!("{}/repos/{}/actions/runs", self.base_url, repo);
        let response = self
            .http
            .get(&url)
            .query(&[
                ("status", "completed".to_string()),
                ("per_page", PER_PAGE.to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SourceError::Api {
                status: status.as_u16(),
                message: truncate(&message, 200),
            });
        }

        let body = response.text().await?;
        let page = decode_runs_page(&body)?;
        Ok(page.workflow_runs)
    }
}

fn decode_runs_page(body: &str) -> Result<RunsPage, SourceError> {
    serde_json::from_str(body).map_err(|e| SourceError::Decode(e.to_string()))
}

impl SourceClient for GithubClient {
    async fn list_new_runs(
        &self,
        source: &str,
        filters: &SourceConfig,
        since: &WorkflowCheckpoints,
    ) -> Result<Vec<Run>, SourceError> {
        let api_runs = self.fetch_completed_runs(source).await?;
        let cutoff = Utc::now() - self.recent_window;

        let mut runs = Vec::new();
        for api_run in api_runs {
            let Some(run) = api_run.into_run() else {
                continue;
            };

            if !filters.matches_workflow(&run.workflow, run.workflow_id, &run.workflow_path) {
                continue;
            }
            if !filters.matches_branch(&run.branch) {
                continue;
            }
            if let Some(completed_at) = run.completed_at
                && completed_at < cutoff
            {
                debug!(
                    source,
                    workflow = %run.workflow,
                    number = run.number,
                    "skipping run outside the recency window"
                );
                continue;
            }
            if let Some(&checkpoint) = since.get(&run.workflow)
                && run.number <= checkpoint
            {
                continue;
            }

            runs.push(run.into_inner());
        }

        debug!(source, count = runs.len(), "listed new completed runs");
        Ok(runs)
    }
}

/// One page of `GET /repos/{owner}/{repo}/actions/runs`.
#[derive(Debug, Deserialize)]
struct RunsPage {
    #[serde(default)]
    workflow_runs: Vec<ApiRun>,
}

#[derive(Debug, Deserialize)]
struct ApiRun {
    id: u64,
    run_number: u64,
    workflow_id: u64,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    head_branch: Option<String>,
    #[serde(default)]
    head_sha: Option<String>,
    #[serde(default)]
    display_title: Option<String>,
    #[serde(default)]
    conclusion: Option<String>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    actor: Option<ApiActor>,
    #[serde(default)]
    head_commit: Option<ApiCommit>,
}

#[derive(Debug, Deserialize)]
struct ApiActor {
    login: String,
}

#[derive(Debug, Deserialize)]
struct ApiCommit {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    author: Option<ApiCommitAuthor>,
}

#[derive(Debug, Deserialize)]
struct ApiCommitAuthor {
    #[serde(default)]
    name: Option<String>,
}

/// A [`Run`] plus the workflow file path, which only matters for filtering.
struct FilterableRun {
    run: Run,
    workflow_path: String,
}

impl std::ops::Deref for FilterableRun {
    type Target = Run;

    fn deref(&self) -> &Run {
        &self.run
    }
}

impl FilterableRun {
    fn into_inner(self) -> Run {
        self.run
    }
}

impl ApiRun {
    fn into_run(self) -> Option<FilterableRun> {
        let workflow = match self.name {
            Some(name) if !name.is_empty() => name,
            _ => {
                warn!(run_id = self.id, "run payload missing workflow name; skipping");
                return None;
            }
        };

        let conclusion = match self.conclusion.as_deref() {
            Some("success") => RunConclusion::Success,
            Some("failure") => RunConclusion::Failure,
            _ => RunConclusion::Other,
        };

        let author = self
            .actor
            .map(|a| a.login)
            .or_else(|| {
                self.head_commit
                    .as_ref()
                    .and_then(|c| c.author.as_ref())
                    .and_then(|a| a.name.clone())
            })
            .unwrap_or_default();

        let message = self
            .display_title
            .or_else(|| self.head_commit.and_then(|c| c.message))
            .unwrap_or_default();

        Some(FilterableRun {
            run: Run {
                workflow,
                workflow_id: self.workflow_id,
                number: self.run_number,
                id: self.id,
                branch: self.head_branch.unwrap_or_default(),
                sha: self.head_sha.unwrap_or_default(),
                message,
                author,
                conclusion,
                completed_at: self.updated_at,
            },
            workflow_path: self.path.unwrap_or_default(),
        })
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}
