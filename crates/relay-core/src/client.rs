//! Remote automation client.
//!
//! A thin, stateless request layer over the GitHub Actions REST API: dispatch
//! a workflow by name and list its most recent runs. No retry or polling
//! lives here; callers decide what a failed request means.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{header, Client, StatusCode, Url};
use serde::{Deserialize, Serialize};

use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::job::JobTarget;

const API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = concat!("relay/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// AutomationClient
// ---------------------------------------------------------------------------

/// The two provider calls the orchestrator depends on.
pub trait AutomationClient {
    /// Start a new run of `target` on `git_ref`.
    fn dispatch(&self, target: &JobTarget, git_ref: &str) -> impl Future<Output = Result<()>> + Send;

    /// Most recent runs of `target`, newest first, at most `limit` entries.
    fn list_recent_runs(
        &self,
        target: &JobTarget,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<RunSummary>>> + Send;
}

// ---------------------------------------------------------------------------
// Run types
// ---------------------------------------------------------------------------

/// Lifecycle state of a run as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunLifecycle {
    Queued,
    InProgress,
    Completed,
    Waiting,
    Requested,
    Pending,
    #[serde(other)]
    Other,
}

impl std::fmt::Display for RunLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Waiting => "waiting",
            Self::Requested => "requested",
            Self::Pending => "pending",
            Self::Other => "other",
        };
        write!(f, "{s}")
    }
}

/// Outcome of a completed run. `null` on the wire until the run completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Conclusion {
    Success,
    Failure,
    Cancelled,
    Neutral,
    Skipped,
    TimedOut,
    ActionRequired,
    Stale,
    StartupFailure,
    #[serde(other)]
    Other,
}

impl std::fmt::Display for Conclusion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Cancelled => "cancelled",
            Self::Neutral => "neutral",
            Self::Skipped => "skipped",
            Self::TimedOut => "timed_out",
            Self::ActionRequired => "action_required",
            Self::Stale => "stale",
            Self::StartupFailure => "startup_failure",
            Self::Other => "other",
        };
        write!(f, "{s}")
    }
}

/// One entry of the provider's run list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub id: u64,
    pub status: RunLifecycle,
    #[serde(default)]
    pub conclusion: Option<Conclusion>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub html_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListRunsResponse {
    #[serde(default)]
    workflow_runs: Vec<RunSummary>,
}

#[derive(Debug, Serialize)]
struct DispatchBody<'a> {
    #[serde(rename = "ref")]
    git_ref: &'a str,
}

// ---------------------------------------------------------------------------
// GithubClient
// ---------------------------------------------------------------------------

/// [`AutomationClient`] backed by the GitHub Actions REST API.
///
/// Safe to reuse for every request of a poll session; it holds no per-run
/// state.
#[derive(Debug, Clone)]
pub struct GithubClient {
    client: Client,
    base_url: Url,
    token: Option<String>,
    timeout: Duration,
}

impl GithubClient {
    pub fn new(config: &RelayConfig) -> Result<Self> {
        let base_url = Url::parse(config.api_url.trim_end_matches('/')).map_err(|e| {
            RelayError::Config(format!("invalid API URL '{}': {e}", config.api_url))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(RelayError::Config(format!(
                "invalid API URL '{}'",
                config.api_url
            )));
        }

        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| RelayError::Transport(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            token: config.token.clone().filter(|t| !t.trim().is_empty()),
            timeout: config.request_timeout,
        })
    }

    fn workflow_url(&self, target: &JobTarget, tail: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend([
                "repos",
                target.owner.as_str(),
                target.repo.as_str(),
                "actions",
                "workflows",
                target.workflow.as_str(),
                tail,
            ]);
        }
        url
    }

    fn token(&self) -> Result<&str> {
        self.token
            .as_deref()
            .ok_or_else(|| RelayError::Auth("no API token configured".into()))
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let request = request
            .bearer_auth(self.token()?)
            .header(header::ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION);

        let response = request.send().await.map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::UNAUTHORIZED {
            return Err(RelayError::Auth(format!("credential rejected: {body}")));
        }
        Err(RelayError::Http {
            status: status.as_u16(),
            body,
        })
    }

    fn transport_error(&self, e: reqwest::Error) -> RelayError {
        if e.is_timeout() {
            RelayError::Timeout(self.timeout)
        } else {
            RelayError::Transport(e.to_string())
        }
    }
}

impl AutomationClient for GithubClient {
    async fn dispatch(&self, target: &JobTarget, git_ref: &str) -> Result<()> {
        let url = self.workflow_url(target, "dispatches");
        tracing::debug!(%target, git_ref, "dispatching workflow");
        self.send(self.client.post(url).json(&DispatchBody { git_ref }))
            .await?;
        Ok(())
    }

    async fn list_recent_runs(&self, target: &JobTarget, limit: u32) -> Result<Vec<RunSummary>> {
        let mut url = self.workflow_url(target, "runs");
        url.query_pairs_mut()
            .append_pair("per_page", &limit.max(1).to_string());

        let response = self.send(self.client.get(url)).await?;
        let body = response.text().await.map_err(|e| self.transport_error(e))?;
        let parsed: ListRunsResponse =
            serde_json::from_str(&body).map_err(|e| RelayError::Decode(e.to_string()))?;
        Ok(parsed.workflow_runs)
    }
}
