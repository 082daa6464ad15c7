pub mod pipeline;
pub mod run;
pub mod status;
pub mod trigger;
pub mod wait;

use std::time::Duration;

use anyhow::Context;
use clap::Args;
use relay_core::config::DEFAULT_API_URL;
use relay_core::{
    AwaitOutcome, GithubClient, JobName, Orchestrator, RelayConfig, RelayError, Repository,
};

// ---------------------------------------------------------------------------
// Connection settings shared by every subcommand
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Args)]
pub struct ConnectionArgs {
    /// Default repository for unqualified job names (owner/name)
    #[arg(long, global = true, env = "GITHUB_REPOSITORY")]
    pub repository: Option<String>,

    /// API token used as the bearer credential
    #[arg(long, global = true, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// API base URL
    #[arg(long, global = true, env = "GITHUB_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Branch or tag that dispatched runs execute against
    #[arg(long = "ref", global = true, env = "RELAY_REF", default_value = "main")]
    pub git_ref: String,

    /// Seconds between status polls. 15 is the supported value against
    /// GitHub; shorter intervals are meant for local test servers.
    #[arg(long, global = true, env = "RELAY_POLL_INTERVAL_SECS", default_value_t = 15)]
    pub interval: u64,

    /// Per-request timeout in seconds
    #[arg(long, global = true, env = "RELAY_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout: u64,
}

impl ConnectionArgs {
    /// Build and validate the configuration. Fails before any network call.
    pub fn config(&self) -> Result<RelayConfig, RelayError> {
        let repository: Repository = self
            .repository
            .as_deref()
            .filter(|r| !r.trim().is_empty())
            .ok_or_else(|| {
                RelayError::Config(
                    "no repository configured: set GITHUB_REPOSITORY or pass --repository".into(),
                )
            })?
            .parse()?;

        let mut config = RelayConfig::new(repository, self.token.clone());
        config.api_url = self.api_url.clone();
        config.default_ref = self.git_ref.clone();
        config.poll_interval = Duration::from_secs(self.interval);
        config.request_timeout = Duration::from_secs(self.request_timeout);
        config.validate()?;
        Ok(config)
    }

    pub fn orchestrator(&self) -> anyhow::Result<Orchestrator<GithubClient>> {
        let config = self.config()?;
        let client = GithubClient::new(&config).context("failed to create API client")?;
        tracing::debug!(repository = %config.repository, api_url = %config.api_url, "configured");
        Ok(Orchestrator::new(client, &config))
    }
}

/// Job names given on the command line.
#[derive(Debug, Clone, Args)]
pub struct JobArgs {
    /// Workflow names: `<workflow>` or `<repo>/<workflow>`
    #[arg(required = true, num_args = 1..)]
    pub jobs: Vec<String>,
}

impl JobArgs {
    pub fn names(&self) -> anyhow::Result<Vec<JobName>> {
        Ok(relay_core::job::parse_all(&self.jobs)?)
    }
}

// ---------------------------------------------------------------------------
// Exit codes
// ---------------------------------------------------------------------------

/// Process exit code for an error that ended a command.
///
/// A failed workflow and an exhausted deadline get their own codes; every
/// other error exits 1.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<RelayError>() {
        Some(RelayError::WorkflowFailed { .. }) => 2,
        Some(RelayError::DeadlineExceeded { .. }) => 3,
        _ => 1,
    }
}

/// Print an await outcome and turn anything but success into an error.
pub fn finish(outcome: AwaitOutcome, json: bool) -> anyhow::Result<()> {
    if json {
        crate::output::print_json(&outcome)?;
    } else {
        crate::output::print_outcome(&outcome);
    }
    outcome.into_result()?;
    Ok(())
}
