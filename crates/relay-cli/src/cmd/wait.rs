use std::time::Duration;

use clap::Args;

use super::{ConnectionArgs, JobArgs};

#[derive(Debug, Args)]
pub struct AwaitArgs {
    #[command(flatten)]
    pub jobs: JobArgs,

    /// Give up after this many seconds
    #[arg(long, env = "RELAY_TIMEOUT_SECS", default_value_t = 3600)]
    pub timeout: u64,
}

/// Poll the most recent run of each job until all succeed, one fails, or the
/// timeout passes.
pub async fn run(conn: &ConnectionArgs, args: AwaitArgs, json: bool) -> anyhow::Result<()> {
    let names = args.jobs.names()?;
    let orchestrator = conn.orchestrator()?;

    let outcome = orchestrator
        .await_completion(&names, Duration::from_secs(args.timeout))
        .await?;

    super::finish(outcome, json)
}
