use std::time::Duration;

use clap::Args;

use super::{ConnectionArgs, JobArgs};

#[derive(Debug, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub jobs: JobArgs,

    /// Give up after this many seconds
    #[arg(long, env = "RELAY_TIMEOUT_SECS", default_value_t = 3600)]
    pub timeout: u64,
}

/// Trigger, then wait, in one process. Runs that existed before the dispatch
/// are ignored.
pub async fn run(conn: &ConnectionArgs, args: RunArgs, json: bool) -> anyhow::Result<()> {
    let names = args.jobs.names()?;
    let orchestrator = conn.orchestrator()?;

    let outcome = orchestrator
        .run(
            &names,
            orchestrator.default_ref(),
            Duration::from_secs(args.timeout),
        )
        .await?;

    super::finish(outcome, json)
}
