use clap::Args;
use serde::Serialize;

use super::{ConnectionArgs, JobArgs};

#[derive(Debug, Args)]
pub struct TriggerArgs {
    #[command(flatten)]
    pub jobs: JobArgs,
}

#[derive(Serialize)]
struct TriggerSummary<'a> {
    dispatched: usize,
    #[serde(rename = "ref")]
    git_ref: &'a str,
    jobs: &'a [String],
}

/// Dispatch every job, stopping at the first dispatch error.
pub async fn run(conn: &ConnectionArgs, args: TriggerArgs, json: bool) -> anyhow::Result<()> {
    let names = args.jobs.names()?;
    let orchestrator = conn.orchestrator()?;

    let dispatched = orchestrator.trigger(&names).await?;

    if json {
        crate::output::print_json(&TriggerSummary {
            dispatched,
            git_ref: orchestrator.default_ref(),
            jobs: &args.jobs.jobs,
        })?;
    } else {
        for name in &names {
            println!("  dispatched  {name}");
        }
        println!(
            "dispatched {dispatched} job(s) on '{}'",
            orchestrator.default_ref()
        );
    }
    Ok(())
}
