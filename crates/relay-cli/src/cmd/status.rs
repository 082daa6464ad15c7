use clap::Args;
use relay_core::status::{classify, Baseline, RunStatus};
use relay_core::RunSummary;
use serde::Serialize;

use super::{ConnectionArgs, JobArgs};
use crate::output::print_table;

#[derive(Debug, Args)]
pub struct StatusArgs {
    #[command(flatten)]
    pub jobs: JobArgs,
}

#[derive(Serialize)]
struct JobStatus {
    job: String,
    status: RunStatus,
    run: Option<RunSummary>,
}

/// Show the most recent run of each job. Queries once; never waits.
pub async fn run(conn: &ConnectionArgs, args: StatusArgs, json: bool) -> anyhow::Result<()> {
    let names = args.jobs.names()?;
    let orchestrator = conn.orchestrator()?;

    let mut rows = Vec::with_capacity(names.len());
    for name in &names {
        let run = orchestrator.latest(name).await?;
        let status = classify(run.as_slice(), Baseline::Any);
        rows.push(JobStatus {
            job: name.to_string(),
            status,
            run,
        });
    }

    if json {
        return crate::output::print_json(&rows);
    }

    print_table(
        &["JOB", "STATE", "RUN", "CREATED", "URL"],
        &rows.iter().map(table_row).collect::<Vec<_>>(),
    );
    Ok(())
}

fn table_row(row: &JobStatus) -> Vec<String> {
    let state = match &row.status {
        RunStatus::Pending => match &row.run {
            Some(run) => run.status.to_string(),
            None => "no runs".to_string(),
        },
        RunStatus::Success => "success".to_string(),
        RunStatus::Failed { conclusion, .. } => conclusion.to_string(),
        RunStatus::Unknown => "unknown".to_string(),
    };
    let (id, created, url) = match &row.run {
        Some(run) => (
            run.id.to_string(),
            run.created_at
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_default(),
            run.html_url.clone().unwrap_or_default(),
        ),
        None => Default::default(),
    };
    vec![row.job.clone(), state, id, created, url]
}
