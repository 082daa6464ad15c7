use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use relay_core::{run_pipeline, Pipeline};

use super::ConnectionArgs;

#[derive(Debug, Args)]
pub struct PipelineArgs {
    /// Pipeline definition (YAML)
    pub file: PathBuf,

    /// Run only these stages (repeatable); pipeline order is kept
    #[arg(long = "only", value_delimiter = ',')]
    pub only: Vec<String>,
}

/// Run each stage of a pipeline file in order, stopping at the first failure.
pub async fn run(conn: &ConnectionArgs, args: PipelineArgs, json: bool) -> anyhow::Result<()> {
    let pipeline = Pipeline::load(&args.file)
        .with_context(|| format!("failed to load pipeline '{}'", args.file.display()))?;
    // Reject unknown stage names before touching the network.
    pipeline.select(&args.only)?;
    let orchestrator = conn.orchestrator()?;

    let report = run_pipeline(&orchestrator, &pipeline, &args.only).await?;

    if json {
        crate::output::print_json(&report)?;
    } else {
        crate::output::print_pipeline(&report);
    }

    if let Some((stage, outcome)) = report.failure() {
        outcome
            .clone()
            .into_result()
            .with_context(|| format!("stage '{stage}' did not succeed"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: PipelineArgs,
    }

    #[test]
    fn only_accepts_repeated_and_comma_separated_stages() {
        let cli = TestCli::parse_from([
            "test",
            "pipeline.yaml",
            "--only",
            "ingest,transform",
            "--only",
            "datamart",
        ]);
        assert_eq!(cli.args.file, PathBuf::from("pipeline.yaml"));
        assert_eq!(cli.args.only, vec!["ingest", "transform", "datamart"]);
    }
}
