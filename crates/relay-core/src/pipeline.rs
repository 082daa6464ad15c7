//! Staged pipelines.
//!
//! A pipeline is an ordered list of stages. Each stage triggers its jobs and,
//! unless `wait: false`, awaits them before the next stage starts. The first
//! failing stage stops the pipeline.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::client::AutomationClient;
use crate::error::{RelayError, Result};
use crate::job::JobName;
use crate::orchestrator::{AwaitOutcome, Orchestrator, Sleeper};

fn default_wait() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    3600
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Stage {
    pub name: String,
    pub jobs: Vec<JobName>,
    /// `false` dispatches and moves on without waiting.
    #[serde(default = "default_wait")]
    pub wait: bool,
    /// Overrides the pipeline-wide timeout for this stage.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Pipeline {
    /// Git ref for every dispatch; the configured default when absent.
    #[serde(default, rename = "ref")]
    pub git_ref: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    pub stages: Vec<Stage>,
}

impl Pipeline {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let pipeline: Pipeline = serde_yaml::from_str(raw)?;
        pipeline.validate()?;
        Ok(pipeline)
    }

    pub fn validate(&self) -> Result<()> {
        if self.stages.is_empty() {
            return Err(RelayError::Config("pipeline has no stages".into()));
        }
        let mut seen = HashSet::new();
        for stage in &self.stages {
            if stage.name.trim().is_empty() {
                return Err(RelayError::Config("stage name is empty".into()));
            }
            if !seen.insert(stage.name.as_str()) {
                return Err(RelayError::Config(format!(
                    "duplicate stage name '{}'",
                    stage.name
                )));
            }
            if stage.jobs.is_empty() {
                return Err(RelayError::Config(format!(
                    "stage '{}' has no jobs",
                    stage.name
                )));
            }
            if stage.wait && stage.timeout_secs == Some(0) {
                return Err(RelayError::Config(format!(
                    "stage '{}' waits with a zero timeout",
                    stage.name
                )));
            }
        }
        if self.timeout_secs == 0 && self.stages.iter().any(|s| s.wait && s.timeout_secs.is_none()) {
            return Err(RelayError::Config(
                "pipeline timeout_secs must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Stages to run, in pipeline order. An empty `only` selects all.
    pub fn select(&self, only: &[String]) -> Result<Vec<&Stage>> {
        if let Some(unknown) = only
            .iter()
            .find(|name| !self.stages.iter().any(|s| &s.name == *name))
        {
            return Err(RelayError::Config(format!("unknown stage '{unknown}'")));
        }
        Ok(self
            .stages
            .iter()
            .filter(|s| only.is_empty() || only.contains(&s.name))
            .collect())
    }

    fn stage_timeout(&self, stage: &Stage) -> Duration {
        Duration::from_secs(stage.timeout_secs.unwrap_or(self.timeout_secs))
    }
}

/// What happened to one stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum StageResult {
    /// Dispatched without waiting.
    Dispatched { count: usize },
    Awaited { outcome: AwaitOutcome },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageReport {
    pub stage: String,
    #[serde(flatten)]
    pub result: StageResult,
}

impl StageReport {
    fn is_success(&self) -> bool {
        match &self.result {
            StageResult::Dispatched { .. } => true,
            StageResult::Awaited { outcome } => outcome.is_success(),
        }
    }
}

/// Stages that ran, in order. Ends at the first unsuccessful stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineReport {
    pub stages: Vec<StageReport>,
}

impl PipelineReport {
    pub fn is_success(&self) -> bool {
        self.stages.iter().all(StageReport::is_success)
    }

    /// The outcome of the stage that stopped the pipeline, if any.
    pub fn failure(&self) -> Option<(&str, &AwaitOutcome)> {
        self.stages.iter().find_map(|s| match &s.result {
            StageResult::Awaited { outcome } if !outcome.is_success() => {
                Some((s.stage.as_str(), outcome))
            }
            _ => None,
        })
    }
}

/// Run the selected stages in order.
///
/// Dispatch errors are returned as `Err`; an awaited stage that fails or
/// times out is recorded in the report and ends the run.
pub async fn run_pipeline<C, S>(
    orchestrator: &Orchestrator<C, S>,
    pipeline: &Pipeline,
    only: &[String],
) -> Result<PipelineReport>
where
    C: AutomationClient,
    S: Sleeper,
{
    let stages = pipeline.select(only)?;
    let git_ref = pipeline
        .git_ref
        .as_deref()
        .unwrap_or(orchestrator.default_ref());

    let mut report = PipelineReport { stages: Vec::new() };
    for stage in stages {
        tracing::info!(stage = %stage.name, jobs = stage.jobs.len(), "stage starting");

        let result = if stage.wait {
            let outcome = orchestrator
                .run(&stage.jobs, git_ref, pipeline.stage_timeout(stage))
                .await?;
            StageResult::Awaited { outcome }
        } else {
            let count = orchestrator.trigger_on(&stage.jobs, git_ref).await?;
            StageResult::Dispatched { count }
        };

        let stage_report = StageReport {
            stage: stage.name.clone(),
            result,
        };
        let ok = stage_report.is_success();
        report.stages.push(stage_report);
        if !ok {
            tracing::warn!(stage = %stage.name, "stage did not succeed; stopping pipeline");
            break;
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RelayConfig, Repository};
    use crate::orchestrator::testing::{FakeClient, RecordingSleeper, Step};

    const SAMPLE: &str = r#"
ref: release
timeout_secs: 600
stages:
  - name: ingest
    jobs: [ingest-encounters.yml, ingest-finance.yml]
  - name: transform
    jobs: [transform-clean.yml]
    timeout_secs: 120
  - name: datamart
    jobs: [prh-dash/ingest.yml]
    wait: false
"#;

    fn orchestrator(client: FakeClient) -> Orchestrator<FakeClient, RecordingSleeper> {
        let config = RelayConfig::new(
            Repository::new("pullmanregional", "prh-warehouse"),
            Some("token".into()),
        );
        Orchestrator::with_sleeper(client, RecordingSleeper::default(), &config)
    }

    #[test]
    fn parses_stages_with_defaults() {
        let pipeline = Pipeline::parse(SAMPLE).unwrap();
        assert_eq!(pipeline.git_ref.as_deref(), Some("release"));
        assert_eq!(pipeline.stages.len(), 3);
        assert!(pipeline.stages[0].wait);
        assert!(!pipeline.stages[2].wait);
        assert_eq!(
            pipeline.stage_timeout(&pipeline.stages[0]),
            Duration::from_secs(600)
        );
        assert_eq!(
            pipeline.stage_timeout(&pipeline.stages[1]),
            Duration::from_secs(120)
        );
        assert_eq!(
            pipeline.stages[2].jobs[0].parts(),
            (Some("prh-dash"), "ingest.yml")
        );
    }

    #[test]
    fn rejects_invalid_pipelines() {
        let cases = [
            "stages: []",
            "stages:\n  - name: a\n    jobs: []",
            "stages:\n  - name: a\n    jobs: [x]\n  - name: a\n    jobs: [y]",
            "stages:\n  - name: ''\n    jobs: [x]",
            "timeout_secs: 0\nstages:\n  - name: a\n    jobs: [x]",
            "stages:\n  - name: a\n    jobs: [x]\n    timeout_secs: 0",
        ];
        for raw in cases {
            assert!(
                matches!(Pipeline::parse(raw), Err(RelayError::Config(_))),
                "{raw:?} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_unknown_fields_and_bad_job_names() {
        assert!(matches!(
            Pipeline::parse("stages:\n  - name: a\n    jobs: [x]\n    retries: 3"),
            Err(RelayError::Yaml(_))
        ));
        assert!(matches!(
            Pipeline::parse("stages:\n  - name: a\n    jobs: [\"/x\"]"),
            Err(RelayError::Yaml(_))
        ));
    }

    #[test]
    fn select_keeps_pipeline_order_and_rejects_unknown_stages() {
        let pipeline = Pipeline::parse(SAMPLE).unwrap();
        let picked = pipeline
            .select(&["datamart".to_string(), "ingest".to_string()])
            .unwrap();
        let names: Vec<_> = picked.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["ingest", "datamart"]);

        assert_eq!(pipeline.select(&[]).unwrap().len(), 3);
        assert!(matches!(
            pipeline.select(&["stage9".to_string()]),
            Err(RelayError::Config(msg)) if msg.contains("stage9")
        ));
    }

    #[test]
    fn load_reads_pipeline_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("pipeline.yaml");
        std::fs::write(&path, SAMPLE).unwrap();
        assert_eq!(Pipeline::load(&path).unwrap().stages.len(), 3);

        assert!(matches!(
            Pipeline::load(&dir.path().join("missing.yaml")),
            Err(RelayError::Io(_))
        ));
    }

    #[tokio::test]
    async fn runs_every_stage_in_order() {
        let client = FakeClient::new()
            .script("ingest-encounters.yml", &[Step::Success])
            .script("ingest-finance.yml", &[Step::Running, Step::Success])
            .script("transform-clean.yml", &[Step::Success]);
        let orch = orchestrator(client);
        let pipeline = Pipeline::parse(SAMPLE).unwrap();

        let report = run_pipeline(&orch, &pipeline, &[]).await.unwrap();

        assert!(report.is_success());
        assert_eq!(report.stages.len(), 3);
        assert_eq!(
            report.stages[2].result,
            StageResult::Dispatched { count: 1 }
        );
        assert_eq!(
            orch.client().dispatched_workflows(),
            vec![
                "ingest-encounters.yml",
                "ingest-finance.yml",
                "transform-clean.yml",
                "ingest.yml"
            ]
        );
        // Fire-and-continue stages are never polled.
        assert_eq!(orch.client().query_count("ingest.yml"), 0);
    }

    #[tokio::test]
    async fn failed_stage_stops_the_pipeline() {
        let client = FakeClient::new()
            .script("ingest-encounters.yml", &[Step::Success])
            .script("ingest-finance.yml", &[Step::Failure]);
        let orch = orchestrator(client);
        let pipeline = Pipeline::parse(SAMPLE).unwrap();

        let report = run_pipeline(&orch, &pipeline, &[]).await.unwrap();

        assert!(!report.is_success());
        assert_eq!(report.stages.len(), 1);
        let (stage, outcome) = report.failure().unwrap();
        assert_eq!(stage, "ingest");
        assert!(matches!(outcome, AwaitOutcome::Failed(r) if r.job.as_str() == "ingest-finance.yml"));
        assert_eq!(orch.client().dispatched_workflows().len(), 2);
    }

    #[tokio::test]
    async fn dispatch_error_aborts_with_error() {
        let client = FakeClient::new()
            .script("ingest-encounters.yml", &[Step::Success])
            .script("ingest-finance.yml", &[Step::Success])
            .fail_dispatch("transform-clean.yml");
        let orch = orchestrator(client);
        let pipeline = Pipeline::parse(SAMPLE).unwrap();

        let err = run_pipeline(&orch, &pipeline, &[]).await.unwrap_err();
        assert!(matches!(err, RelayError::DispatchFailed { ref job, .. } if job == "transform-clean.yml"));
    }

    #[tokio::test]
    async fn only_runs_selected_stages() {
        let orch = orchestrator(FakeClient::new());
        let pipeline = Pipeline::parse(SAMPLE).unwrap();

        let report = run_pipeline(&orch, &pipeline, &["datamart".to_string()])
            .await
            .unwrap();
        assert_eq!(report.stages.len(), 1);
        assert_eq!(orch.client().dispatched_workflows(), vec!["ingest.yml"]);
    }
}
