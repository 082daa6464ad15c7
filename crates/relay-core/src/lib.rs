pub mod client;
pub mod config;
pub mod error;
pub mod job;
pub mod orchestrator;
pub mod pipeline;
pub mod status;

pub use client::{AutomationClient, Conclusion, GithubClient, RunLifecycle, RunSummary};
pub use config::{RelayConfig, Repository};
pub use error::{RelayError, Result};
pub use job::{JobName, JobTarget};
pub use orchestrator::{AwaitOutcome, FailureReport, Orchestrator, Sleeper, TokioSleeper};
pub use pipeline::{run_pipeline, Pipeline, PipelineReport};
pub use status::{Baseline, RunStatus};
