//! Trigger-and-await orchestration.
//!
//! `trigger` dispatches a batch of jobs, stopping at the first failure.
//! `await_completion` polls the most recent run of each job on a fixed
//! interval until every job succeeds, one fails, or the deadline passes.
//!
//! ```text
//!            ┌──────── sleep(interval) ◄─────────┐
//!            ▼                                   │
//!   Pending ──► classify each remaining job ──► still pending, attempts left
//!      │                │           │
//!      │                ▼           ▼
//!      │            Failed       all Success
//!      ▼
//!   attempts exhausted → DeadlineExceeded
//! ```
//!
//! The provider's dispatch call returns no run id, so a job's state is read
//! from its most recent run. When dispatch and polling share a process,
//! [`Orchestrator::run`] reads each job's latest run id first and only counts
//! runs with a larger id. A run started by someone else between that read and
//! the first poll is still indistinguishable from ours.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;

use crate::client::{AutomationClient, Conclusion, RunSummary};
use crate::config::{RelayConfig, Repository};
use crate::error::{RelayError, Result};
use crate::job::{JobName, JobTarget};
use crate::status::{classify, Baseline, RunStatus};

// ---------------------------------------------------------------------------
// Sleeper
// ---------------------------------------------------------------------------

/// The single suspension point of a poll session.
pub trait Sleeper {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Why a session stopped on a failed job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureReport {
    pub job: JobName,
    pub conclusion: Conclusion,
    pub url: Option<String>,
    /// 1-indexed tick on which the failure was observed.
    pub tick: u32,
    /// Jobs that had already succeeded, including earlier jobs in the same tick.
    pub resolved: Vec<JobName>,
}

/// The one terminal result of an `await_completion` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AwaitOutcome {
    Completed {
        ticks: u32,
        jobs: Vec<JobName>,
    },
    Failed(FailureReport),
    DeadlineExceeded {
        ticks: u32,
        pending: Vec<JobName>,
        resolved: Vec<JobName>,
    },
}

impl AwaitOutcome {
    pub fn ticks(&self) -> u32 {
        match self {
            AwaitOutcome::Completed { ticks, .. } | AwaitOutcome::DeadlineExceeded { ticks, .. } => {
                *ticks
            }
            AwaitOutcome::Failed(report) => report.tick,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AwaitOutcome::Completed { .. })
    }

    /// Collapse into an error for callers that only care about success.
    pub fn into_result(self) -> Result<Vec<JobName>> {
        match self {
            AwaitOutcome::Completed { jobs, .. } => Ok(jobs),
            AwaitOutcome::Failed(report) => Err(RelayError::WorkflowFailed {
                job: report.job.to_string(),
                conclusion: report.conclusion.to_string(),
                url: report.url,
            }),
            AwaitOutcome::DeadlineExceeded { pending, .. } => Err(RelayError::DeadlineExceeded {
                pending: pending.into_iter().map(String::from).collect(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// PollSession
// ---------------------------------------------------------------------------

/// Per-call poll state. Lives for one `await_completion` and is then dropped.
#[derive(Debug)]
struct PollSession {
    remaining: Vec<JobName>,
    resolved: Vec<JobName>,
    attempt: u32,
    max_attempts: u32,
}

impl PollSession {
    /// Names resolving to the same workflow are polled once, under the first
    /// spelling given.
    fn new(
        names: &[JobName],
        repository: &Repository,
        timeout: Duration,
        interval: Duration,
    ) -> Self {
        let mut seen = HashSet::new();
        let remaining = names
            .iter()
            .filter(|n| seen.insert(n.resolve(repository)))
            .cloned()
            .collect();
        Self {
            remaining,
            resolved: Vec::new(),
            attempt: 0,
            max_attempts: max_attempts(timeout, interval),
        }
    }

    fn has_budget(&self) -> bool {
        self.attempt < self.max_attempts && !self.remaining.is_empty()
    }
}

/// `ceil(timeout / interval)`, saturating at `u32::MAX`.
fn max_attempts(timeout: Duration, interval: Duration) -> u32 {
    let ticks = timeout.as_millis().div_ceil(interval.as_millis().max(1));
    u32::try_from(ticks).unwrap_or(u32::MAX)
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator<C, S = TokioSleeper> {
    client: C,
    sleeper: S,
    repository: Repository,
    default_ref: String,
    poll_interval: Duration,
}

impl<C: AutomationClient> Orchestrator<C> {
    pub fn new(client: C, config: &RelayConfig) -> Self {
        Self::with_sleeper(client, TokioSleeper, config)
    }
}

impl<C: AutomationClient, S: Sleeper> Orchestrator<C, S> {
    pub fn with_sleeper(client: C, sleeper: S, config: &RelayConfig) -> Self {
        Self {
            client,
            sleeper,
            repository: config.repository.clone(),
            default_ref: config.default_ref.clone(),
            poll_interval: config.poll_interval,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn default_ref(&self) -> &str {
        &self.default_ref
    }

    /// Dispatch every job on the default ref. See [`Self::trigger_on`].
    pub async fn trigger(&self, names: &[JobName]) -> Result<usize> {
        self.trigger_on(names, &self.default_ref).await
    }

    /// Dispatch every job in order, aborting on the first failure.
    ///
    /// Jobs after a failed dispatch are never dispatched. Returns how many
    /// jobs were dispatched.
    pub async fn trigger_on(&self, names: &[JobName], git_ref: &str) -> Result<usize> {
        if names.is_empty() {
            return Err(RelayError::InvalidArgument(
                "at least one job name is required".into(),
            ));
        }

        let mut dispatched = 0;
        for name in names {
            let target = name.resolve(&self.repository);
            self.client
                .dispatch(&target, git_ref)
                .await
                .map_err(|e| RelayError::DispatchFailed {
                    job: name.to_string(),
                    source: Box::new(e),
                })?;
            tracing::info!(job = %name, %target, git_ref, "dispatched");
            dispatched += 1;
        }
        Ok(dispatched)
    }

    /// Poll until every job succeeds, one fails, or `timeout` is spent.
    ///
    /// Query errors that [`RelayError::is_transient`] accepts count as pending
    /// for that tick; any other error ends the session.
    pub async fn await_completion(
        &self,
        names: &[JobName],
        timeout: Duration,
    ) -> Result<AwaitOutcome> {
        check_await_args(names, timeout)?;
        self.poll_until(names, timeout, &HashMap::new()).await
    }

    /// Dispatch, then wait, in one process.
    ///
    /// Each job's latest run is read before dispatching, so a run that
    /// already existed cannot satisfy the wait.
    pub async fn run(
        &self,
        names: &[JobName],
        git_ref: &str,
        timeout: Duration,
    ) -> Result<AwaitOutcome> {
        check_await_args(names, timeout)?;
        let baselines = self.baselines(names).await?;
        self.trigger_on(names, git_ref).await?;
        self.poll_until(names, timeout, &baselines).await
    }

    /// The most recent run of one job, without polling.
    pub async fn latest(&self, name: &JobName) -> Result<Option<RunSummary>> {
        let target = name.resolve(&self.repository);
        let runs = self.client.list_recent_runs(&target, 1).await?;
        Ok(runs.into_iter().next())
    }

    /// What each job's newest run looks like before we dispatch.
    ///
    /// Falls back to a dispatch-time bound when the lookup fails transiently.
    async fn baselines(&self, names: &[JobName]) -> Result<HashMap<JobTarget, Baseline>> {
        let mut baselines = HashMap::new();
        for name in names {
            let target = name.resolve(&self.repository);
            if baselines.contains_key(&target) {
                continue;
            }
            let baseline = match self.client.list_recent_runs(&target, 1).await {
                Ok(runs) => Baseline::from_latest(runs.first()),
                Err(e) if e.is_transient() => {
                    tracing::warn!(
                        job = %name,
                        error = %e,
                        "latest run unavailable; bounding by time"
                    );
                    Baseline::since(Utc::now())
                }
                Err(e) => return Err(e),
            };
            tracing::debug!(job = %name, ?baseline, "baseline recorded");
            baselines.insert(target, baseline);
        }
        Ok(baselines)
    }

    async fn poll_until(
        &self,
        names: &[JobName],
        timeout: Duration,
        baselines: &HashMap<JobTarget, Baseline>,
    ) -> Result<AwaitOutcome> {
        let mut session = PollSession::new(names, &self.repository, timeout, self.poll_interval);
        tracing::debug!(
            jobs = session.remaining.len(),
            max_attempts = session.max_attempts,
            interval_secs = self.poll_interval.as_secs(),
            "poll session started"
        );

        while session.has_budget() {
            self.sleeper.sleep(self.poll_interval).await;
            let tick = session.attempt + 1;

            let mut still_pending = Vec::with_capacity(session.remaining.len());
            for name in std::mem::take(&mut session.remaining) {
                match self.poll_one(&name, baselines).await? {
                    RunStatus::Success => {
                        tracing::info!(job = %name, tick, "succeeded");
                        session.resolved.push(name);
                    }
                    RunStatus::Failed { conclusion, url } => {
                        tracing::warn!(job = %name, tick, %conclusion, "failed");
                        return Ok(AwaitOutcome::Failed(FailureReport {
                            job: name,
                            conclusion,
                            url,
                            tick,
                            resolved: session.resolved,
                        }));
                    }
                    RunStatus::Pending | RunStatus::Unknown => still_pending.push(name),
                }
            }
            session.remaining = still_pending;

            if session.remaining.is_empty() {
                return Ok(AwaitOutcome::Completed {
                    ticks: tick,
                    jobs: session.resolved,
                });
            }

            tracing::info!(
                tick,
                of = session.max_attempts,
                pending = session.remaining.len(),
                "waiting"
            );
            session.attempt += 1;
        }

        Ok(AwaitOutcome::DeadlineExceeded {
            ticks: session.attempt,
            pending: session.remaining,
            resolved: session.resolved,
        })
    }

    async fn poll_one(
        &self,
        name: &JobName,
        baselines: &HashMap<JobTarget, Baseline>,
    ) -> Result<RunStatus> {
        let target = name.resolve(&self.repository);
        let baseline = baselines.get(&target).copied().unwrap_or_default();
        match self.client.list_recent_runs(&target, 1).await {
            Ok(runs) => Ok(classify(&runs, baseline)),
            Err(e) if e.is_transient() => {
                tracing::warn!(job = %name, error = %e, "status query failed; will retry");
                Ok(RunStatus::Unknown)
            }
            Err(e) => Err(e),
        }
    }
}

fn check_await_args(names: &[JobName], timeout: Duration) -> Result<()> {
    if names.is_empty() {
        return Err(RelayError::InvalidArgument(
            "at least one job name is required".into(),
        ));
    }
    if timeout.is_zero() {
        return Err(RelayError::InvalidArgument(
            "timeout must be greater than zero".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted client and recording sleeper shared by the orchestrator and
    //! pipeline tests.

    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use chrono::{DateTime, SubsecRound, Utc};

    use super::Sleeper;
    use crate::client::{AutomationClient, Conclusion, RunLifecycle, RunSummary};
    use crate::error::{RelayError, Result};
    use crate::job::JobTarget;

    /// What a job's most recent run looks like on a given query.
    #[derive(Debug, Clone, Copy)]
    pub enum Step {
        NoRuns,
        Running,
        Success,
        Failure,
        /// Completed successfully long ago, with the oldest possible run id.
        StaleSuccess,
        /// The query timed out.
        Timeout,
        /// The provider answered 502.
        ServerError,
        /// The credential was rejected.
        Unauthorized,
        /// A non-transient error, e.g. an invalid API URL.
        Misconfigured,
    }

    /// Fake provider. Each job follows its script one step per query; the
    /// last step repeats. Unscripted jobs report `Running` forever.
    ///
    /// Every query reports a fresh run (id `100 + query index`, timestamp
    /// truncated to whole seconds like the provider's) except `StaleSuccess`.
    #[derive(Default)]
    pub struct FakeClient {
        scripts: HashMap<String, Vec<Step>>,
        failing_dispatch: HashSet<String>,
        pub dispatched: Mutex<Vec<JobTarget>>,
        queries: Mutex<HashMap<String, usize>>,
    }

    impl FakeClient {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn script(mut self, workflow: &str, steps: &[Step]) -> Self {
            self.scripts.insert(workflow.to_string(), steps.to_vec());
            self
        }

        pub fn fail_dispatch(mut self, workflow: &str) -> Self {
            self.failing_dispatch.insert(workflow.to_string());
            self
        }

        pub fn dispatched_workflows(&self) -> Vec<String> {
            self.dispatched
                .lock()
                .unwrap()
                .iter()
                .map(|t| t.workflow.clone())
                .collect()
        }

        pub fn query_count(&self, workflow: &str) -> usize {
            self.queries
                .lock()
                .unwrap()
                .get(workflow)
                .copied()
                .unwrap_or(0)
        }

        fn summary(
            id: u64,
            status: RunLifecycle,
            conclusion: Option<Conclusion>,
            created_at: DateTime<Utc>,
        ) -> RunSummary {
            RunSummary {
                id,
                status,
                conclusion,
                created_at: Some(created_at),
                html_url: Some("https://github.com/o/r/actions/runs/7".into()),
            }
        }
    }

    impl AutomationClient for FakeClient {
        async fn dispatch(&self, target: &JobTarget, _git_ref: &str) -> Result<()> {
            if self.failing_dispatch.contains(&target.workflow) {
                return Err(RelayError::Http {
                    status: 404,
                    body: "Not Found".into(),
                });
            }
            self.dispatched.lock().unwrap().push(target.clone());
            Ok(())
        }

        async fn list_recent_runs(
            &self,
            target: &JobTarget,
            _limit: u32,
        ) -> Result<Vec<RunSummary>> {
            let index = {
                let mut queries = self.queries.lock().unwrap();
                let count = queries.entry(target.workflow.clone()).or_insert(0);
                *count += 1;
                *count - 1
            };
            let step = self
                .scripts
                .get(&target.workflow)
                .and_then(|steps| steps.get(index).or_else(|| steps.last()))
                .copied()
                .unwrap_or(Step::Running);

            let id = 100 + index as u64;
            let now = Utc::now().trunc_subsecs(0);
            Ok(match step {
                Step::NoRuns => Vec::new(),
                Step::Running => vec![Self::summary(id, RunLifecycle::InProgress, None, now)],
                Step::Success => vec![Self::summary(
                    id,
                    RunLifecycle::Completed,
                    Some(Conclusion::Success),
                    now,
                )],
                Step::Failure => vec![Self::summary(
                    id,
                    RunLifecycle::Completed,
                    Some(Conclusion::Failure),
                    now,
                )],
                Step::StaleSuccess => vec![Self::summary(
                    1,
                    RunLifecycle::Completed,
                    Some(Conclusion::Success),
                    DateTime::<Utc>::UNIX_EPOCH,
                )],
                Step::Timeout => return Err(RelayError::Timeout(Duration::from_secs(30))),
                Step::ServerError => {
                    return Err(RelayError::Http {
                        status: 502,
                        body: "Bad Gateway".into(),
                    })
                }
                Step::Unauthorized => return Err(RelayError::Auth("Bad credentials".into())),
                Step::Misconfigured => return Err(RelayError::Config("invalid API URL".into())),
            })
        }
    }

    /// Counts ticks instead of sleeping.
    #[derive(Clone, Default)]
    pub struct RecordingSleeper {
        ticks: Arc<AtomicU32>,
    }

    impl RecordingSleeper {
        pub fn ticks(&self) -> u32 {
            self.ticks.load(Ordering::SeqCst)
        }
    }

    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, _duration: Duration) {
            self.ticks.fetch_add(1, Ordering::SeqCst);
        }
    }
}
