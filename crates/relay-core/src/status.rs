use chrono::{DateTime, SubsecRound, Utc};
use serde::Serialize;

use crate::client::{Conclusion, RunLifecycle, RunSummary};

/// Slack, in seconds, for a local clock running ahead of the provider's.
pub const CLOCK_SKEW_SECS: i64 = 5;

/// Per-poll classification of a job's most recent run. Never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunStatus {
    /// No run yet, or the latest run has not completed.
    Pending,
    Success,
    Failed {
        conclusion: Conclusion,
        url: Option<String>,
    },
    /// The status query itself failed; treated as pending for this tick.
    Unknown,
}

/// Which runs of a job are recent enough to count.
///
/// Provider run ids increase monotonically, so the id of the latest run seen
/// before a dispatch separates older runs from ours. The timestamp form is
/// the fallback when that id could not be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Baseline {
    /// Every run counts.
    #[default]
    Any,
    /// Only runs with a larger id count.
    AfterRun(u64),
    /// Only runs created at or after this instant count.
    CreatedSince(DateTime<Utc>),
}

impl Baseline {
    /// Time bound for a dispatch made at `now`.
    ///
    /// Provider timestamps have whole-second precision, so the bound is
    /// truncated and then moved back by [`CLOCK_SKEW_SECS`].
    pub fn since(now: DateTime<Utc>) -> Self {
        let bound = now.trunc_subsecs(0) - chrono::Duration::seconds(CLOCK_SKEW_SECS);
        Baseline::CreatedSince(bound)
    }

    /// Baseline from the latest run seen before dispatching.
    pub fn from_latest(latest: Option<&RunSummary>) -> Self {
        latest.map_or(Baseline::Any, |run| Baseline::AfterRun(run.id))
    }

    pub fn admits(&self, run: &RunSummary) -> bool {
        match *self {
            Baseline::Any => true,
            Baseline::AfterRun(id) => run.id > id,
            Baseline::CreatedSince(bound) => run.created_at.map_or(true, |t| t >= bound),
        }
    }
}

/// Classify the most recent run (the first entry, provider order).
///
/// A run the baseline does not admit cannot be the one we dispatched, so it
/// counts as no run at all.
pub fn classify(runs: &[RunSummary], baseline: Baseline) -> RunStatus {
    let Some(latest) = runs.first() else {
        return RunStatus::Pending;
    };

    if !baseline.admits(latest) {
        return RunStatus::Pending;
    }

    if latest.status != RunLifecycle::Completed {
        return RunStatus::Pending;
    }

    match latest.conclusion {
        Some(Conclusion::Success) => RunStatus::Success,
        Some(conclusion) => RunStatus::Failed {
            conclusion,
            url: latest.html_url.clone(),
        },
        // Completed without a conclusion yet; the provider fills it in shortly.
        None => RunStatus::Pending,
    }
}
