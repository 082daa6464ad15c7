//! Job addressing.
//!
//! A job name is either `<job>` (resolved against the default repository) or
//! `<repo>/<job>`, which keeps the default owner but points at a sibling
//! repository. The split happens on the first `/` only.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::Repository;
use crate::error::{RelayError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobName(String);

impl JobName {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(RelayError::InvalidJobName(raw.to_string()));
        }
        if let Some((repo, job)) = raw.split_once('/') {
            if repo.is_empty() || job.is_empty() {
                return Err(RelayError::InvalidJobName(raw.to_string()));
            }
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `(repo, job)` when qualified, `(None, job)` otherwise.
    pub fn parts(&self) -> (Option<&str>, &str) {
        match self.0.split_once('/') {
            Some((repo, job)) => (Some(repo), job),
            None => (None, self.0.as_str()),
        }
    }

    pub fn resolve(&self, default: &Repository) -> JobTarget {
        let (repo, workflow) = self.parts();
        JobTarget {
            owner: default.owner.clone(),
            repo: repo.unwrap_or(default.name.as_str()).to_string(),
            workflow: workflow.to_string(),
        }
    }
}

impl FromStr for JobName {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for JobName {
    type Error = RelayError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<JobName> for String {
    fn from(value: JobName) -> Self {
        value.0
    }
}

impl fmt::Display for JobName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parse a batch of raw names, failing on the first invalid one.
pub fn parse_all<S: AsRef<str>>(raw: &[S]) -> Result<Vec<JobName>> {
    raw.iter().map(|s| JobName::parse(s.as_ref())).collect()
}

/// Fully resolved coordinates of one remote workflow.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobTarget {
    pub owner: String,
    pub repo: String,
    /// Workflow file name (e.g. `ingest.yml`) or numeric id.
    pub workflow: String,
}

impl fmt::Display for JobTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.owner, self.repo, self.workflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_repo() -> Repository {
        Repository::new("pullmanregional", "prh-warehouse")
    }

    #[test]
    fn qualified_name_overrides_repo_but_keeps_owner() {
        let target = JobName::parse("other-repo/build")
            .unwrap()
            .resolve(&default_repo());
        assert_eq!(target.owner, "pullmanregional");
        assert_eq!(target.repo, "other-repo");
        assert_eq!(target.workflow, "build");
    }

    #[test]
    fn unqualified_name_uses_default_repo() {
        let target = JobName::parse("build").unwrap().resolve(&default_repo());
        assert_eq!(target.owner, "pullmanregional");
        assert_eq!(target.repo, "prh-warehouse");
        assert_eq!(target.workflow, "build");
    }

    #[test]
    fn splits_on_first_separator_only() {
        let name = JobName::parse("repo/path/with/slashes").unwrap();
        assert_eq!(name.parts(), (Some("repo"), "path/with/slashes"));
    }

    #[test]
    fn rejects_empty_segments() {
        for bad in ["", "   ", "/build", "repo/"] {
            assert!(
                matches!(JobName::parse(bad), Err(RelayError::InvalidJobName(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn parse_all_stops_at_first_invalid_name() {
        let err = parse_all(&["a", "/b", "c"]).unwrap_err();
        assert!(matches!(err, RelayError::InvalidJobName(n) if n == "/b"));
    }

    #[test]
    fn deserializes_with_validation() {
        let names: Vec<JobName> = serde_yaml::from_str("[ingest.yml, dash/refresh.yml]").unwrap();
        assert_eq!(names[1].parts(), (Some("dash"), "refresh.yml"));
        assert!(serde_yaml::from_str::<Vec<JobName>>("[\"repo/\"]").is_err());
    }
}
