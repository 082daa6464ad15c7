use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RelayError, Result};

pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const DEFAULT_REF: &str = "main";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);

// ---------------------------------------------------------------------------
// Repository
// ---------------------------------------------------------------------------

/// An `owner/name` repository coordinate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub owner: String,
    pub name: String,
}

impl Repository {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl FromStr for Repository {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        match s.split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok(Self::new(owner, name))
            }
            _ => Err(RelayError::Config(format!(
                "repository '{s}' must be in 'owner/name' form"
            ))),
        }
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

// ---------------------------------------------------------------------------
// RelayConfig
// ---------------------------------------------------------------------------

/// Everything the client and orchestrator need, passed in explicitly.
///
/// Environment parsing belongs to the binary; nothing in this crate reads
/// process environment.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Repository that unqualified job names resolve against.
    pub repository: Repository,
    /// Bearer credential. `None` makes every API call fail with `Auth`.
    pub token: Option<String>,
    pub api_url: String,
    /// Branch or tag that dispatched runs execute against.
    pub default_ref: String,
    pub request_timeout: Duration,
    pub poll_interval: Duration,
}

impl RelayConfig {
    pub fn new(repository: Repository, token: Option<String>) -> Self {
        Self {
            repository,
            token,
            api_url: DEFAULT_API_URL.to_string(),
            default_ref: DEFAULT_REF.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Reject settings that would only fail later, mid-pipeline.
    pub fn validate(&self) -> Result<()> {
        if self.token.as_deref().map_or(true, |t| t.trim().is_empty()) {
            return Err(RelayError::Config(
                "no API token configured: set GITHUB_TOKEN or pass --token".into(),
            ));
        }
        if self.api_url.trim().is_empty() {
            return Err(RelayError::Config("API URL is empty".into()));
        }
        if self.default_ref.trim().is_empty() {
            return Err(RelayError::Config("git ref is empty".into()));
        }
        if self.poll_interval.is_zero() {
            return Err(RelayError::Config(
                "poll interval must be greater than zero".into(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(RelayError::Config(
                "request timeout must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_owner_and_name() {
        let repo: Repository = "pullmanregional/prh-warehouse".parse().unwrap();
        assert_eq!(repo.owner, "pullmanregional");
        assert_eq!(repo.name, "prh-warehouse");
        assert_eq!(repo.to_string(), "pullmanregional/prh-warehouse");
    }

    #[test]
    fn rejects_malformed_repository() {
        for bad in ["", "owner", "owner/", "/name", "a/b/c"] {
            assert!(
                matches!(bad.parse::<Repository>(), Err(RelayError::Config(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn defaults_match_provider_conventions() {
        let config = RelayConfig::new(Repository::new("o", "r"), Some("t".into()));
        assert_eq!(config.api_url, "https://api.github.com");
        assert_eq!(config.default_ref, "main");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.poll_interval, Duration::from_secs(15));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_token_fails_validation() {
        let config = RelayConfig::new(Repository::new("o", "r"), None);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("GITHUB_TOKEN"));

        let blank = RelayConfig::new(Repository::new("o", "r"), Some("  ".into()));
        assert!(blank.validate().is_err());
    }

    #[test]
    fn zero_interval_fails_validation() {
        let mut config = RelayConfig::new(Repository::new("o", "r"), Some("t".into()));
        config.poll_interval = Duration::ZERO;
        assert!(matches!(config.validate(), Err(RelayError::Config(_))));
    }
}
