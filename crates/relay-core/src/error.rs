use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid job name '{0}': expected '<job>' or '<repo>/<job>'")]
    InvalidJobName(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("API error ({status}): {body}")]
    Http { status: u16, body: String },

    #[error("no response within {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected response body: {0}")]
    Decode(String),

    #[error("failed to dispatch '{job}': {source}")]
    DispatchFailed {
        job: String,
        #[source]
        source: Box<RelayError>,
    },

    #[error("workflow '{job}' finished with conclusion '{conclusion}'{}", url_suffix(.url))]
    WorkflowFailed {
        job: String,
        conclusion: String,
        url: Option<String>,
    },

    #[error("deadline exceeded; still pending: {}", .pending.join(", "))]
    DeadlineExceeded { pending: Vec<String> },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

fn url_suffix(url: &Option<String>) -> String {
    url.as_deref().map(|u| format!(" ({u})")).unwrap_or_default()
}

impl RelayError {
    /// Errors raised by the transport layer rather than by a workflow.
    ///
    /// Status queries swallow these into a pending classification; dispatch
    /// never does.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RelayError::Auth(_)
                | RelayError::Http { .. }
                | RelayError::Timeout(_)
                | RelayError::Transport(_)
                | RelayError::Decode(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
