use std::time::Duration;

/// Failure taxonomy shared by every stage of an audit.
///
/// Per-probe failures (`BackendUnavailable`, `Backend`) are retried and then
/// recorded against the probe; they never abort a run. `Configuration` and
/// `Storage` are fatal to the run that hit them.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("config error: {0}")]
    Configuration(String),

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("rate limit exceeded (retry after {retry_after:?})")]
    RateLimitExceeded { retry_after: Duration },

    #[error("cancelled")]
    Cancelled,

    #[error("synthetic content matched PII pattern '{kind}' in probe {probe_id}")]
    SyntheticPiiDetected { probe_id: String, kind: String },

    #[error("invalid group set: expected {expected:?}, got {actual:?}")]
    InvalidGroupSet {
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("insufficient sample for '{metric}': group '{group}' has {count} values (need {required})")]
    InsufficientSample {
        metric: String,
        group: String,
        count: usize,
        required: usize,
    },

    #[error("storage error: {0:#}")]
    Storage(#[source] anyhow::Error),
}

impl AuditError {
    /// Errors that end the whole run rather than a single probe or metric.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AuditError::Configuration(_) | AuditError::Storage(_))
    }
}

/// What a single `Responder::reply` call can fail with.
///
/// An empty reply is not an error: backends return `Ok(String::new())` and the
/// dispatcher records it as a valid outcome.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ResponderError {
    #[error("{0}")]
    Configuration(String),
    #[error("{0}")]
    Unavailable(String),
    #[error("{0}")]
    Backend(String),
}

impl From<ResponderError> for AuditError {
    fn from(e: ResponderError) -> Self {
        match e {
            ResponderError::Configuration(m) => AuditError::Configuration(m),
            ResponderError::Unavailable(m) => AuditError::BackendUnavailable(m),
            ResponderError::Backend(m) => AuditError::Backend(m),
        }
    }
}

pub fn storage<E: Into<anyhow::Error>>(e: E) -> AuditError {
    AuditError::Storage(e.into())
}
