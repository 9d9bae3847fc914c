//! Error types surfaced by the store client and the records view.

use thiserror::Error;

/// Result type alias for client operations.
pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Errors a caller of the store client must branch on.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Store or query failure. Retry by re-invoking the same call.
    #[error("Fetch failed: {0}")]
    Fetch(String),

    /// A load did not resolve within the configured timeout.
    #[error("Fetch timed out after {0}s")]
    Timeout(u64),

    /// The actor lacks the role the operation requires.
    #[error("Access denied: {0}")]
    Permission(String),

    /// A submission was rejected before reaching the store.
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl ClientError {
    pub fn fetch(report: eyre::Report) -> Self {
        Self::Fetch(format!("{:#}", report))
    }

    pub fn permission(message: impl Into<String>) -> Self {
        Self::Permission(message.into())
    }

    /// Whether re-invoking the same call can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Fetch(_) | Self::Timeout(_))
    }
}

impl From<eyre::Report> for ClientError {
    fn from(report: eyre::Report) -> Self {
        Self::fetch(report)
    }
}

/// A submission form failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("Unknown {field}: {value}")]
    InvalidChoice { field: &'static str, value: String },
}
