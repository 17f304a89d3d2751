// Domain errors that callers need to tell apart

use thiserror::Error;

/// Errors with a distinct meaning for API callers.
///
/// Library code returns `anyhow::Result` and attaches these as the root cause
/// where the distinction matters; the HTTP layer downcasts to pick a status.
#[derive(Debug, Error)]
pub enum CacdError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} already exists")]
    Conflict(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl CacdError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(what: impl Into<String>) -> Self {
        Self::Conflict(what.into())
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidInput(reason.into())
    }
}

/// Find a `CacdError` anywhere in an error chain.
pub fn find_cacd_error(err: &anyhow::Error) -> Option<&CacdError> {
    err.chain().find_map(|cause| cause.downcast_ref::<CacdError>())
}
