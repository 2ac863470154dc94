//! Core error taxonomy shared by the meeting, recording, transcription and
//! attendance services.
//!
//! Synchronous state-check failures (NotFound/InvalidState/Conflict/Capacity)
//! are raised to the caller. External-service failures during a detached
//! background step are stored on the entity and observed via status queries.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("meeting at capacity: {0}")]
    Capacity(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("external service error: {0}")]
    ExternalService(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Stable machine-readable kind, used by the API layer and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::InvalidState(_) => "invalid_state",
            Self::Conflict(_) => "conflict",
            Self::Forbidden(_) => "forbidden",
            Self::Capacity(_) => "capacity",
            Self::Unsupported(_) => "unsupported",
            Self::Timeout(_) => "timeout",
            Self::ExternalService(_) => "external_service",
            Self::Internal(_) => "internal",
        }
    }
}
