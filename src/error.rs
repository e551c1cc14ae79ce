//! Error types for the session guard.

use std::time::Duration;

/// Errors that can occur during session pool and guard operations.
#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    #[error("account {account_id} is already logged in elsewhere")]
    AlreadyActive { account_id: String },

    #[error("timed out after {0:?} waiting for a session slot")]
    Timeout(Duration),

    #[error("invalid pool configuration: {0}")]
    InvalidConfig(String),

    #[error("session pool is closed")]
    PoolClosed,

    #[error("authentication error: {0}")]
    Authentication(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl GuardError {
    /// Wraps any displayable error as an internal error.
    pub fn internal(e: impl std::fmt::Display) -> Self {
        Self::Internal(e.to_string())
    }

    /// Returns true for the "already logged in elsewhere" rejection.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::AlreadyActive { .. })
    }

    /// Returns true if the same request may succeed when retried later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Stable machine-readable code for the presentation layer.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AlreadyActive { .. } => "Session.AlreadyActive",
            Self::Timeout(_) => "Session.AdmissionTimeout",
            Self::InvalidConfig(_) => "Session.InvalidConfig",
            Self::PoolClosed => "Session.PoolClosed",
            Self::Authentication(_) => "Session.Unauthorized",
            Self::InvalidRequest(_) => "Session.InvalidRequest",
            Self::Internal(_) => "Session.Internal",
        }
    }
}
