//! Error types for the payment gateway core.
//!
//! [`GatewayError`] covers the closed failure taxonomy from the auth
//! pipeline, payment state manager, and retry engine. Each variant maps to
//! a stable numeric code so callers can build wire responses without
//! matching on the error's `Display` text.

use thiserror::Error;

/// Errors returned by gateway-core operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("missing required parameter: {0}")]
    MissingParameters(String),

    #[error("invalid token")]
    InvalidToken,

    #[error("team not found")]
    TeamNotFound,

    #[error("team is blocked")]
    TeamBlocked,

    #[error("team is inactive or locked")]
    TeamInactive,

    #[error("replay detected")]
    ReplayDetected,

    #[error("timestamp invalid")]
    TimestampInvalid,

    #[error("invalid transition")]
    InvalidTransition,

    #[error("state mismatch")]
    StateMismatch,

    #[error("lock acquisition timed out")]
    LockTimeout,

    #[error("persistence failed: {0}")]
    PersistenceFailed(String),

    #[error("external collaborator unavailable: {0}")]
    ExternalUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Stable numeric code for wire responses. Never changes across
    /// releases — callers may persist it.
    pub fn code(&self) -> u16 {
        match self {
            GatewayError::MissingParameters(_) => 1001,
            GatewayError::InvalidToken => 1002,
            GatewayError::TeamNotFound => 1003,
            GatewayError::TeamBlocked => 1004,
            GatewayError::TeamInactive => 1005,
            GatewayError::ReplayDetected => 1006,
            GatewayError::TimestampInvalid => 1007,
            GatewayError::InvalidTransition => 1008,
            GatewayError::StateMismatch => 1009,
            GatewayError::LockTimeout => 1010,
            GatewayError::PersistenceFailed(_) => 1011,
            GatewayError::ExternalUnavailable(_) => 1012,
            GatewayError::Internal(_) => 1013,
        }
    }

    /// Sanitized, user-visible message. Never includes secrets or the
    /// internals of a chained error beyond what was explicitly passed in.
    pub fn sanitized_message(&self) -> String {
        self.to_string()
    }
}
