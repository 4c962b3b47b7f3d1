//! Error categorization feeding retry policy selection (§4.3).

use crate::error::GatewayError;

/// The fixed, closed set of error categories the retry engine dispatches
/// on. Only `Permanent` bypasses retry entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    TemporaryIssues,
    External,
    System,
    Permanent,
}

impl ErrorCategory {
    /// Stable label used for the `category` dimension on retry metrics.
    pub fn label(&self) -> &'static str {
        match self {
            ErrorCategory::TemporaryIssues => "temporary_issues",
            ErrorCategory::External => "external",
            ErrorCategory::System => "system",
            ErrorCategory::Permanent => "permanent",
        }
    }
}

/// Substrings that mark an error as transient regardless of its
/// structural category (§4.3 "Transient exception detection").
const TRANSIENT_MARKERS: &[&str] = &["timeout", "connection", "network"];

fn mentions_transient_marker(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    TRANSIENT_MARKERS.iter().any(|m| lower.contains(m))
}

/// Classify a [`GatewayError`] into the category its retry policy is
/// selected from. Structural classification is overridden by the
/// substring heuristic when the error text mentions a transient marker,
/// since the underlying cause (e.g. a timed-out database call wrapped as
/// `PersistenceFailed`) is more informative than the wrapper variant.
pub fn classify(err: &GatewayError) -> ErrorCategory {
    if mentions_transient_marker(&err.to_string()) {
        return ErrorCategory::TemporaryIssues;
    }

    match err {
        GatewayError::PersistenceFailed(_) => ErrorCategory::TemporaryIssues,
        GatewayError::ExternalUnavailable(_) => ErrorCategory::External,
        GatewayError::LockTimeout | GatewayError::Internal(_) => ErrorCategory::System,
        GatewayError::MissingParameters(_)
        | GatewayError::InvalidToken
        | GatewayError::TeamNotFound
        | GatewayError::TeamBlocked
        | GatewayError::TeamInactive
        | GatewayError::ReplayDetected
        | GatewayError::TimestampInvalid
        | GatewayError::InvalidTransition
        | GatewayError::StateMismatch => ErrorCategory::Permanent,
    }
}
