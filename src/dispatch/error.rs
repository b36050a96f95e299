//! Terminal dispatch errors.
//!
//! Provider failures never surface here on their own: they are recovered by
//! moving to the next candidate. Only policy violations and exhaustion end a
//! dispatch, and each carries the full audit trail.

use thiserror::Error;

use super::events::DispatchEvent;
use crate::provider::NormalizedError;

#[derive(Error, Debug)]
pub enum DispatchError {
    /// The request is not eligible for the local backend that would serve it.
    #[error("LOCAL_FALLBACK_DISALLOWED: {reason}")]
    LocalFallbackDisallowed {
        reason: String,
        events: Vec<DispatchEvent>,
        notices: Vec<String>,
    },

    /// The local backend rejected an already budgeted prompt as too long.
    #[error("CONTINUITY_OVERFLOW: {}", .error.message)]
    ContinuityOverflow {
        error: NormalizedError,
        events: Vec<DispatchEvent>,
        notices: Vec<String>,
    },

    /// Every candidate failed, was skipped, or the deadline ran out.
    #[error("NO_BACKEND_AVAILABLE: {}", describe(.last_error))]
    NoBackendAvailable {
        last_error: Option<NormalizedError>,
        events: Vec<DispatchEvent>,
        notices: Vec<String>,
    },
}

fn describe(error: &Option<NormalizedError>) -> String {
    match error {
        Some(e) => format!("last error from {}: {} {}", e.provider, e.code, e.message),
        None => "no candidate could be tried".to_string(),
    }
}

impl DispatchError {
    /// Machine-checkable error code.
    pub fn code(&self) -> &'static str {
        match self {
            DispatchError::LocalFallbackDisallowed { .. } => "LOCAL_FALLBACK_DISALLOWED",
            DispatchError::ContinuityOverflow { .. } => "CONTINUITY_OVERFLOW",
            DispatchError::NoBackendAvailable { .. } => "NO_BACKEND_AVAILABLE",
        }
    }

    /// Every event emitted before the dispatch ended.
    pub fn events(&self) -> &[DispatchEvent] {
        match self {
            DispatchError::LocalFallbackDisallowed { events, .. }
            | DispatchError::ContinuityOverflow { events, .. }
            | DispatchError::NoBackendAvailable { events, .. } => events,
        }
    }

    pub fn notices(&self) -> &[String] {
        match self {
            DispatchError::LocalFallbackDisallowed { notices, .. }
            | DispatchError::ContinuityOverflow { notices, .. }
            | DispatchError::NoBackendAvailable { notices, .. } => notices,
        }
    }

    /// Policy violations must not be retried without changing the request.
    pub fn is_policy_violation(&self) -> bool {
        !matches!(self, DispatchError::NoBackendAvailable { .. })
    }
}
