//! Structured raw failure reported by provider adapters.

use thiserror::Error;

/// A provider failure before classification.
///
/// Adapters convert whatever their transport produced into this shape; the
/// normalizer never inspects anything else.
#[derive(Debug, Clone, Default, PartialEq, Eq, Error)]
#[error("{}", self.describe())]
pub struct RawFailure {
    /// HTTP status, when the failure came from a response.
    pub status: Option<u16>,
    /// Provider-specific error type or code string.
    pub code: Option<String>,
    /// Human-readable message.
    pub message: String,
    /// The call was aborted (deadline, cancellation).
    pub aborted: bool,
}

impl RawFailure {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn aborted(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            aborted: true,
            ..Self::default()
        }
    }

    fn describe(&self) -> String {
        match (self.status, &self.code) {
            (Some(status), Some(code)) => format!("{status} {code}: {}", self.message),
            (Some(status), None) => format!("{status}: {}", self.message),
            (None, Some(code)) => format!("{code}: {}", self.message),
            (None, None) => self.message.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_status_and_code() {
        let failure = RawFailure::http(429, "slow down").with_code("rate_limit_error");
        assert_eq!(failure.to_string(), "429 rate_limit_error: slow down");
    }

    #[test]
    fn display_plain_message() {
        assert_eq!(RawFailure::message("fetch failed").to_string(), "fetch failed");
    }
}
