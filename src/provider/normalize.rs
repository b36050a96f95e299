//! Provider error normalization.
//!
//! Maps heterogeneous failure shapes to one canonical [`ErrorCode`]. Matching
//! is case-insensitive substring search over `code + message`, checked in a
//! fixed priority order because one message can match several patterns.

use super::RawFailure;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical provider error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Auth,
    RateLimit,
    Quota,
    Context,
    Timeout,
    Network,
    Unknown,
    None,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Auth => "AUTH",
            ErrorCode::RateLimit => "RATE_LIMIT",
            ErrorCode::Quota => "QUOTA",
            ErrorCode::Context => "CONTEXT",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::Network => "NETWORK",
            ErrorCode::Unknown => "UNKNOWN",
            ErrorCode::None => "NONE",
        }
    }

    /// Codes that put a primary backend on cooldown immediately.
    pub fn is_hard(&self) -> bool {
        matches!(
            self,
            ErrorCode::Auth | ErrorCode::RateLimit | ErrorCode::Quota | ErrorCode::Context
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified provider failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedError {
    pub code: ErrorCode,
    pub provider: String,
    pub status: Option<u16>,
    pub raw_code: Option<String>,
    pub message: String,
}

impl fmt::Display for NormalizedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {}: {}", self.code, self.provider, self.message)
    }
}

impl std::error::Error for NormalizedError {}

const AUTH_PATTERNS: &[&str] = &["unauthorized", "forbidden", "invalid_api_key", "authentication"];
const QUOTA_PATTERNS: &[&str] = &["quota_exceeded", "billing_limit", "insufficient_quota"];
const RATE_LIMIT_PATTERNS: &[&str] = &["rate_limit", "rate limit", "too many requests"];
const CONTEXT_PATTERNS: &[&str] = &[
    "context_length_exceeded",
    "prompt is too long",
    "maximum context length",
];
const TIMEOUT_PATTERNS: &[&str] = &["timed out", "timeout", "etimedout", "aborted"];
const NETWORK_PATTERNS: &[&str] = &[
    "fetch failed",
    "econnrefused",
    "econnreset",
    "enotfound",
    "tls",
    "connection refused",
];

fn matches_any(haystack: &str, patterns: &[&str]) -> bool {
    patterns.iter().any(|p| haystack.contains(p))
}

/// Classify a raw failure into a [`NormalizedError`].
pub fn classify(provider: &str, failure: &RawFailure) -> NormalizedError {
    let haystack = format!(
        "{} {}",
        failure.code.as_deref().unwrap_or_default(),
        failure.message
    )
    .to_lowercase();
    let status = failure.status;

    let code = if matches!(status, Some(401) | Some(403)) || matches_any(&haystack, AUTH_PATTERNS)
    {
        ErrorCode::Auth
    } else if matches_any(&haystack, QUOTA_PATTERNS) {
        ErrorCode::Quota
    } else if status == Some(429) || matches_any(&haystack, RATE_LIMIT_PATTERNS) {
        ErrorCode::RateLimit
    } else if matches_any(&haystack, CONTEXT_PATTERNS) {
        ErrorCode::Context
    } else if failure.aborted || status == Some(408) || matches_any(&haystack, TIMEOUT_PATTERNS) {
        ErrorCode::Timeout
    } else if matches_any(&haystack, NETWORK_PATTERNS) {
        ErrorCode::Network
    } else {
        ErrorCode::Unknown
    };

    NormalizedError {
        code,
        provider: provider.to_string(),
        status,
        raw_code: failure.code.clone(),
        message: failure.message.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code_of(failure: RawFailure) -> ErrorCode {
        classify("test", &failure).code
    }

    #[test]
    fn status_codes_map_to_auth_rate_limit_timeout() {
        assert_eq!(code_of(RawFailure::http(401, "nope")), ErrorCode::Auth);
        assert_eq!(code_of(RawFailure::http(403, "nope")), ErrorCode::Auth);
        assert_eq!(code_of(RawFailure::http(429, "busy")), ErrorCode::RateLimit);
        assert_eq!(code_of(RawFailure::http(408, "slow")), ErrorCode::Timeout);
    }

    #[test]
    fn message_patterns_are_case_insensitive() {
        assert_eq!(code_of(RawFailure::message("Unauthorized")), ErrorCode::Auth);
        assert_eq!(
            code_of(RawFailure::message("Too Many Requests")),
            ErrorCode::RateLimit
        );
        assert_eq!(
            code_of(RawFailure::message("Prompt is too long: 210000 tokens")),
            ErrorCode::Context
        );
        assert_eq!(
            code_of(RawFailure::message("request TIMED OUT after 30s")),
            ErrorCode::Timeout
        );
        assert_eq!(
            code_of(RawFailure::message("connect ECONNREFUSED 127.0.0.1:11434")),
            ErrorCode::Network
        );
        assert_eq!(code_of(RawFailure::message("fetch failed")), ErrorCode::Network);
    }

    #[test]
    fn raw_code_participates_in_matching() {
        let failure = RawFailure::http(400, "bad request").with_code("context_length_exceeded");
        assert_eq!(code_of(failure), ErrorCode::Context);
    }

    #[test]
    fn quota_wins_over_rate_limit() {
        // OpenAI reports exhausted billing as a 429 with insufficient_quota.
        let failure = RawFailure::http(429, "You exceeded your current quota")
            .with_code("insufficient_quota");
        assert_eq!(code_of(failure), ErrorCode::Quota);
    }

    #[test]
    fn auth_wins_over_everything() {
        let failure = RawFailure::message("forbidden: rate_limit policy denies key");
        assert_eq!(code_of(failure), ErrorCode::Auth);
    }

    #[test]
    fn aborted_calls_are_timeouts() {
        assert_eq!(code_of(RawFailure::aborted("deadline")), ErrorCode::Timeout);
    }

    #[test]
    fn unmatched_is_unknown() {
        let normalized = classify("oath", &RawFailure::http(500, "internal error"));
        assert_eq!(normalized.code, ErrorCode::Unknown);
        assert_eq!(normalized.provider, "oath");
        assert_eq!(normalized.status, Some(500));
    }

    #[test]
    fn hard_codes() {
        assert!(ErrorCode::Auth.is_hard());
        assert!(ErrorCode::RateLimit.is_hard());
        assert!(ErrorCode::Quota.is_hard());
        assert!(ErrorCode::Context.is_hard());
        assert!(!ErrorCode::Timeout.is_hard());
        assert!(!ErrorCode::Network.is_hard());
        assert!(!ErrorCode::Unknown.is_hard());
    }

    #[test]
    fn error_code_serializes_screaming_snake() {
        let json = serde_json::to_string(&ErrorCode::RateLimit).unwrap();
        assert_eq!(json, "\"RATE_LIMIT\"");
    }
}
