//! Per-provider circuit breaker.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::catalog::CircuitBreakerPolicy;
use crate::provider::{classify, ErrorCode, RawFailure};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakerState::Closed => f.write_str("CLOSED"),
            BreakerState::Open => f.write_str("OPEN"),
            BreakerState::HalfOpen => f.write_str("HALF_OPEN"),
        }
    }
}

/// Coarse failure classes used by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    Auth,
    Config,
    HttpError,
    Unknown,
}

impl FailureKind {
    /// Timeouts first, then by status: 401/403 auth, 400/404 config, any
    /// other status a generic HTTP error.
    pub fn classify(provider: &str, failure: &RawFailure) -> Self {
        if classify(provider, failure).code == ErrorCode::Timeout {
            return FailureKind::Timeout;
        }
        match failure.status {
            Some(401) | Some(403) => FailureKind::Auth,
            Some(400) | Some(404) => FailureKind::Config,
            Some(_) => FailureKind::HttpError,
            None => FailureKind::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Timeout => "timeout",
            FailureKind::Auth => "auth",
            FailureKind::Config => "config",
            FailureKind::HttpError => "http_error",
            FailureKind::Unknown => "unknown",
        }
    }

    /// Failures that open the breaker without waiting for the threshold.
    fn opens_immediately(&self) -> bool {
        matches!(self, FailureKind::Auth | FailureKind::Config)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Consecutive timeouts that open the breaker regardless of the threshold.
const TIMEOUT_FAILURES_TO_OPEN: u32 = 2;

/// Breaker memory for one provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerEntry {
    pub state: BreakerState,
    /// Consecutive failures
    pub failures: u32,
    /// Consecutive timeout failures
    pub timeout_failures: u32,
    /// Set whenever the state is `Open`
    pub opened_at: Option<DateTime<Utc>>,
    /// Last time a half-open probe was let through
    pub last_probe_at: Option<DateTime<Utc>>,
    pub policy: CircuitBreakerPolicy,
}

impl CircuitBreakerEntry {
    pub fn new(policy: CircuitBreakerPolicy) -> Self {
        Self {
            state: BreakerState::Closed,
            failures: 0,
            timeout_failures: 0,
            opened_at: None,
            last_probe_at: None,
            policy,
        }
    }

    /// Whether traffic may be sent now.
    ///
    /// An open breaker whose `open_seconds` elapsed moves to half-open and
    /// lets one probe through. Further probes wait for
    /// `half_open_probe_interval_seconds`.
    pub fn poll(&mut self, now: DateTime<Utc>) -> bool {
        match self.state {
            BreakerState::Closed => true,
            BreakerState::Open => {
                let reopen_at = self
                    .opened_at
                    .map(|at| at + seconds(self.policy.open_seconds));
                if reopen_at.is_none_or(|at| at <= now) {
                    self.state = BreakerState::HalfOpen;
                    self.last_probe_at = Some(now);
                    true
                } else {
                    false
                }
            }
            BreakerState::HalfOpen => {
                let next_probe = self
                    .last_probe_at
                    .map(|at| at + seconds(self.policy.half_open_probe_interval_seconds));
                if next_probe.is_none_or(|at| at <= now) {
                    self.last_probe_at = Some(now);
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&mut self) {
        self.state = BreakerState::Closed;
        self.failures = 0;
        self.timeout_failures = 0;
        self.opened_at = None;
        self.last_probe_at = None;
    }

    /// Count a failure. Returns true when this failure opened the breaker.
    pub fn record_failure(&mut self, kind: FailureKind, now: DateTime<Utc>) -> bool {
        self.failures += 1;
        if kind == FailureKind::Timeout {
            self.timeout_failures += 1;
        } else {
            self.timeout_failures = 0;
        }

        let open = self.state == BreakerState::HalfOpen
            || kind.opens_immediately()
            || self.timeout_failures >= TIMEOUT_FAILURES_TO_OPEN
            || self.failures >= self.policy.consecutive_failures_to_open;

        if open && self.state != BreakerState::Open {
            self.state = BreakerState::Open;
            self.opened_at = Some(now);
            return true;
        }
        false
    }
}

fn seconds(n: u64) -> Duration {
    Duration::seconds(i64::try_from(n).unwrap_or(i64::MAX / 1_000))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 2, 12, 0, 0).unwrap()
    }

    fn policy(threshold: u32) -> CircuitBreakerPolicy {
        CircuitBreakerPolicy {
            consecutive_failures_to_open: threshold,
            open_seconds: 30,
            half_open_probe_interval_seconds: 10,
        }
    }

    #[test]
    fn test_failure_kind_classification() {
        let p = "groq";
        assert_eq!(
            FailureKind::classify(p, &RawFailure::aborted("deadline")),
            FailureKind::Timeout
        );
        assert_eq!(
            FailureKind::classify(p, &RawFailure::http(408, "")),
            FailureKind::Timeout
        );
        assert_eq!(
            FailureKind::classify(p, &RawFailure::http(401, "nope")),
            FailureKind::Auth
        );
        assert_eq!(
            FailureKind::classify(p, &RawFailure::http(404, "no model")),
            FailureKind::Config
        );
        assert_eq!(
            FailureKind::classify(p, &RawFailure::http(503, "busy")),
            FailureKind::HttpError
        );
        assert_eq!(
            FailureKind::classify(p, &RawFailure::message("boom")),
            FailureKind::Unknown
        );
    }

    #[test]
    fn test_opens_at_threshold() {
        let mut entry = CircuitBreakerEntry::new(policy(3));
        assert!(!entry.record_failure(FailureKind::HttpError, t0()));
        assert!(!entry.record_failure(FailureKind::Unknown, t0()));
        assert!(entry.record_failure(FailureKind::HttpError, t0()));
        assert_eq!(entry.state, BreakerState::Open);
        assert_eq!(entry.opened_at, Some(t0()));
    }

    #[test]
    fn test_auth_and_config_open_immediately() {
        for kind in [FailureKind::Auth, FailureKind::Config] {
            let mut entry = CircuitBreakerEntry::new(policy(5));
            assert!(entry.record_failure(kind, t0()));
            assert_eq!(entry.state, BreakerState::Open);
        }
    }

    #[test]
    fn test_two_consecutive_timeouts_open() {
        let mut entry = CircuitBreakerEntry::new(policy(5));
        assert!(!entry.record_failure(FailureKind::Timeout, t0()));
        assert!(entry.record_failure(FailureKind::Timeout, t0()));
    }

    #[test]
    fn test_interleaved_timeouts_do_not_open_early() {
        let mut entry = CircuitBreakerEntry::new(policy(5));
        entry.record_failure(FailureKind::Timeout, t0());
        entry.record_failure(FailureKind::HttpError, t0());
        assert!(!entry.record_failure(FailureKind::Timeout, t0()));
        assert_eq!(entry.state, BreakerState::Closed);
    }

    #[test]
    fn test_open_becomes_half_open_after_open_seconds() {
        let mut entry = CircuitBreakerEntry::new(policy(1));
        entry.record_failure(FailureKind::HttpError, t0());

        assert!(!entry.poll(t0() + Duration::seconds(29)));
        assert_eq!(entry.state, BreakerState::Open);

        assert!(entry.poll(t0() + Duration::seconds(30)));
        assert_eq!(entry.state, BreakerState::HalfOpen);
    }

    #[test]
    fn test_half_open_probes_are_rate_limited() {
        let mut entry = CircuitBreakerEntry::new(policy(1));
        entry.record_failure(FailureKind::HttpError, t0());
        let probe = t0() + Duration::seconds(30);
        assert!(entry.poll(probe));
        assert!(!entry.poll(probe + Duration::seconds(5)));
        assert!(entry.poll(probe + Duration::seconds(10)));
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let mut entry = CircuitBreakerEntry::new(policy(5));
        entry.record_failure(FailureKind::Auth, t0());
        let probe = t0() + Duration::seconds(31);
        entry.poll(probe);

        assert!(entry.record_failure(FailureKind::Unknown, probe));
        assert_eq!(entry.state, BreakerState::Open);
        assert_eq!(entry.opened_at, Some(probe));
    }

    #[test]
    fn test_success_closes_and_resets() {
        let mut entry = CircuitBreakerEntry::new(policy(1));
        entry.record_failure(FailureKind::Timeout, t0());
        entry.poll(t0() + Duration::seconds(60));
        entry.record_success();

        assert_eq!(entry.state, BreakerState::Closed);
        assert_eq!(entry.failures, 0);
        assert_eq!(entry.timeout_failures, 0);
        assert!(entry.opened_at.is_none());
    }
}
