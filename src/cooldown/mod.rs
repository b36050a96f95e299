//! Per-backend cooldown tracking for the two primary remote backends.
//!
//! Hard errors (auth, rate limit, quota, context) disable a backend for
//! `cooldown_minutes` straight away. Timeouts only do so once
//! `timeout_strikes` of them land inside `timeout_window_minutes`.

mod config;

pub use config::*;

use crate::dispatch::{DispatchEvent, EventType, TriggerCode};
use crate::provider::ErrorCode;
use crate::routing::BackendId;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

/// Health memory for one primary backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CooldownEntry {
    /// Backend is disabled until this instant
    pub disabled_until: Option<DateTime<Utc>>,
    /// Code of the most recent error
    pub last_error: Option<ErrorCode>,
    /// Consecutive timeout strikes inside the window
    pub strike_count: u32,
    /// When the most recent error happened
    pub last_error_at: Option<DateTime<Utc>>,
}

/// Cooldown state for the primary remotes.
///
/// Owned, injectable state: construct one per process (or per test) and share
/// it behind an `Arc`. Entries are created up front, one per remote key.
pub struct CooldownTracker {
    entries: DashMap<BackendId, CooldownEntry>,
    config: CooldownConfig,
}

impl CooldownTracker {
    pub fn new(config: CooldownConfig) -> Self {
        let entries = DashMap::new();
        for key in BackendId::REMOTES {
            entries.insert(key, CooldownEntry::default());
        }
        Self { entries, config }
    }

    pub fn config(&self) -> &CooldownConfig {
        &self.config
    }

    /// Snapshot of one entry.
    pub fn entry(&self, key: BackendId) -> Option<CooldownEntry> {
        self.entries.get(&key).map(|e| e.value().clone())
    }

    /// True iff a cooldown is set and still in the future.
    pub fn is_disabled(&self, key: BackendId, now: DateTime<Utc>) -> bool {
        self.entries
            .get(&key)
            .and_then(|e| e.disabled_until)
            .is_some_and(|until| until > now)
    }

    /// Record an error for `key`.
    ///
    /// Returns a `COOLDOWN_SET` event when this error put the backend on
    /// cooldown. Keys without an entry (the local backend) are ignored.
    pub fn record_error(
        &self,
        key: BackendId,
        code: ErrorCode,
        now: DateTime<Utc>,
    ) -> Option<DispatchEvent> {
        let Some(mut entry) = self.entries.get_mut(&key) else {
            tracing::trace!(backend = %key, code = %code, "No cooldown entry for backend");
            return None;
        };

        let cooldown = Duration::minutes(i64::from(self.config.cooldown_minutes));
        let window = Duration::minutes(i64::from(self.config.timeout_window_minutes));

        let mut set = false;
        match code {
            code if code.is_hard() => {
                entry.disabled_until = Some(now + cooldown);
                entry.strike_count = 0;
                set = true;
            }
            ErrorCode::Timeout => {
                let within_window = entry.last_error == Some(ErrorCode::Timeout)
                    && entry
                        .last_error_at
                        .is_some_and(|at| now.signed_duration_since(at) <= window);
                entry.strike_count = if within_window {
                    entry.strike_count + 1
                } else {
                    1
                };
                if entry.strike_count >= self.config.timeout_strikes {
                    entry.disabled_until = Some(now + cooldown);
                    set = true;
                }
            }
            _ => {}
        }
        entry.last_error = Some(code);
        entry.last_error_at = Some(now);

        if !set {
            return None;
        }

        let until = entry.disabled_until.unwrap_or(now);
        let strikes = entry.strike_count;
        drop(entry);

        tracing::warn!(
            backend = %key,
            code = %code,
            disabled_until = %until.to_rfc3339(),
            strikes,
            "Backend placed on cooldown"
        );
        metrics::counter!("switchyard_cooldowns_total", "backend" => key.as_str())
            .increment(1);

        let rationale = if code == ErrorCode::Timeout {
            format!(
                "{} timeout strikes within {}m",
                strikes, self.config.timeout_window_minutes
            )
        } else {
            format!("{} error", code)
        };

        Some(
            DispatchEvent::new(EventType::CooldownSet, code.into(), now)
                .from_backend(key)
                .rationale(rationale)
                .meta("disabled_until", until.to_rfc3339())
                .meta("strike_count", strikes),
        )
    }

    /// Clear every cooldown whose deadline has passed.
    ///
    /// Returns one `COOLDOWN_CLEAR` event per cleared key, ordered by key.
    /// Calling it again with nothing newly expired returns no events.
    pub fn clear_expired(&self, now: DateTime<Utc>) -> Vec<DispatchEvent> {
        let mut cleared: Vec<(BackendId, DateTime<Utc>, Option<ErrorCode>)> = Vec::new();

        for mut entry in self.entries.iter_mut() {
            if let Some(until) = entry.disabled_until {
                if until <= now {
                    entry.disabled_until = None;
                    entry.strike_count = 0;
                    cleared.push((*entry.key(), until, entry.last_error));
                }
            }
        }
        cleared.sort_by_key(|(key, _, _)| *key);

        cleared
            .into_iter()
            .map(|(key, until, last_error)| {
                tracing::info!(backend = %key, "Backend cooldown expired");
                let mut event =
                    DispatchEvent::new(EventType::CooldownClear, TriggerCode::Cooldown, now)
                        .from_backend(key)
                        .rationale("cooldown expired")
                        .meta("disabled_until", until.to_rfc3339());
                if let Some(code) = last_error {
                    event = event.meta("last_error", code.as_str());
                }
                event
            })
            .collect()
    }
}

impl Default for CooldownTracker {
    fn default() -> Self {
        Self::new(CooldownConfig::default())
    }
}
