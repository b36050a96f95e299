//! Quota ledger: rolling request and token counters per scope.
//!
//! Minute counters reset 60 seconds after their window opened. Day counters
//! reset when the day key changes; the day key is the UTC date of
//! `now - reset_hour_utc` hours.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::catalog::QuotaLimits;
use crate::config::QuotaConfig;
use crate::routing::TaskClass;

/// Which counters a cap applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "scope", content = "key", rename_all = "snake_case")]
pub enum QuotaScope {
    Global,
    TaskClass(TaskClass),
    Provider(String),
}

impl fmt::Display for QuotaScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuotaScope::Global => f.write_str("global"),
            QuotaScope::TaskClass(class) => write!(f, "task_class:{}", class),
            QuotaScope::Provider(id) => write!(f, "provider:{}", id),
        }
    }
}

/// Cap that rejected a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaRejection {
    RpmExceeded,
    RpdExceeded,
    TpmExceeded,
    TpdExceeded,
}

impl QuotaRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuotaRejection::RpmExceeded => "rpm_exceeded",
            QuotaRejection::RpdExceeded => "rpd_exceeded",
            QuotaRejection::TpmExceeded => "tpm_exceeded",
            QuotaRejection::TpdExceeded => "tpd_exceeded",
        }
    }
}

impl fmt::Display for QuotaRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rejected quota check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaDenied {
    pub scope: QuotaScope,
    pub reason: QuotaRejection,
}

impl fmt::Display for QuotaDenied {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.reason, self.scope)
    }
}

/// Outcome of a quota check.
pub type QuotaCheck = Result<(), QuotaDenied>;

/// Usage counters for one scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaCounters {
    pub rpm: u64,
    pub rpd: u64,
    pub tpm: u64,
    pub tpd: u64,
    pub minute_start: DateTime<Utc>,
    pub day_start: NaiveDate,
}

impl QuotaCounters {
    fn new(now: DateTime<Utc>, day: NaiveDate) -> Self {
        Self {
            rpm: 0,
            rpd: 0,
            tpm: 0,
            tpd: 0,
            minute_start: now,
            day_start: day,
        }
    }

    fn roll(&mut self, now: DateTime<Utc>, day: NaiveDate) {
        if now.signed_duration_since(self.minute_start) >= Duration::seconds(60) {
            self.rpm = 0;
            self.tpm = 0;
            self.minute_start = now;
        }
        if day != self.day_start {
            self.rpd = 0;
            self.tpd = 0;
            self.day_start = day;
        }
    }

    /// First cap that is met or exceeded.
    fn exceeded(&self, limits: &QuotaLimits) -> Option<QuotaRejection> {
        let hit = |used: u64, cap: Option<u64>| cap.is_some_and(|cap| used >= cap);
        if hit(self.rpm, limits.rpm) {
            Some(QuotaRejection::RpmExceeded)
        } else if hit(self.rpd, limits.rpd) {
            Some(QuotaRejection::RpdExceeded)
        } else if hit(self.tpm, limits.tpm) {
            Some(QuotaRejection::TpmExceeded)
        } else if hit(self.tpd, limits.tpd) {
            Some(QuotaRejection::TpdExceeded)
        } else {
            None
        }
    }
}

/// One audit line, written after each recorded request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaUsageRecord {
    pub timestamp: DateTime<Utc>,
    pub day: NaiveDate,
    pub provider_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_class: Option<TaskClass>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    pub tokens: u64,
    /// Provider counters after this request
    pub rpm: u64,
    pub rpd: u64,
    pub tpm: u64,
    pub tpd: u64,
}

/// In-memory usage counters with global, task-class and provider scopes.
pub struct QuotaLedger {
    counters: DashMap<QuotaScope, QuotaCounters>,
    global: QuotaLimits,
    per_task_class: BTreeMap<TaskClass, QuotaLimits>,
    reset_hour_utc: u32,
}

impl QuotaLedger {
    pub fn new(config: &QuotaConfig) -> Self {
        Self {
            counters: DashMap::new(),
            global: config.global,
            per_task_class: config.per_task_class.clone(),
            reset_hour_utc: config.reset_hour_utc,
        }
    }

    /// Day key used for daily counters and audit file names.
    pub fn day_key(&self, now: DateTime<Utc>) -> NaiveDate {
        (now - Duration::hours(i64::from(self.reset_hour_utc))).date_naive()
    }

    /// Check every applicable scope. Provider caps come from the catalog.
    pub fn check(
        &self,
        provider_id: &str,
        provider_limits: &QuotaLimits,
        task_class: Option<TaskClass>,
        now: DateTime<Utc>,
    ) -> QuotaCheck {
        let day = self.day_key(now);
        for (scope, limits) in self.scopes(provider_id, provider_limits, task_class) {
            if limits.is_unlimited() {
                continue;
            }
            let reason = match self.counters.get_mut(&scope) {
                Some(mut counters) => {
                    counters.roll(now, day);
                    counters.exceeded(&limits)
                }
                None => QuotaCounters::new(now, day).exceeded(&limits),
            };
            if let Some(reason) = reason {
                tracing::info!(
                    provider = provider_id,
                    scope = %scope,
                    reason = %reason,
                    "Quota check rejected provider"
                );
                metrics::counter!(
                    "switchyard_quota_rejections_total",
                    "reason" => reason.as_str()
                )
                .increment(1);
                return Err(QuotaDenied { scope, reason });
            }
        }
        Ok(())
    }

    /// Count one request and its tokens against every scope.
    pub fn record(
        &self,
        provider_id: &str,
        task_class: Option<TaskClass>,
        model_id: Option<&str>,
        tokens: u64,
        now: DateTime<Utc>,
    ) -> QuotaUsageRecord {
        let day = self.day_key(now);
        let mut scopes = vec![QuotaScope::Global, QuotaScope::Provider(provider_id.to_string())];
        if let Some(class) = task_class {
            scopes.push(QuotaScope::TaskClass(class));
        }

        let mut provider_counters = QuotaCounters::new(now, day);
        for scope in scopes {
            let is_provider = matches!(scope, QuotaScope::Provider(_));
            let mut counters = self
                .counters
                .entry(scope)
                .or_insert_with(|| QuotaCounters::new(now, day));
            counters.roll(now, day);
            counters.rpm += 1;
            counters.rpd += 1;
            counters.tpm += tokens;
            counters.tpd += tokens;
            if is_provider {
                provider_counters = counters.clone();
            }
        }

        QuotaUsageRecord {
            timestamp: now,
            day,
            provider_id: provider_id.to_string(),
            task_class,
            model_id: model_id.map(str::to_string),
            tokens,
            rpm: provider_counters.rpm,
            rpd: provider_counters.rpd,
            tpm: provider_counters.tpm,
            tpd: provider_counters.tpd,
        }
    }

    /// Snapshot of one scope's counters.
    pub fn counters(&self, scope: &QuotaScope) -> Option<QuotaCounters> {
        self.counters.get(scope).map(|c| c.value().clone())
    }

    fn scopes(
        &self,
        provider_id: &str,
        provider_limits: &QuotaLimits,
        task_class: Option<TaskClass>,
    ) -> Vec<(QuotaScope, QuotaLimits)> {
        let mut scopes = vec![
            (QuotaScope::Provider(provider_id.to_string()), *provider_limits),
            (QuotaScope::Global, self.global),
        ];
        if let Some(class) = task_class {
            if let Some(limits) = self.per_task_class.get(&class) {
                scopes.push((QuotaScope::TaskClass(class), *limits));
            }
        }
        scopes
    }
}

/// Write-only per-day JSONL audit of quota usage.
///
/// Files are named `quota-YYYY-MM-DD.jsonl` after the record's day key.
pub struct QuotaAuditLog {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl QuotaAuditLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_for(&self, day: NaiveDate) -> PathBuf {
        self.dir.join(format!("quota-{}.jsonl", day.format("%Y-%m-%d")))
    }

    pub async fn append(&self, record: &QuotaUsageRecord) -> std::io::Result<()> {
        let mut line = serde_json::to_string(record)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        tokio::fs::create_dir_all(&self.dir).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.file_for(record.day))
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }
}
