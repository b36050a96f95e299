//! Dispatch audit events and their append-only JSONL sink.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::provider::ErrorCode;
use crate::routing::{BackendId, TaskClass};

/// Kind of audit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    BackendError,
    RouteSelect,
    CooldownSet,
    CooldownClear,
    ContinuityBudget,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::BackendError => "BACKEND_ERROR",
            EventType::RouteSelect => "ROUTE_SELECT",
            EventType::CooldownSet => "COOLDOWN_SET",
            EventType::CooldownClear => "COOLDOWN_CLEAR",
            EventType::ContinuityBudget => "CONTINUITY_BUDGET",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a transition, cooldown or fallback happened.
///
/// Superset of [`ErrorCode`] with the non-provider reasons the dispatch loop
/// records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerCode {
    Auth,
    RateLimit,
    Quota,
    Context,
    Timeout,
    Network,
    Unknown,
    None,
    /// Backend skipped because it is cooling down.
    Cooldown,
    /// No provider configured for the backend slot.
    MissingProvider,
    /// Network globally disallowed for the request.
    NetworkDisabled,
    /// Local eligibility policy rejected the request.
    Policy,
    /// Continuity prompt had to be shrunk.
    Budget,
}

impl TriggerCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerCode::Auth => "AUTH",
            TriggerCode::RateLimit => "RATE_LIMIT",
            TriggerCode::Quota => "QUOTA",
            TriggerCode::Context => "CONTEXT",
            TriggerCode::Timeout => "TIMEOUT",
            TriggerCode::Network => "NETWORK",
            TriggerCode::Unknown => "UNKNOWN",
            TriggerCode::None => "NONE",
            TriggerCode::Cooldown => "COOLDOWN",
            TriggerCode::MissingProvider => "MISSING_PROVIDER",
            TriggerCode::NetworkDisabled => "NETWORK_DISABLED",
            TriggerCode::Policy => "POLICY",
            TriggerCode::Budget => "BUDGET",
        }
    }

    /// Reasons that allow falling back from a remote to the local backend.
    pub fn permits_local_fallback(&self) -> bool {
        matches!(
            self,
            TriggerCode::RateLimit
                | TriggerCode::Timeout
                | TriggerCode::Network
                | TriggerCode::Cooldown
        )
    }
}

impl From<ErrorCode> for TriggerCode {
    fn from(code: ErrorCode) -> Self {
        match code {
            ErrorCode::Auth => TriggerCode::Auth,
            ErrorCode::RateLimit => TriggerCode::RateLimit,
            ErrorCode::Quota => TriggerCode::Quota,
            ErrorCode::Context => TriggerCode::Context,
            ErrorCode::Timeout => TriggerCode::Timeout,
            ErrorCode::Network => TriggerCode::Network,
            ErrorCode::Unknown => TriggerCode::Unknown,
            ErrorCode::None => TriggerCode::None,
        }
    }
}

impl fmt::Display for TriggerCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audit record emitted by the dispatch loop or the cooldown tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchEvent {
    pub event_type: EventType,
    pub task_id: Option<String>,
    pub task_class: Option<TaskClass>,
    pub from_backend: Option<String>,
    pub to_backend: Option<String>,
    pub trigger_code: TriggerCode,
    pub provider_error_code: Option<String>,
    pub network_used: bool,
    pub timestamp: DateTime<Utc>,
    pub rationale: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl DispatchEvent {
    pub fn new(event_type: EventType, trigger_code: TriggerCode, timestamp: DateTime<Utc>) -> Self {
        Self {
            event_type,
            task_id: None,
            task_class: None,
            from_backend: None,
            to_backend: None,
            trigger_code,
            provider_error_code: None,
            network_used: false,
            timestamp,
            rationale: String::new(),
            metadata: Map::new(),
        }
    }

    /// Attach task identity, keeping any already present.
    pub fn with_task(mut self, task_id: &str, task_class: TaskClass) -> Self {
        if self.task_id.is_none() {
            self.task_id = Some(task_id.to_string());
        }
        if self.task_class.is_none() {
            self.task_class = Some(task_class);
        }
        self
    }

    pub fn from_backend(mut self, backend: BackendId) -> Self {
        self.from_backend = Some(backend.to_string());
        self
    }

    pub fn to_backend(mut self, backend: BackendId) -> Self {
        self.to_backend = Some(backend.to_string());
        self.network_used = backend.is_remote();
        self
    }

    /// Mark whether the step behind this event reached a remote backend.
    pub fn network_used(mut self, used: bool) -> Self {
        self.network_used = used;
        self
    }

    pub fn rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = rationale.into();
        self
    }

    pub fn provider_error_code(mut self, code: Option<String>) -> Self {
        self.provider_error_code = code;
        self
    }

    pub fn meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// Destination for emitted events.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn append(&self, events: &[DispatchEvent]) -> std::io::Result<()>;
}

/// Append-only JSONL event log, one event per line.
///
/// With `max_entries` set, the oldest lines are trimmed after each append.
/// Trimming rewrites through a sibling temp file and a rename.
pub struct JsonlEventLog {
    path: PathBuf,
    max_entries: Option<usize>,
    write_lock: Mutex<()>,
}

impl JsonlEventLog {
    pub fn new(path: impl Into<PathBuf>, max_entries: Option<usize>) -> Self {
        Self {
            path: path.into(),
            max_entries,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn trim(&self, max_entries: usize) -> std::io::Result<()> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        let lines: Vec<&str> = content.lines().filter(|l| !l.is_empty()).collect();
        if lines.len() <= max_entries {
            return Ok(());
        }

        let kept = &lines[lines.len() - max_entries..];
        let mut rewritten = kept.join("\n");
        rewritten.push('\n');

        let tmp = self.path.with_extension("jsonl.tmp");
        tokio::fs::write(&tmp, rewritten).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        tracing::debug!(
            path = %self.path.display(),
            dropped = lines.len() - max_entries,
            "Trimmed dispatch event log"
        );
        Ok(())
    }
}

#[async_trait]
impl EventSink for JsonlEventLog {
    async fn append(&self, events: &[DispatchEvent]) -> std::io::Result<()> {
        if events.is_empty() {
            return Ok(());
        }

        let mut buf = String::new();
        for event in events {
            let line = serde_json::to_string(event)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            buf.push_str(&line);
            buf.push('\n');
        }

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(buf.as_bytes()).await?;
        file.flush().await?;
        drop(file);

        if let Some(max) = self.max_entries {
            self.trim(max).await?;
        }
        Ok(())
    }
}
