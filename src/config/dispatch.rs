//! Dispatch loop configuration: local eligibility, deadline, event log

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Dispatch loop settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Wall-clock budget across the whole fallback chain (unset = unbounded)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline_seconds: Option<u64>,
}

impl DispatchConfig {
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_seconds.map(Duration::from_secs)
    }
}

/// Rules deciding which requests the local backend may serve
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalPolicyConfig {
    /// Intents always eligible for the local backend
    pub intent_allowlist: Vec<String>,
    /// Largest requested output the local model accepts
    pub max_output_tokens: u32,
    /// Largest prompt (in chars) the local model accepts
    pub max_input_chars: usize,
}

impl Default for LocalPolicyConfig {
    fn default() -> Self {
        Self {
            intent_allowlist: ["route", "classify", "summarize", "draft", "status"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_output_tokens: 1024,
            max_input_chars: 12_000,
        }
    }
}

/// Append-only dispatch event log
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventLogConfig {
    /// JSONL file receiving one event per line (unset = not persisted)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Keep at most this many entries, trimming the oldest
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_entries: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_defaults_have_no_deadline() {
        assert_eq!(DispatchConfig::default().deadline(), None);
    }

    #[test]
    fn test_deadline_from_seconds() {
        let config: DispatchConfig = toml::from_str("deadline_seconds = 90").unwrap();
        assert_eq!(config.deadline(), Some(Duration::from_secs(90)));
    }

    #[test]
    fn test_local_policy_defaults() {
        let config = LocalPolicyConfig::default();
        assert_eq!(config.intent_allowlist.len(), 5);
        assert!(config.intent_allowlist.contains(&"summarize".to_string()));
        assert_eq!(config.max_output_tokens, 1024);
    }
}
