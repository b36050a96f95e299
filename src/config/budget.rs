//! Prompt and agent-state budget configuration

use serde::{Deserialize, Serialize};

/// Char budget for continuity prompts sent to small local models
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContinuityConfig {
    /// Ceiling on the total content chars of the outbound prompt
    pub max_chars: usize,
    /// Most recent non-system turns kept in the sliding window
    pub history_turns: usize,
    /// Clamp for the state-summary message body
    pub max_summary_chars: usize,
}

impl Default for ContinuityConfig {
    fn default() -> Self {
        Self {
            max_chars: 8_000,
            history_turns: 12,
            max_summary_chars: 1_200,
        }
    }
}

/// Token-estimate budget for agent working state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentStateConfig {
    /// Ceiling in estimated tokens
    pub max_tokens: usize,
    /// Floor the rolling summary is never compressed below
    pub min_summary_chars: usize,
}

impl Default for AgentStateConfig {
    fn default() -> Self {
        Self {
            max_tokens: 2_000,
            min_summary_chars: 400,
        }
    }
}

impl ContinuityConfig {
    /// Validate configuration at startup
    pub fn validate(&self) -> Result<(), String> {
        if self.max_chars == 0 {
            return Err("max_chars must be > 0".to_string());
        }
        if self.history_turns == 0 {
            return Err("history_turns must be >= 1".to_string());
        }
        Ok(())
    }
}

impl AgentStateConfig {
    /// Validate configuration at startup
    pub fn validate(&self) -> Result<(), String> {
        if self.max_tokens == 0 {
            return Err("max_tokens must be > 0".to_string());
        }
        Ok(())
    }
}
