//! Configuration for primary-backend cooldowns.

use serde::{Deserialize, Serialize};

/// Cooldown tracker thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CooldownConfig {
    /// Minutes a backend stays disabled once a cooldown is set
    pub cooldown_minutes: u32,
    /// Window in which consecutive timeouts count as strikes
    pub timeout_window_minutes: u32,
    /// Timeout strikes that trigger a cooldown
    pub timeout_strikes: u32,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            cooldown_minutes: 15,
            timeout_window_minutes: 5,
            timeout_strikes: 2,
        }
    }
}

impl CooldownConfig {
    /// Validate configuration at startup
    pub fn validate(&self) -> Result<(), String> {
        if self.cooldown_minutes == 0 {
            return Err("cooldown_minutes must be > 0".to_string());
        }
        if self.timeout_strikes == 0 {
            return Err("timeout_strikes must be >= 1".to_string());
        }
        Ok(())
    }
}
