//! Configuration module for Switchyard
//!
//! Provides layered configuration loading from files, environment variables, and defaults.
//!
//! # Configuration Precedence
//!
//! 1. CLI arguments (highest priority)
//! 2. Environment variables (`SWITCHYARD_*`)
//! 3. Configuration file (TOML)
//! 4. Default values (lowest priority)
//!
//! # Example
//!
//! ```rust
//! use switchyard::config::SwitchyardConfig;
//!
//! let config = SwitchyardConfig::default();
//! assert_eq!(config.cooldown.cooldown_minutes, 15);
//!
//! let toml = r#"
//! [cooldown]
//! cooldown_minutes = 5
//! "#;
//! let config: SwitchyardConfig = toml::from_str(toml).unwrap();
//! assert_eq!(config.cooldown.cooldown_minutes, 5);
//! ```

pub mod budget;
pub mod dispatch;
pub mod error;
pub mod federation;
pub mod logging;
pub mod routing;

pub use budget::{AgentStateConfig, ContinuityConfig};
pub use dispatch::{DispatchConfig, EventLogConfig, LocalPolicyConfig};
pub use error::ConfigError;
pub use federation::{FederationConfig, QuotaConfig};
pub use logging::{LogFormat, LoggingConfig};
pub use routing::RoutingConfig;

// Re-export CooldownConfig from cooldown module
pub use crate::cooldown::CooldownConfig;

use globset::Glob;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Unified configuration.
///
/// Aggregates every knob of the routing core: planner, cooldowns, local
/// eligibility, prompt and state budgets, federation, quotas, the event log
/// and logging.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchyardConfig {
    /// Route planner
    pub routing: RoutingConfig,
    /// Primary-backend cooldowns
    pub cooldown: CooldownConfig,
    /// Local backend eligibility
    pub local: LocalPolicyConfig,
    /// Dispatch loop
    pub dispatch: DispatchConfig,
    /// Continuity prompt budget
    pub continuity: ContinuityConfig,
    /// Agent working-state budget
    pub agent_state: AgentStateConfig,
    /// Federated provider catalog
    pub federation: FederationConfig,
    /// Quota caps and audit log
    pub quota: QuotaConfig,
    /// Dispatch event log
    pub events: EventLogConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl SwitchyardConfig {
    /// Load configuration from a TOML file
    ///
    /// If path is None, returns default configuration.
    /// If path doesn't exist, returns NotFound error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => {
                if !p.exists() {
                    return Err(ConfigError::NotFound(p.to_path_buf()));
                }
                let content = std::fs::read_to_string(p)?;
                toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
            }
            None => Ok(Self::default()),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supports SWITCHYARD_* environment variables for common settings.
    /// Invalid values are silently ignored (defaults are kept).
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(level) = std::env::var("SWITCHYARD_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("SWITCHYARD_LOG_FORMAT") {
            if let Ok(f) = format.parse() {
                self.logging.format = f;
            }
        }
        if let Ok(minutes) = std::env::var("SWITCHYARD_COOLDOWN_MINUTES") {
            if let Ok(m) = minutes.parse() {
                self.cooldown.cooldown_minutes = m;
            }
        }
        if let Ok(federation) = std::env::var("SWITCHYARD_FEDERATION") {
            self.federation.enabled = federation.to_lowercase() == "true";
        }
        if let Ok(cloud) = std::env::var("SWITCHYARD_CLOUD") {
            self.federation.cloud_enabled = cloud.to_lowercase() == "true";
        }
        if let Ok(catalog) = std::env::var("SWITCHYARD_CATALOG") {
            self.federation.catalog_path = Some(PathBuf::from(catalog));
        }

        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.cooldown
            .validate()
            .map_err(|message| ConfigError::validation("cooldown", message))?;
        self.continuity
            .validate()
            .map_err(|message| ConfigError::validation("continuity", message))?;
        self.agent_state
            .validate()
            .map_err(|message| ConfigError::validation("agent_state", message))?;

        if self.local.max_input_chars == 0 {
            return Err(ConfigError::validation(
                "local.max_input_chars",
                "must be > 0",
            ));
        }

        if self.federation.enabled && self.federation.catalog_path.is_none() {
            return Err(ConfigError::validation(
                "federation.catalog_path",
                "catalog_path is required when federation is enabled",
            ));
        }
        for (field, patterns) in [
            ("federation.allow", &self.federation.allow),
            ("federation.deny", &self.federation.deny),
        ] {
            for pattern in patterns {
                Glob::new(pattern).map_err(|e| {
                    ConfigError::validation(field, format!("invalid pattern '{}': {}", pattern, e))
                })?;
            }
        }
        self.federation
            .default_circuit_breaker
            .validate()
            .map_err(|message| {
                ConfigError::validation("federation.default_circuit_breaker", message)
            })?;

        if self.quota.reset_hour_utc > 23 {
            return Err(ConfigError::validation(
                "quota.reset_hour_utc",
                "must be between 0 and 23",
            ));
        }

        if self.events.max_entries == Some(0) {
            return Err(ConfigError::validation(
                "events.max_entries",
                "must be > 0 when set",
            ));
        }

        Ok(())
    }
}
