//! Federated catalog and quota configuration

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::federation::{CircuitBreakerPolicy, QuotaLimits};
use crate::routing::TaskClass;

/// Federated provider catalog settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FederationConfig {
    /// Whether the federated catalog is used at all
    pub enabled: bool,
    /// Whether external (cloud) providers may be ranked
    pub cloud_enabled: bool,
    /// Catalog file (TOML or JSON)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog_path: Option<PathBuf>,
    /// Provider id glob patterns allowed (empty = all)
    pub allow: Vec<String>,
    /// Provider id glob patterns denied
    pub deny: Vec<String>,
    /// Provider ids disabled by explicit policy
    pub disabled: Vec<String>,
    /// Local provider injected when nothing else survives ranking
    pub escape_hatch: String,
    /// Also call each adapter's health probe before ranking
    pub probe_health: bool,
    /// Breaker thresholds for catalog entries that do not set their own
    pub default_circuit_breaker: CircuitBreakerPolicy,
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cloud_enabled: false,
            catalog_path: None,
            allow: Vec::new(),
            deny: Vec::new(),
            disabled: Vec::new(),
            escape_hatch: "ollama".to_string(),
            probe_health: false,
            default_circuit_breaker: CircuitBreakerPolicy::default(),
        }
    }
}

/// Quota caps beyond the per-provider ones in the catalog
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// Caps across every provider
    pub global: QuotaLimits,
    /// Caps per task class
    pub per_task_class: BTreeMap<TaskClass, QuotaLimits>,
    /// Hour (UTC) at which daily counters roll over
    pub reset_hour_utc: u32,
    /// Directory receiving the per-day quota audit log
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_dir: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_federation_defaults() {
        let config = FederationConfig::default();
        assert!(!config.enabled);
        assert!(!config.cloud_enabled);
        assert_eq!(config.escape_hatch, "ollama");
        assert!(config.allow.is_empty());
    }

    #[test]
    fn test_quota_config_parses_per_task_class() {
        let toml = r#"
        reset_hour_utc = 0

        [global]
        rpd = 500

        [per_task_class.NON_BASIC]
        rpm = 5
        tpd = 200000
        "#;
        let config: QuotaConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.global.rpd, Some(500));
        let non_basic = &config.per_task_class[&TaskClass::NonBasic];
        assert_eq!(non_basic.rpm, Some(5));
        assert_eq!(non_basic.tpd, Some(200_000));
        assert!(!config.per_task_class.contains_key(&TaskClass::Basic));
    }
}
