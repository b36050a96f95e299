//! Declarative provider catalog.
//!
//! A new provider is a new catalog row, never new code. Entries are loaded
//! from TOML (`[[providers]]` tables) or JSON (`{"providers": [...]}`) and
//! validated before the registry sees them.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use super::error::CatalogError;
use crate::routing::TaskClass;

/// Where a provider runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Local,
    External,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Local => "local",
            ProviderKind::External => "external",
        }
    }
}

/// Base URL with an optional environment override.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaseUrl {
    pub default: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env_override: Option<String>,
}

impl BaseUrl {
    /// The override variable's value when set and non-empty, else the default.
    pub fn resolve(&self) -> String {
        self.env_override
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| self.default.clone())
    }
}

/// Credential requirements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSpec {
    /// `none`, `api_key` or `bearer`
    #[serde(rename = "type")]
    pub auth_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env_var: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub alias_env_vars: Vec<String>,
}

impl Default for AuthSpec {
    fn default() -> Self {
        Self {
            auth_type: "none".to_string(),
            env_var: None,
            alias_env_vars: Vec::new(),
        }
    }
}

impl AuthSpec {
    pub fn requires_credential(&self) -> bool {
        self.auth_type != "none"
    }

    /// First env var (primary, then aliases) holding a non-empty value.
    pub fn credential_var(&self) -> Option<&str> {
        self.env_var
            .iter()
            .chain(self.alias_env_vars.iter())
            .map(String::as_str)
            .find(|var| std::env::var(var).is_ok_and(|v| !v.trim().is_empty()))
    }

    pub fn credential_present(&self) -> bool {
        !self.requires_credential() || self.credential_var().is_some()
    }
}

/// One model served by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub model_id: String,
    /// Task classes this model serves; empty means all
    #[serde(default)]
    pub task_classes: Vec<TaskClass>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_window_hint: Option<u64>,
    #[serde(default)]
    pub tool_support: bool,
}

impl ModelSpec {
    pub fn serves(&self, task_class: TaskClass) -> bool {
        self.task_classes.is_empty() || self.task_classes.contains(&task_class)
    }

    /// True when no hint is declared or the hint covers `context_tokens`.
    pub fn fits(&self, context_tokens: u64) -> bool {
        self.context_window_hint
            .is_none_or(|hint| hint >= context_tokens)
    }
}

/// Request and token caps. Unset fields are unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaLimits {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rpm: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rpd: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tpm: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tpd: Option<u64>,
}

impl QuotaLimits {
    pub fn is_unlimited(&self) -> bool {
        self.rpm.is_none() && self.rpd.is_none() && self.tpm.is_none() && self.tpd.is_none()
    }
}

/// Retry backoff hints for adapters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    pub initial_ms: u64,
    pub max_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_ms: 500,
            max_ms: 30_000,
        }
    }
}

/// Breaker thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerPolicy {
    /// Consecutive failures that open the breaker
    pub consecutive_failures_to_open: u32,
    /// Seconds the breaker stays open before a half-open probe
    pub open_seconds: u64,
    /// Minimum seconds between half-open probes
    pub half_open_probe_interval_seconds: u64,
}

impl Default for CircuitBreakerPolicy {
    fn default() -> Self {
        Self {
            consecutive_failures_to_open: 3,
            open_seconds: 60,
            half_open_probe_interval_seconds: 15,
        }
    }
}

impl CircuitBreakerPolicy {
    pub fn validate(&self) -> Result<(), String> {
        if self.consecutive_failures_to_open == 0 {
            return Err("consecutive_failures_to_open must be >= 1".to_string());
        }
        if self.open_seconds == 0 {
            return Err("open_seconds must be > 0".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Constraints {
    pub quota: QuotaLimits,
    pub backoff: BackoffPolicy,
    /// Falls back to the federation-wide default when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub circuit_breaker: Option<CircuitBreakerPolicy>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthcheckSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub timeout_ms: u64,
}

impl Default for HealthcheckSpec {
    fn default() -> Self {
        Self {
            path: None,
            timeout_ms: 2_000,
        }
    }
}

/// Routing hints read by the scoring router.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingTags {
    /// Task classes (or free-form hints) this provider is good at
    pub prefers: Vec<String>,
    /// Task classes this provider should be kept away from
    pub avoids: Vec<String>,
    /// Commercial/latency labels: `paid_fallback`, `free_tier`, `low_latency`
    pub labels: Vec<String>,
}

impl RoutingTags {
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l.eq_ignore_ascii_case(label))
    }

    pub fn prefers(&self, hint: &str) -> bool {
        self.prefers.iter().any(|p| p.eq_ignore_ascii_case(hint))
    }

    pub fn avoids(&self, hint: &str) -> bool {
        self.avoids.iter().any(|a| a.eq_ignore_ascii_case(hint))
    }
}

/// One federated provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub provider_id: String,
    pub kind: ProviderKind,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    #[serde(default)]
    pub base_url: BaseUrl,
    #[serde(default)]
    pub auth: AuthSpec,
    pub models: Vec<ModelSpec>,
    #[serde(default)]
    pub constraints: Constraints,
    #[serde(default)]
    pub healthcheck: HealthcheckSpec,
    #[serde(default)]
    pub routing_tags: RoutingTags,
}

fn default_protocol() -> String {
    "openai".to_string()
}

impl CatalogEntry {
    pub fn is_local(&self) -> bool {
        self.kind == ProviderKind::Local
    }

    /// Effective breaker policy given the federation-wide default.
    pub fn breaker_policy(&self, default: &CircuitBreakerPolicy) -> CircuitBreakerPolicy {
        self.constraints
            .circuit_breaker
            .clone()
            .unwrap_or_else(|| default.clone())
    }

    fn validate(&self) -> Result<(), CatalogError> {
        let invalid = |message: String| CatalogError::Invalid {
            provider: self.provider_id.clone(),
            message,
        };

        if self.provider_id.trim().is_empty() {
            return Err(invalid("provider_id must not be empty".to_string()));
        }
        if self.models.is_empty() {
            return Err(invalid("at least one model is required".to_string()));
        }
        let mut seen = HashSet::new();
        for model in &self.models {
            if model.model_id.trim().is_empty() {
                return Err(invalid("model_id must not be empty".to_string()));
            }
            if !seen.insert(model.model_id.as_str()) {
                return Err(invalid(format!("duplicate model '{}'", model.model_id)));
            }
            if model.context_window_hint == Some(0) {
                return Err(invalid(format!(
                    "model '{}': context_window_hint must be > 0",
                    model.model_id
                )));
            }
        }
        if self.kind == ProviderKind::External && self.base_url.default.trim().is_empty() {
            return Err(invalid("external providers need base_url.default".to_string()));
        }
        if self.auth.requires_credential() && self.auth.env_var.is_none() {
            return Err(invalid(format!(
                "auth type '{}' needs env_var",
                self.auth.auth_type
            )));
        }
        if let Some(policy) = &self.constraints.circuit_breaker {
            policy.validate().map_err(invalid)?;
        }
        Ok(())
    }
}

/// Validated provider catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub providers: Vec<CatalogEntry>,
}

impl Catalog {
    /// Build from entries, validating them.
    pub fn new(providers: Vec<CatalogEntry>) -> Result<Self, CatalogError> {
        let catalog = Self { providers };
        catalog.validate()?;
        Ok(catalog)
    }

    /// Load a catalog file. `.json` files are parsed as JSON, anything
    /// else as TOML.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        if !path.exists() {
            return Err(CatalogError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let catalog = if is_json {
            Self::from_json_str(&content)?
        } else {
            Self::from_toml_str(&content)?
        };
        tracing::debug!(
            path = %path.display(),
            providers = catalog.providers.len(),
            "Loaded provider catalog"
        );
        Ok(catalog)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, CatalogError> {
        let catalog: Self =
            toml::from_str(content).map_err(|e| CatalogError::Parse(e.to_string()))?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn from_json_str(content: &str) -> Result<Self, CatalogError> {
        let catalog: Self =
            serde_json::from_str(content).map_err(|e| CatalogError::Parse(e.to_string()))?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn validate(&self) -> Result<(), CatalogError> {
        let mut ids = HashSet::new();
        for entry in &self.providers {
            if !ids.insert(entry.provider_id.as_str()) {
                return Err(CatalogError::DuplicateProvider(entry.provider_id.clone()));
            }
            entry.validate()?;
        }
        Ok(())
    }

    pub fn get(&self, provider_id: &str) -> Option<&CatalogEntry> {
        self.providers.iter().find(|p| p.provider_id == provider_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.providers.iter()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// External providers whose credential is missing from the environment.
    pub fn missing_credentials(&self) -> Vec<&CatalogEntry> {
        self.providers
            .iter()
            .filter(|p| !p.auth.credential_present())
            .collect()
    }
}
