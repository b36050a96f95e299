//! Routing configuration

use serde::{Deserialize, Serialize};

/// Route planner configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Send BASIC tasks that do not require Claude straight to the local backend
    pub basic_local_first: bool,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            basic_local_first: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing_config_defaults() {
        let config = RoutingConfig::default();
        assert!(config.basic_local_first);
    }

    #[test]
    fn test_routing_config_partial_toml() {
        let config: RoutingConfig = toml::from_str("basic_local_first = false").unwrap();
        assert!(!config.basic_local_first);

        let config: RoutingConfig = toml::from_str("").unwrap();
        assert!(config.basic_local_first);
    }
}
