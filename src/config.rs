//! Configuration module for Streamium
//!
//! JSON configuration for the bundled host: listen address, logging,
//! optional metrics endpoint and the inbound slot backing.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::driver::SlotBacking;
use crate::error::{Error, Result};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log configuration
    #[serde(default)]
    pub log: LogConfig,

    /// Listen address for the streaming host (e.g., "127.0.0.1:8080")
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Metrics endpoint configuration
    #[serde(default)]
    pub metrics: Option<MetricsConfig>,

    /// Which primitive backs inbound parameter slots
    #[serde(default)]
    pub slot_backing: SlotBacking,

    /// Path prefix applied ahead of every controller prefix
    #[serde(default)]
    pub route_prefix: String,
}

/// Log configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Listen address for the /metrics endpoint (e.g., "127.0.0.1:9090")
    pub listen: String,
}

fn default_listen() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log: LogConfig::default(),
            listen: default_listen(),
            metrics: None,
            slot_backing: SlotBacking::default(),
            route_prefix: String::new(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;
        Self::from_json(&content)
    }

    /// Parse configuration from JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// An example configuration with every section populated
    pub fn example() -> Self {
        Config {
            log: LogConfig {
                level: "info".to_string(),
            },
            listen: default_listen(),
            metrics: Some(MetricsConfig {
                listen: "127.0.0.1:9090".to_string(),
            }),
            slot_backing: SlotBacking::Queued,
            route_prefix: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::from_json("{}").unwrap();
        assert_eq!(config.listen, "127.0.0.1:8080");
        assert_eq!(config.log.level, "info");
        assert!(config.metrics.is_none());
        assert_eq!(config.slot_backing, SlotBacking::Queued);
    }

    #[test]
    fn test_full_config() {
        let json = r#"{
            "log": { "level": "debug" },
            "listen": "0.0.0.0:9000",
            "metrics": { "listen": "127.0.0.1:9100" },
            "slot_backing": "single",
            "route_prefix": "api"
        }"#;
        let config = Config::from_json(json).unwrap();
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.listen, "0.0.0.0:9000");
        assert_eq!(config.metrics.unwrap().listen, "127.0.0.1:9100");
        assert_eq!(config.slot_backing, SlotBacking::Single);
        assert_eq!(config.route_prefix, "api");
    }

    #[test]
    fn test_example_roundtrips() {
        let example = Config::example();
        let json = serde_json::to_string(&example).unwrap();
        let parsed = Config::from_json(&json).unwrap();
        assert_eq!(parsed.listen, example.listen);
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        assert!(matches!(
            Config::from_json("{"),
            Err(Error::Config(_))
        ));
    }
}
