//! Connector configuration.

use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::device::FilterCriterion;

/// Default device listener period.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 3000;
pub const DEFAULT_IDLE_BACKOFF_MS: u64 = 50;
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 250;

/// Configuration for a connector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectorConfig {
    /// Enumeration filters.
    pub filters: Vec<FilterCriterion>,
    /// Interface token applied to the enumerated list. Empty keeps all.
    pub interface: String,
    /// Device listener polling period in milliseconds.
    pub poll_interval_ms: u64,
    /// Read loop sleep while no device is ready, in milliseconds.
    pub idle_backoff_ms: u64,
    /// Upper bound on a single blocking read, in milliseconds.
    pub read_timeout_ms: u64,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            interface: String::new(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            idle_backoff_ms: DEFAULT_IDLE_BACKOFF_MS,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
        }
    }
}

impl ConnectorConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ConnectorConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn idle_backoff(&self) -> Duration {
        Duration::from_millis(self.idle_backoff_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ConnectorConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(3));
        assert!(config.interface.is_empty());
        assert!(config.filters.is_empty());
    }

    #[test]
    fn test_parse_toml() {
        let config: ConnectorConfig = toml::from_str(
            r#"
            interface = "mi_00"
            read_timeout_ms = 100

            [[filters]]
            vendor_id = 5824
            product_id = 1158

            [[filters]]
            vendor_id = 5824
            interface = "mi_01"
            "#,
        )
        .unwrap();

        assert_eq!(config.interface, "mi_00");
        assert_eq!(config.read_timeout_ms, 100);
        assert_eq!(config.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
        assert_eq!(
            config.filters,
            vec![
                FilterCriterion::new(0x16C0, Some(0x0486)),
                FilterCriterion::new(0x16C0, None).with_interface("mi_01"),
            ]
        );
    }

    #[test]
    fn test_save_and_load() {
        let config = ConnectorConfig {
            filters: vec![FilterCriterion::new(0x16C0, Some(0x0486))],
            interface: "mi_00".into(),
            ..ConnectorConfig::default()
        };

        let name = format!("hidlink-config-{}.toml", std::process::id());
        let path = std::env::temp_dir().join(name);
        config.save_to_file(&path).unwrap();
        let loaded = ConnectorConfig::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(loaded, config);
    }
}
