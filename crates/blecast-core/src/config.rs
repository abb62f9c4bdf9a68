//! Adapter configuration.
//!
//! Configuration can be built in code or loaded from TOML:
//!
//! ```toml
//! allow_duplicates = true
//! background_allow_duplicates = false
//! clear_registry_on_scan = true
//!
//! [btleplug]
//! adapter_index = 0
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Configuration for an [`Adapter`](crate::Adapter).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Report every advertisement during a foreground scan, not only the
    /// first one per peripheral.
    pub allow_duplicates: bool,
    /// Duplicate policy for service-filtered background scans.
    pub background_allow_duplicates: bool,
    /// Empty the device registry when a scan session starts with no other
    /// session running.
    pub clear_registry_on_scan: bool,
    /// Options for [`BtleplugCentral`](crate::BtleplugCentral).
    pub btleplug: BtleplugOptions,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            allow_duplicates: true,
            background_allow_duplicates: false,
            clear_registry_on_scan: true,
            btleplug: BtleplugOptions::default(),
        }
    }
}

impl AdapterConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the foreground duplicate policy.
    #[must_use]
    pub fn allow_duplicates(mut self, allow: bool) -> Self {
        self.allow_duplicates = allow;
        self
    }

    /// Set the background duplicate policy.
    #[must_use]
    pub fn background_allow_duplicates(mut self, allow: bool) -> Self {
        self.background_allow_duplicates = allow;
        self
    }

    /// Set whether a fresh scan session empties the registry.
    #[must_use]
    pub fn clear_registry_on_scan(mut self, clear: bool) -> Self {
        self.clear_registry_on_scan = clear;
        self
    }

    /// Set the btleplug options.
    #[must_use]
    pub fn btleplug(mut self, options: BtleplugOptions) -> Self {
        self.btleplug = options;
        self
    }

    /// Parse and validate a configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        self.btleplug.validate()
    }
}

/// Adapter selection for the btleplug central.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BtleplugOptions {
    /// Index into the host's adapter list, used when no name is given.
    pub adapter_index: usize,
    /// Select the first adapter whose description contains this text
    /// (case-insensitive).
    pub adapter_name: Option<String>,
}

impl BtleplugOptions {
    /// Create options that pick the first adapter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick the adapter at `index`.
    #[must_use]
    pub fn adapter_index(mut self, index: usize) -> Self {
        self.adapter_index = index;
        self
    }

    /// Pick the adapter whose description contains `name`.
    #[must_use]
    pub fn adapter_name(mut self, name: impl Into<String>) -> Self {
        self.adapter_name = Some(name.into());
        self
    }

    /// Validate the options.
    pub fn validate(&self) -> Result<()> {
        match &self.adapter_name {
            Some(name) if name.trim().is_empty() => Err(Error::invalid_config(
                "btleplug.adapter_name must not be blank",
            )),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = AdapterConfig::default();
        assert!(config.allow_duplicates);
        assert!(!config.background_allow_duplicates);
        assert!(config.clear_registry_on_scan);
        assert_eq!(config.btleplug.adapter_index, 0);
        assert!(config.btleplug.adapter_name.is_none());
        config.validate().expect("default config should be valid");
    }

    #[test]
    fn test_config_builder() {
        let config = AdapterConfig::new()
            .allow_duplicates(false)
            .background_allow_duplicates(true)
            .clear_registry_on_scan(false)
            .btleplug(BtleplugOptions::new().adapter_index(1));

        assert!(!config.allow_duplicates);
        assert!(config.background_allow_duplicates);
        assert!(!config.clear_registry_on_scan);
        assert_eq!(config.btleplug.adapter_index, 1);
    }

    #[test]
    fn test_config_from_toml_partial() {
        let config = AdapterConfig::from_toml_str(
            r#"
            allow_duplicates = false

            [btleplug]
            adapter_name = "hci1"
            "#,
        )
        .unwrap();

        assert!(!config.allow_duplicates);
        assert!(config.clear_registry_on_scan); // default
        assert_eq!(config.btleplug.adapter_name.as_deref(), Some("hci1"));
    }

    #[test]
    fn test_config_from_toml_empty() {
        let config = AdapterConfig::from_toml_str("").unwrap();
        assert_eq!(config, AdapterConfig::default());
    }

    #[test]
    fn test_config_rejects_blank_adapter_name() {
        let err = AdapterConfig::from_toml_str("[btleplug]\nadapter_name = \"  \"\n").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_config_rejects_bad_toml() {
        let err = AdapterConfig::from_toml_str("allow_duplicates = \"yes\"").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_config_json_shape() {
        let value = serde_json::to_value(AdapterConfig::default()).unwrap();
        assert_eq!(value["allow_duplicates"], true);
        assert_eq!(value["btleplug"]["adapter_index"], 0);
        assert!(value["btleplug"]["adapter_name"].is_null());
    }

    #[test]
    fn test_config_load_missing_file() {
        let err = AdapterConfig::load("/nonexistent/blecast.toml").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
