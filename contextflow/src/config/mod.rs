//! Configuration for capture and for context services.
//!
//! [`ExecutionProperties`] travel with every snapshot. [`ContextServiceConfig`]
//! describes a context service: which providers it captures explicitly, with
//! which attributes, and which provider names count as intentionally cleared.

mod properties;

pub use properties::{
    DefaultContext, ExecutionProperties, CONTEXTUAL_METHODS, DEFAULT_CONTEXT, IDENTITY_NAME,
    REQUIRE_AVAILABLE_APP, SKIP_CONTEXT_PROVIDERS, TASK_OWNER,
};

use crate::errors::{ContextError, Result};
use crate::providers::CLEARED_CONTEXT_PROVIDER;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Attributes configured for one provider.
pub type ProviderConfig = HashMap<String, serde_json::Value>;

/// Ordered per-provider configuration. Order is capture order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderConfigs {
    entries: Vec<ConfiguredProvider>,
}

/// One explicitly configured provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfiguredProvider {
    /// The provider name.
    pub name: String,
    /// Provider-specific attributes.
    #[serde(default)]
    pub attributes: ProviderConfig,
}

impl ProviderConfigs {
    /// Creates an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures a provider with no attributes.
    #[must_use]
    pub fn provider(self, name: impl Into<String>) -> Self {
        self.provider_with(name, ProviderConfig::new())
    }

    /// Configures a provider with attributes.
    ///
    /// Configuring the same name twice replaces the attributes in place.
    #[must_use]
    pub fn provider_with(mut self, name: impl Into<String>, attributes: ProviderConfig) -> Self {
        let name = name.into();
        match self.entries.iter_mut().find(|e| e.name == name) {
            Some(existing) => existing.attributes = attributes,
            None => self.entries.push(ConfiguredProvider { name, attributes }),
        }
        self
    }

    /// Returns the configuration for a provider.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ProviderConfig> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| &e.attributes)
    }

    /// Returns true if the provider is explicitly configured.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    /// Iterates in configuration order.
    pub fn iter(&self) -> impl Iterator<Item = &ConfiguredProvider> {
        self.entries.iter()
    }

    /// Returns true if nothing is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Configuration of a context service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextServiceConfig {
    /// Service name, used in logs.
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Explicitly configured providers, in capture order.
    #[serde(default)]
    pub providers: ProviderConfigs,
    /// Execution properties applied beneath call-site properties.
    #[serde(default)]
    pub execution_properties: ExecutionProperties,
    /// Provider names whose absence is benign during entry and deserialization.
    #[serde(default = "default_cleared_placeholders")]
    pub cleared_placeholders: Vec<String>,
}

fn default_service_name() -> String {
    "default".to_string()
}

fn default_cleared_placeholders() -> Vec<String> {
    vec![CLEARED_CONTEXT_PROVIDER.to_string()]
}

impl Default for ContextServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            providers: ProviderConfigs::default(),
            execution_properties: ExecutionProperties::default(),
            cleared_placeholders: default_cleared_placeholders(),
        }
    }
}

impl ContextServiceConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the configured providers.
    #[must_use]
    pub fn with_providers(mut self, providers: ProviderConfigs) -> Self {
        self.providers = providers;
        self
    }

    /// Adds a base execution property.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.execution_properties.insert(key, value);
        self
    }

    /// Adds a cleared-context placeholder name.
    #[must_use]
    pub fn with_cleared_placeholder(mut self, name: impl Into<String>) -> Self {
        self.cleared_placeholders.push(name.into());
        self
    }

    /// Parses a configuration from JSON.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ContextError::InvalidConfiguration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ContextError::InvalidConfiguration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&raw)
    }

    /// Checks that the configuration is internally consistent.
    pub fn validate(&self) -> Result<()> {
        self.execution_properties.default_context()?;
        if let Some(entry) = self.providers.iter().find(|e| e.name.trim().is_empty()) {
            return Err(ContextError::InvalidConfiguration(format!(
                "configured provider with empty name (attributes: {:?})",
                entry.attributes
            )));
        }
        let mut seen = HashSet::new();
        for entry in self.providers.iter() {
            if !seen.insert(entry.name.as_str()) {
                return Err(ContextError::InvalidConfiguration(format!(
                    "provider '{}' is configured more than once",
                    entry.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_provider_configs_preserve_order_and_replace_in_place() {
        let mut attrs = ProviderConfig::new();
        attrs.insert("radix".to_string(), serde_json::json!(2));

        let configs = ProviderConfigs::new()
            .provider("sec")
            .provider("tx")
            .provider_with("sec", attrs);

        let names: Vec<_> = configs.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["sec", "tx"]);
        assert_eq!(configs.get("sec").unwrap()["radix"], serde_json::json!(2));
    }

    #[test]
    fn test_config_defaults_from_json() {
        let config = ContextServiceConfig::from_json_str("{}").unwrap();
        assert_eq!(config.name, "default");
        assert_eq!(config.cleared_placeholders, vec![CLEARED_CONTEXT_PROVIDER.to_string()]);
        assert!(config.providers.is_empty());
    }

    #[test]
    fn test_config_full_json() {
        let json = r#"{
            "name": "batch",
            "providers": [
                {"name": "contextflow.numeration.context.provider", "attributes": {"radix": 2}},
                {"name": "tx"}
            ],
            "execution_properties": {"DEFAULT_CONTEXT": "UNCONFIGURED_TYPES"},
            "cleared_placeholders": ["gone"]
        }"#;
        let config = ContextServiceConfig::from_json_str(json).unwrap();
        assert_eq!(config.name, "batch");
        assert!(config.providers.contains("tx"));
        assert_eq!(
            config.execution_properties.default_context().unwrap(),
            DefaultContext::UnconfiguredTypes
        );
        assert_eq!(config.cleared_placeholders, vec!["gone".to_string()]);
    }

    #[test]
    fn test_config_rejects_bad_default_context() {
        let json = r#"{"execution_properties": {"DEFAULT_CONTEXT": "EVERYTHING"}}"#;
        let err = ContextServiceConfig::from_json_str(json).unwrap_err();
        assert!(matches!(err, ContextError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_config_rejects_repeated_provider() {
        let json = r#"{"providers": [{"name": "a"}, {"name": "b"}, {"name": "a"}]}"#;
        let err = ContextServiceConfig::from_json_str(json).unwrap_err();
        assert!(matches!(err, ContextError::InvalidConfiguration(ref m) if m.contains("'a'")));
    }

    #[test]
    fn test_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"name": "from-disk"}}"#).unwrap();
        let config = ContextServiceConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.name, "from-disk");
    }
}
