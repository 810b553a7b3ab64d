//! Execution properties recognized by the engine and the wrappers.

use crate::errors::{ContextError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Controls default-context synthesis. One of [`DefaultContext`] labels.
pub const DEFAULT_CONTEXT: &str = "DEFAULT_CONTEXT";
/// Comma-separated provider names excluded entirely.
pub const SKIP_CONTEXT_PROVIDERS: &str = "SKIP_CONTEXT_PROVIDERS";
/// Comma-separated method names eligible for context in wrappers.
pub const CONTEXTUAL_METHODS: &str = "CONTEXTUAL_METHODS";
/// `true`/`false`; toggles the availability precondition on entry.
pub const REQUIRE_AVAILABLE_APP: &str = "REQUIRE_AVAILABLE_APP";
/// Name of the task, used in diagnostics.
pub const IDENTITY_NAME: &str = "IDENTITY_NAME";
/// Owner of the task, used in diagnostics when no identity name is set.
pub const TASK_OWNER: &str = "TASK_OWNER";

/// Which context types run with default (unconfigured) context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DefaultContext {
    /// Only captured context is applied.
    #[default]
    None,
    /// Registered providers that were not captured get default context.
    UnconfiguredTypes,
    /// Nothing is captured; every registered provider gets default context.
    AllTypes,
}

impl DefaultContext {
    /// Returns the property value for this setting.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::UnconfiguredTypes => "UNCONFIGURED_TYPES",
            Self::AllTypes => "ALL_TYPES",
        }
    }

    /// Parses a property value.
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim() {
            "" | "NONE" => Ok(Self::None),
            "UNCONFIGURED_TYPES" => Ok(Self::UnconfiguredTypes),
            "ALL_TYPES" => Ok(Self::AllTypes),
            other => Err(ContextError::InvalidConfiguration(format!(
                "unknown {DEFAULT_CONTEXT} value '{other}'"
            ))),
        }
    }
}

/// String-to-string configuration attached to a capture.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionProperties {
    values: HashMap<String, String>,
}

impl ExecutionProperties {
    /// Creates an empty property set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a property.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Sets a property, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.values.insert(key.into(), value.into())
    }

    /// Gets a raw property value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Returns true if no properties are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the number of properties.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Iterates over all properties.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns a copy of `base` overlaid with these properties.
    #[must_use]
    pub fn merged_over(&self, base: &Self) -> Self {
        let mut values = base.values.clone();
        values.extend(self.values.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self { values }
    }

    /// The parsed `DEFAULT_CONTEXT` setting.
    pub fn default_context(&self) -> Result<DefaultContext> {
        self.get(DEFAULT_CONTEXT)
            .map_or(Ok(DefaultContext::None), DefaultContext::parse)
    }

    /// Provider names listed in `SKIP_CONTEXT_PROVIDERS`.
    #[must_use]
    pub fn skipped_providers(&self) -> Vec<String> {
        split_list(self.get(SKIP_CONTEXT_PROVIDERS))
    }

    /// Method names listed in `CONTEXTUAL_METHODS`, if the property is present.
    #[must_use]
    pub fn contextual_methods(&self) -> Option<Vec<String>> {
        self.get(CONTEXTUAL_METHODS).map(|v| split_list(Some(v)))
    }

    /// Whether entry must verify that the capturing component is still deployed.
    ///
    /// Defaults to `true`; anything other than `false` keeps the check on.
    #[must_use]
    pub fn require_available_app(&self) -> bool {
        !self
            .get(REQUIRE_AVAILABLE_APP)
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("false"))
    }

    /// Name used for the task in diagnostics.
    #[must_use]
    pub fn task_name(&self) -> String {
        self.get(IDENTITY_NAME)
            .or_else(|| self.get(TASK_OWNER))
            .unwrap_or("<unnamed>")
            .to_string()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ExecutionProperties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

fn split_list(value: Option<&str>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
