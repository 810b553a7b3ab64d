//! Provider names whose absence is not an error.

use std::collections::HashSet;

/// Name recorded for context that was intentionally cleared rather than captured.
pub const CLEARED_CONTEXT_PROVIDER: &str = "contextflow.cleared.context.provider";

/// Set of provider names treated as "no-op, skip" when they cannot be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClearedPlaceholders {
    names: HashSet<String>,
}

impl Default for ClearedPlaceholders {
    fn default() -> Self {
        Self::from_names([CLEARED_CONTEXT_PROVIDER])
    }
}

impl ClearedPlaceholders {
    /// Creates the default set containing [`CLEARED_CONTEXT_PROVIDER`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty set, making every unresolved provider fatal.
    #[must_use]
    pub fn none() -> Self {
        Self {
            names: HashSet::new(),
        }
    }

    /// Creates a set from names.
    #[must_use]
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Adds a name.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>) -> Self {
        self.names.insert(name.into());
        self
    }

    /// Returns true if a missing provider with this name may be skipped.
    #[must_use]
    pub fn is_cleared(&self, name: &str) -> bool {
        self.names.contains(name)
    }
}
