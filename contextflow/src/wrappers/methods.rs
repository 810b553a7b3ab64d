//! Which methods of a proxied target run with context.

use crate::config::ExecutionProperties;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Methods that never run with context unless named explicitly.
pub const BUILTIN_METHODS: &[&str] = &["eq", "hash", "to_string", "fmt"];

/// Selects the methods of a [`ContextualProxy`](super::ContextualProxy) that
/// enter the snapshot before running.
#[derive(Clone, Default)]
pub enum ContextualMethods {
    /// Every method except the [`BUILTIN_METHODS`].
    #[default]
    All,
    /// Only the named methods.
    Only(HashSet<String>),
    /// Methods accepted by a caller-supplied predicate.
    Predicate(Arc<dyn Fn(&str) -> bool + Send + Sync>),
}

impl ContextualMethods {
    /// Reads `CONTEXTUAL_METHODS`, falling back to [`All`](Self::All) when it is absent.
    #[must_use]
    pub fn from_properties(properties: &ExecutionProperties) -> Self {
        properties
            .contextual_methods()
            .map_or(Self::All, |names| Self::Only(names.into_iter().collect()))
    }

    /// Selects only the named methods.
    #[must_use]
    pub fn only<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Only(names.into_iter().map(Into::into).collect())
    }

    /// Selects methods with a predicate.
    #[must_use]
    pub fn predicate(f: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Self::Predicate(Arc::new(f))
    }

    /// Returns true if the method runs with context.
    #[must_use]
    pub fn is_contextual(&self, method: &str) -> bool {
        match self {
            Self::All => !BUILTIN_METHODS.contains(&method),
            Self::Only(names) => names.contains(method),
            Self::Predicate(f) => f(method),
        }
    }
}

impl fmt::Debug for ContextualMethods {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("All"),
            Self::Only(names) => {
                let mut names: Vec<_> = names.iter().collect();
                names.sort();
                f.debug_tuple("Only").field(&names).finish()
            }
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CONTEXTUAL_METHODS;

    #[test]
    fn test_all_excludes_builtins() {
        let methods = ContextualMethods::All;
        assert!(methods.is_contextual("call"));
        assert!(!methods.is_contextual("eq"));
        assert!(!methods.is_contextual("to_string"));
    }

    #[test]
    fn test_from_properties() {
        let props = ExecutionProperties::new().with(CONTEXTUAL_METHODS, "call, compare ,run");
        let methods = ContextualMethods::from_properties(&props);
        assert!(methods.is_contextual("compare"));
        assert!(!methods.is_contextual("apply"));
        assert_eq!(format!("{methods:?}"), r#"Only(["call", "compare", "run"])"#);

        let methods = ContextualMethods::from_properties(&ExecutionProperties::new());
        assert!(matches!(methods, ContextualMethods::All));
    }

    #[test]
    fn test_explicit_list_can_include_builtins() {
        let methods = ContextualMethods::only(["hash"]);
        assert!(methods.is_contextual("hash"));
    }

    #[test]
    fn test_predicate() {
        let methods = ContextualMethods::predicate(|m| m.starts_with("get_"));
        assert!(methods.is_contextual("get_balance"));
        assert!(!methods.is_contextual("set_balance"));
    }
}
