//! Error types for the contextflow engine.
//!
//! Provider code reports failures through [`ProviderError`]. The engine reports
//! everything through [`ContextError`], wrapping entry failures into a single
//! rejection variant so callers have one type to match on when context could
//! not be established.

use serde_json::json;
use std::collections::HashMap;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = ContextError> = std::result::Result<T, E>;

/// The deployment scope named by an availability failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// A whole application.
    Application,
    /// A module within an application.
    Module,
    /// A component within a module.
    Component,
}

impl Scope {
    /// Returns the scope as a lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Application => "application",
            Self::Module => "module",
            Self::Component => "component",
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure raised by a context provider or one of its units.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// An unchecked failure. Crosses the engine boundary unwrapped.
    #[error("Context provider '{provider}' failed: {message}")]
    Runtime {
        /// The provider name.
        provider: String,
        /// The failure message.
        message: String,
    },

    /// A checked failure. Wrapped into a rejection at the engine boundary.
    #[error("Context provider '{provider}' reported: {message}")]
    Failed {
        /// The provider name.
        provider: String,
        /// The failure message.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<anyhow::Error>,
    },
}

impl ProviderError {
    /// Creates an unchecked provider failure.
    #[must_use]
    pub fn runtime(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Runtime {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Creates a checked provider failure.
    #[must_use]
    pub fn failed(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            provider: provider.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Creates a checked provider failure carrying its cause.
    #[must_use]
    pub fn with_source(
        provider: impl Into<String>,
        message: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::Failed {
            provider: provider.into(),
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Returns true for unchecked failures.
    #[must_use]
    pub const fn is_runtime(&self) -> bool {
        matches!(self, Self::Runtime { .. })
    }

    /// Returns the name of the provider that failed.
    #[must_use]
    pub fn provider(&self) -> &str {
        match self {
            Self::Runtime { provider, .. } | Self::Failed { provider, .. } => provider,
        }
    }
}

/// The main error type for contextflow operations.
#[derive(Debug, Error)]
pub enum ContextError {
    /// The component that captured the snapshot is no longer deployed.
    #[error("Task {task} cannot run because {scope} {name} is not available")]
    Unavailable {
        /// The task name, taken from the execution properties.
        task: String,
        /// The narrowest scope named by the metadata identifier.
        scope: Scope,
        /// The name of the unavailable scope.
        name: String,
    },

    /// A provider named by a snapshot or serialized form cannot be found.
    #[error("Context provider '{name}' is not available")]
    UnresolvedProvider {
        /// The provider name.
        name: String,
    },

    /// Prerequisite resolution stopped making progress.
    #[error("Unable to resolve context provider prerequisites: {}", stuck.join(", "))]
    DependencyDeadlock {
        /// Providers left pending when progress stopped.
        stuck: Vec<String>,
    },

    /// A provider failure that propagates unwrapped.
    #[error("{0}")]
    Provider(#[from] ProviderError),

    /// Context could not be established.
    #[error("Rejected execution: {0}")]
    Rejected(Box<ContextError>),

    /// A provider failed to remove its context during teardown.
    #[error("Context teardown failed ({additional_failures} further failures): {source}")]
    TeardownFailed {
        /// The first checked failure.
        #[source]
        source: ProviderError,
        /// Number of failures after the first.
        additional_failures: usize,
    },

    /// Snapshot bytes were malformed or a provider could not (de)serialize.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The snapshot was already entered and can no longer be modified.
    #[error("Snapshot has already been entered and can no longer be modified")]
    SnapshotSealed,

    /// Invalid execution properties or service configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A dynamically dispatched method could not be invoked.
    #[error("Unable to invoke method '{method}': {reason}")]
    Dispatch {
        /// The method name.
        method: String,
        /// Why the invocation could not happen.
        reason: String,
    },
}

impl ContextError {
    /// Wraps an error into the rejection variant.
    ///
    /// Unchecked provider failures and errors that are already rejections are
    /// returned unchanged.
    #[must_use]
    pub fn rejected(err: Self) -> Self {
        if err.is_rejected() || matches!(&err, Self::Provider(p) if p.is_runtime()) {
            return err;
        }
        Self::Rejected(Box::new(err))
    }

    /// Creates a serialization error.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization(message.into())
    }

    /// Returns true for the rejection variant.
    #[must_use]
    pub const fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    /// Returns the innermost error beneath any rejection wrappers.
    #[must_use]
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::Rejected(inner) => inner.root_cause(),
            other => other,
        }
    }

    /// Returns a short machine-readable code for the error kind.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Unavailable { .. } => "UNAVAILABLE",
            Self::UnresolvedProvider { .. } => "UNRESOLVED_PROVIDER",
            Self::DependencyDeadlock { .. } => "DEPENDENCY_DEADLOCK",
            Self::Provider(_) => "PROVIDER_FAILURE",
            Self::Rejected(_) => "REJECTED",
            Self::TeardownFailed { .. } => "TEARDOWN_FAILED",
            Self::Serialization(_) => "SERIALIZATION_FAILURE",
            Self::SnapshotSealed => "SNAPSHOT_SEALED",
            Self::InvalidConfiguration(_) => "INVALID_CONFIGURATION",
            Self::Dispatch { .. } => "DISPATCH_FAILURE",
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("type".to_string(), json!(self.code()));
        map.insert("message".to_string(), json!(self.to_string()));

        match self {
            Self::Unavailable { task, scope, name } => {
                map.insert("task".to_string(), json!(task));
                map.insert("scope".to_string(), json!(scope.as_str()));
                map.insert("name".to_string(), json!(name));
            }
            Self::UnresolvedProvider { name } => {
                map.insert("provider".to_string(), json!(name));
            }
            Self::DependencyDeadlock { stuck } => {
                map.insert("stuck".to_string(), json!(stuck));
            }
            Self::Provider(err) | Self::TeardownFailed { source: err, .. } => {
                map.insert("provider".to_string(), json!(err.provider()));
            }
            Self::Rejected(inner) => {
                let cause: serde_json::Map<String, serde_json::Value> =
                    inner.to_dict().into_iter().collect();
                map.insert("cause".to_string(), serde_json::Value::Object(cause));
            }
            Self::Dispatch { method, .. } => {
                map.insert("method".to_string(), json!(method));
            }
            Self::Serialization(_) | Self::SnapshotSealed | Self::InvalidConfiguration(_) => {}
        }

        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_wraps_checked_failures() {
        let err = ContextError::rejected(ContextError::Provider(ProviderError::failed("tx", "boom")));
        assert!(err.is_rejected());
        assert!(matches!(err.root_cause(), ContextError::Provider(_)));
    }

    #[test]
    fn test_rejected_leaves_runtime_failures_unwrapped() {
        let err = ContextError::rejected(ContextError::Provider(ProviderError::runtime("tx", "boom")));
        assert!(!err.is_rejected());
    }

    #[test]
    fn test_rejected_does_not_double_wrap() {
        let once = ContextError::rejected(ContextError::SnapshotSealed);
        let twice = ContextError::rejected(once);
        match twice {
            ContextError::Rejected(inner) => assert!(matches!(*inner, ContextError::SnapshotSealed)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unavailable_message() {
        let err = ContextError::Unavailable {
            task: "nightly-report".to_string(),
            scope: Scope::Module,
            name: "reports.war".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Task nightly-report cannot run because module reports.war is not available"
        );
    }

    #[test]
    fn test_deadlock_to_dict() {
        let err = ContextError::rejected(ContextError::DependencyDeadlock {
            stuck: vec!["sec".to_string(), "tx".to_string()],
        });
        let dict = err.to_dict();
        assert_eq!(dict.get("type").unwrap(), "REJECTED");
        let cause = dict.get("cause").unwrap();
        assert_eq!(cause["type"], "DEPENDENCY_DEADLOCK");
        assert_eq!(cause["stuck"], json!(["sec", "tx"]));
    }

    #[test]
    fn test_provider_error_source_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let err = ProviderError::with_source("classloader", "cannot read", io);
        assert!(!err.is_runtime());
        assert_eq!(err.provider(), "classloader");
        assert!(std::error::Error::source(&err).is_some());
    }
}
