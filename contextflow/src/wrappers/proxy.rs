//! Method-level wrapping of an arbitrary target.

use super::{run_contextual, ContextualError, ContextualMethods};
use crate::config::ExecutionProperties;
use crate::context::ContextSnapshot;
use crate::engine::PropagationEngine;
use crate::errors::ContextError;
use serde_json::Value;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Failure of a by-name method call.
#[derive(Debug, Error)]
pub enum DispatchError<E> {
    /// The target has no method with this name.
    #[error("no method named '{0}'")]
    UnknownMethod(String),

    /// The method exists but may not be invoked this way.
    #[error("method '{method}' cannot be invoked: {reason}")]
    IllegalAccess {
        /// The method name.
        method: String,
        /// Why access was refused.
        reason: String,
    },

    /// The method ran and failed.
    #[error("{0}")]
    Target(E),
}

/// A target that can be invoked by method name.
///
/// Implement this for types wrapped in a [`ContextualProxy`] that need to be
/// driven by name, for example from a task scheduler that only persists the
/// method name and JSON arguments.
pub trait MethodDispatch {
    /// The error type of the target's own methods.
    type Error;

    /// Invokes `method` with `args`.
    fn dispatch(&self, method: &str, args: &[Value]) -> Result<Value, DispatchError<Self::Error>>;
}

/// Wraps a target so that selected method calls run inside a snapshot.
///
/// Equality and hashing use the proxy's own identity, never the target's:
/// a proxy equals only itself.
pub struct ContextualProxy<T> {
    id: Uuid,
    engine: Arc<PropagationEngine>,
    snapshot: Arc<ContextSnapshot>,
    methods: ContextualMethods,
    target: T,
}

impl<T> ContextualProxy<T> {
    /// Wraps a target. Contextual methods come from the snapshot's `CONTEXTUAL_METHODS`.
    pub fn new(engine: Arc<PropagationEngine>, snapshot: Arc<ContextSnapshot>, target: T) -> Self {
        let methods = ContextualMethods::from_properties(snapshot.properties());
        Self {
            id: Uuid::new_v4(),
            engine,
            snapshot,
            methods,
            target,
        }
    }

    /// Overrides which methods run with context.
    #[must_use]
    pub fn with_methods(mut self, methods: ContextualMethods) -> Self {
        self.methods = methods;
        self
    }

    /// Returns the execution properties of the snapshot.
    #[must_use]
    pub fn execution_properties(&self) -> &ExecutionProperties {
        self.snapshot.properties()
    }

    /// Returns the contextual method selection.
    #[must_use]
    pub const fn methods(&self) -> &ContextualMethods {
        &self.methods
    }

    /// Returns the wrapped target, for calls that bypass context entirely.
    #[must_use]
    pub const fn target(&self) -> &T {
        &self.target
    }

    /// Calls `f` on the target as the method `method`.
    ///
    /// Runs inside the snapshot if the method is contextual, directly otherwise.
    pub fn invoke<R, E>(
        &self,
        method: &str,
        f: impl FnOnce(&T) -> Result<R, E>,
    ) -> Result<R, ContextualError<E>> {
        if self.methods.is_contextual(method) {
            run_contextual(&self.engine, &self.snapshot, || f(&self.target))
        } else {
            f(&self.target).map_err(ContextualError::Task)
        }
    }
}

impl<T: MethodDispatch> ContextualProxy<T> {
    /// Invokes a method by name.
    ///
    /// Unknown or inaccessible methods are reported as rejections; the
    /// target's own failures come back as [`ContextualError::Task`].
    pub fn dispatch(&self, method: &str, args: &[Value]) -> Result<Value, ContextualError<T::Error>> {
        self.invoke(method, |target| target.dispatch(method, args))
            .map_err(|err| match err {
                ContextualError::Context(err) => ContextualError::Context(err),
                ContextualError::Task(DispatchError::Target(err)) => ContextualError::Task(err),
                ContextualError::Task(DispatchError::UnknownMethod(name)) => {
                    ContextualError::Context(ContextError::rejected(ContextError::Dispatch {
                        method: name,
                        reason: "no such method".to_string(),
                    }))
                }
                ContextualError::Task(DispatchError::IllegalAccess { method, reason }) => {
                    ContextualError::Context(ContextError::rejected(ContextError::Dispatch {
                        method,
                        reason,
                    }))
                }
            })
    }
}

impl<T> PartialEq for ContextualProxy<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for ContextualProxy<T> {}

impl<T> Hash for ContextualProxy<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T> fmt::Debug for ContextualProxy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextualProxy")
            .field("id", &self.id)
            .field("snapshot", &self.snapshot.id())
            .field("methods", &self.methods)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProviderConfigs, CONTEXTUAL_METHODS};
    use crate::testing::{ambient_value, set_ambient, Phase, RegistryFixture};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::HashSet;

    /// Reports the ambient user it sees.
    struct Ledger;

    impl Ledger {
        fn owner(&self) -> Result<Option<String>, String> {
            Ok(ambient_value("sec"))
        }
    }

    impl MethodDispatch for Ledger {
        type Error = String;

        fn dispatch(&self, method: &str, args: &[Value]) -> Result<Value, DispatchError<String>> {
            match method {
                "owner" => self.owner().map(|o| json!(o)).map_err(DispatchError::Target),
                "credit" => match args.first().and_then(Value::as_i64) {
                    Some(amount) if amount > 0 => Ok(json!({ "owner": ambient_value("sec"), "amount": amount })),
                    _ => Err(DispatchError::Target("amount must be positive".to_string())),
                },
                "audit" => Err(DispatchError::IllegalAccess {
                    method: method.to_string(),
                    reason: "internal".to_string(),
                }),
                other => Err(DispatchError::UnknownMethod(other.to_string())),
            }
        }
    }

    fn proxy_with(props: ExecutionProperties) -> (RegistryFixture, ContextualProxy<Ledger>) {
        let fixture = RegistryFixture::new().provider("sec", &[], true);
        let engine = Arc::new(PropagationEngine::new(fixture.registry()));
        set_ambient("sec", Some("frank"));
        let snapshot = engine.capture(props, &ProviderConfigs::new()).unwrap();
        set_ambient("sec", None);
        let proxy = ContextualProxy::new(engine, Arc::new(snapshot), Ledger);
        (fixture, proxy)
    }

    #[test]
    fn test_all_methods_but_builtins_run_with_context() {
        let (fixture, proxy) = proxy_with(ExecutionProperties::new());

        assert_eq!(proxy.invoke("owner", Ledger::owner).unwrap().as_deref(), Some("frank"));
        assert_eq!(proxy.invoke("to_string", Ledger::owner).unwrap(), None);
        assert_eq!(fixture.journal().providers_for(Phase::Apply), vec!["sec"]);
    }

    #[test]
    fn test_only_listed_methods_run_with_context() {
        let props = ExecutionProperties::new().with(CONTEXTUAL_METHODS, "credit");
        let (_fixture, proxy) = proxy_with(props);

        assert_eq!(proxy.dispatch("owner", &[]).unwrap(), Value::Null);
        assert_eq!(
            proxy.dispatch("credit", &[json!(5)]).unwrap(),
            json!({ "owner": "frank", "amount": 5 })
        );
    }

    #[test]
    fn test_dispatch_error_mapping() {
        let (_fixture, proxy) = proxy_with(ExecutionProperties::new());

        let err = proxy.dispatch("credit", &[json!(-1)]).unwrap_err();
        assert_eq!(err.into_task().as_deref(), Some("amount must be positive"));

        let err = proxy.dispatch("audit", &[]).unwrap_err();
        let context = err.context().unwrap();
        assert!(context.is_rejected());
        assert!(matches!(context.root_cause(), ContextError::Dispatch { method, .. } if method == "audit"));

        let err = proxy.dispatch("withdraw", &[]).unwrap_err();
        assert!(err.context().is_some_and(ContextError::is_rejected));
    }

    #[test]
    fn test_target_error_restores_context() {
        let (_fixture, proxy) = proxy_with(ExecutionProperties::new());
        assert!(proxy.dispatch("credit", &[]).is_err());
        assert_eq!(ambient_value("sec"), None);
    }

    #[test]
    fn test_proxy_identity() {
        let (_fixture, first) = proxy_with(ExecutionProperties::new());
        let (_other, second) = proxy_with(ExecutionProperties::new());

        assert_eq!(first, first);
        assert_ne!(first, second);

        let mut set = HashSet::new();
        set.insert(&first);
        set.insert(&first);
        set.insert(&second);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_custom_method_predicate() {
        let (fixture, proxy) = proxy_with(ExecutionProperties::new());
        let proxy = proxy.with_methods(ContextualMethods::predicate(|m| m != "owner"));

        assert_eq!(proxy.invoke("owner", Ledger::owner).unwrap(), None);
        assert!(fixture.journal().providers_for(Phase::Apply).is_empty());
    }
}
