//! Context providers and the registry that tracks them.
//!
//! A [`ContextProvider`] knows how to capture one kind of ambient state into a
//! [`ThreadContext`] unit and how to (de)serialize such units. The unit itself
//! knows how to install and uninstall itself on the calling thread.

mod placeholders;
mod registry;

pub use placeholders::{ClearedPlaceholders, CLEARED_CONTEXT_PROVIDER};
pub use registry::{
    clear_global_registry, global_registry, ProviderRegistration, ProviderRegistry,
};

use crate::config::{ExecutionProperties, ProviderConfig};
use crate::errors::ProviderError;
use std::any::Any;
use std::fmt::Debug;

/// One captured piece of ambient state.
///
/// Units stored in a snapshot are never applied directly. The engine applies a
/// fresh [`clone_unit`](Self::clone_unit) copy on every entry, so `apply` may
/// stash the thread's previous state in `self` and `remove` may restore it.
pub trait ThreadContext: Send + Sync + Debug {
    /// Returns an independent copy of this unit.
    fn clone_unit(&self) -> Box<dyn ThreadContext>;

    /// Installs this context on the current thread.
    fn apply(&mut self) -> Result<(), ProviderError>;

    /// Restores the state that was present before [`apply`](Self::apply).
    fn remove(&mut self) -> Result<(), ProviderError>;

    /// Downcasting hook for providers that serialize their own units.
    fn as_any(&self) -> &dyn Any;
}

/// A pluggable kind of thread context.
pub trait ContextProvider: Send + Sync {
    /// Captures the current thread's state.
    fn capture(
        &self,
        properties: &ExecutionProperties,
        config: Option<&ProviderConfig>,
    ) -> Result<Box<dyn ThreadContext>, ProviderError>;

    /// Creates the context used when none was captured.
    fn create_default(
        &self,
        properties: &ExecutionProperties,
    ) -> Result<Box<dyn ThreadContext>, ProviderError>;

    /// Serializes a unit this provider created.
    fn serialize_unit(&self, unit: &dyn ThreadContext) -> Result<Vec<u8>, ProviderError>;

    /// Reconstructs a unit from bytes produced by [`serialize_unit`](Self::serialize_unit).
    fn deserialize_unit(&self, bytes: &[u8]) -> Result<Box<dyn ThreadContext>, ProviderError>;
}

impl Clone for Box<dyn ThreadContext> {
    fn clone(&self) -> Self {
        self.clone_unit()
    }
}
