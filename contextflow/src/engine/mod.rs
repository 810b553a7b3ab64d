//! The propagation engine.
//!
//! [`PropagationEngine::capture`] builds a [`ContextSnapshot`](crate::context::ContextSnapshot)
//! from the live providers, [`PropagationEngine::enter`] installs it on the
//! calling thread and [`PropagationEngine::exit`] reverses exactly what was
//! installed.

mod capture;
mod enter;
mod exit;

use crate::context::{ComponentMetadata, NoComponentMetadata};
use crate::errors::ProviderError;
use crate::providers::{global_registry, ClearedPlaceholders, ProviderRegistry};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Captures, enters and exits thread context.
///
/// The engine holds no per-thread state. One engine (and one snapshot) can be
/// used from any number of threads at once.
pub struct PropagationEngine {
    registry: Arc<ProviderRegistry>,
    metadata: Arc<dyn ComponentMetadata>,
    placeholders: ClearedPlaceholders,
}

impl PropagationEngine {
    /// Creates an engine over a registry, without component metadata.
    #[must_use]
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self::builder().registry(registry).build()
    }

    /// Starts building an engine.
    #[must_use]
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// Returns the provider registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// Returns the component metadata source.
    #[must_use]
    pub fn metadata(&self) -> &dyn ComponentMetadata {
        self.metadata.as_ref()
    }

    /// Returns the names treated as intentionally cleared.
    #[must_use]
    pub const fn placeholders(&self) -> &ClearedPlaceholders {
        &self.placeholders
    }
}

impl std::fmt::Debug for PropagationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropagationEngine")
            .field("registry", &self.registry)
            .field("placeholders", &self.placeholders)
            .finish_non_exhaustive()
    }
}

/// Builder for [`PropagationEngine`].
#[derive(Default)]
pub struct EngineBuilder {
    registry: Option<Arc<ProviderRegistry>>,
    metadata: Option<Arc<dyn ComponentMetadata>>,
    placeholders: Option<ClearedPlaceholders>,
}

impl EngineBuilder {
    /// Sets the provider registry. Defaults to the global registry.
    #[must_use]
    pub fn registry(mut self, registry: Arc<ProviderRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Sets the component metadata source. Defaults to [`NoComponentMetadata`].
    #[must_use]
    pub fn metadata(mut self, metadata: Arc<dyn ComponentMetadata>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Sets the cleared-context placeholder names.
    #[must_use]
    pub fn placeholders(mut self, placeholders: ClearedPlaceholders) -> Self {
        self.placeholders = Some(placeholders);
        self
    }

    /// Builds the engine.
    #[must_use]
    pub fn build(self) -> PropagationEngine {
        PropagationEngine {
            registry: self.registry.unwrap_or_else(global_registry),
            metadata: self
                .metadata
                .unwrap_or_else(|| Arc::new(NoComponentMetadata)),
            placeholders: self.placeholders.unwrap_or_default(),
        }
    }
}

/// Outcome of a provider call that failed, by error or by panic.
pub(crate) enum Failure {
    Error(ProviderError),
    Panic(Box<dyn Any + Send + 'static>),
}

impl Failure {
    fn describe(&self) -> String {
        match self {
            Self::Error(err) => err.to_string(),
            Self::Panic(payload) => payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "panic".to_string()),
        }
    }
}

/// Runs a provider call, turning a panic into a [`Failure`].
pub(crate) fn guarded<T>(f: impl FnOnce() -> Result<T, ProviderError>) -> Result<T, Failure> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(Failure::Error(err)),
        Err(payload) => Err(Failure::Panic(payload)),
    }
}
