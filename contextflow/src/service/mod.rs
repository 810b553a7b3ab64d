//! The context service facade.
//!
//! A [`ContextService`] ties a configuration to an engine and a codec. It
//! captures with the configured providers, merges call-site execution
//! properties over the configured ones and hands out contextual wrappers.


use crate::codec::SnapshotCodec;
use crate::config::{ContextServiceConfig, ExecutionProperties};
use crate::context::{ComponentMetadata, ContextSnapshot};
use crate::engine::PropagationEngine;
use crate::errors::Result;
use crate::providers::{global_registry, ClearedPlaceholders, ProviderRegistry};
use crate::wrappers::{ContextualCallable, ContextualProxy, ContextualRunnable};
use std::sync::Arc;
use tracing::{debug, info};

/// Captures context and wraps work to run inside it.
#[derive(Debug)]
pub struct ContextService {
    config: ContextServiceConfig,
    engine: Arc<PropagationEngine>,
    codec: SnapshotCodec,
}

impl ContextService {
    /// Creates a service over a registry.
    pub fn new(config: ContextServiceConfig, registry: Arc<ProviderRegistry>) -> Result<Self> {
        config.validate()?;
        let placeholders = ClearedPlaceholders::from_names(config.cleared_placeholders.iter().cloned());
        let engine = PropagationEngine::builder()
            .registry(Arc::clone(&registry))
            .placeholders(placeholders.clone())
            .build();
        let codec = SnapshotCodec::new(registry).with_placeholders(placeholders);

        info!(
            service = %config.name,
            providers = config.providers.iter().count(),
            "Context service created"
        );
        Ok(Self {
            config,
            engine: Arc::new(engine),
            codec,
        })
    }

    /// Creates a service over the global registry.
    pub fn with_global_registry(config: ContextServiceConfig) -> Result<Self> {
        Self::new(config, global_registry())
    }

    /// Uses a component metadata source for capture and availability checks.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Arc<dyn ComponentMetadata>) -> Self {
        let engine = PropagationEngine::builder()
            .registry(Arc::clone(self.engine.registry()))
            .placeholders(self.engine.placeholders().clone())
            .metadata(metadata)
            .build();
        self.engine = Arc::new(engine);
        self
    }

    /// Returns the service name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &ContextServiceConfig {
        &self.config
    }

    /// Returns the engine.
    #[must_use]
    pub const fn engine(&self) -> &Arc<PropagationEngine> {
        &self.engine
    }

    /// Returns the codec.
    #[must_use]
    pub const fn codec(&self) -> &SnapshotCodec {
        &self.codec
    }

    fn effective_properties(&self, properties: &ExecutionProperties) -> ExecutionProperties {
        properties.merged_over(&self.config.execution_properties)
    }

    /// Captures the calling thread's context with the configured providers.
    pub fn capture_thread_context(&self, properties: &ExecutionProperties) -> Result<ContextSnapshot> {
        let snapshot = self
            .engine
            .capture(self.effective_properties(properties), &self.config.providers)?;
        debug!(service = %self.config.name, snapshot_id = %snapshot.id(), "Captured thread context");
        Ok(snapshot)
    }

    /// Captures the current context and binds a fallible task to it.
    pub fn contextual_callable<F>(
        &self,
        properties: &ExecutionProperties,
        task: F,
    ) -> Result<ContextualCallable<F>> {
        let snapshot = self.capture_thread_context(properties)?;
        Ok(ContextualCallable::new(
            Arc::clone(&self.engine),
            Arc::new(snapshot),
            task,
        ))
    }

    /// Captures the current context and binds a side-effecting task to it.
    pub fn contextual_runnable<F>(
        &self,
        properties: &ExecutionProperties,
        task: F,
    ) -> Result<ContextualRunnable<F>> {
        let snapshot = self.capture_thread_context(properties)?;
        Ok(ContextualRunnable::new(
            Arc::clone(&self.engine),
            Arc::new(snapshot),
            task,
        ))
    }

    /// Captures the current context and wraps a target in a proxy.
    pub fn contextual_proxy<T>(
        &self,
        properties: &ExecutionProperties,
        target: T,
    ) -> Result<ContextualProxy<T>> {
        let snapshot = self.capture_thread_context(properties)?;
        Ok(self.contextual_proxy_with(Arc::new(snapshot), target))
    }

    /// Wraps a target in a proxy over an existing snapshot.
    pub fn contextual_proxy_with<T>(&self, snapshot: Arc<ContextSnapshot>, target: T) -> ContextualProxy<T> {
        ContextualProxy::new(Arc::clone(&self.engine), snapshot, target)
    }

    /// Serializes a snapshot.
    pub fn serialize(&self, snapshot: &ContextSnapshot) -> Result<Vec<u8>> {
        self.codec.serialize(snapshot)
    }

    /// Deserializes a snapshot, merging `properties` over the configured ones.
    pub fn deserialize(&self, bytes: &[u8], properties: &ExecutionProperties) -> Result<ContextSnapshot> {
        self.codec.deserialize(bytes, self.effective_properties(properties))
    }
}
