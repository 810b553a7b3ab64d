//! Registry of live context providers.

use super::ContextProvider;
use crate::errors::{ContextError, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// A provider as registered: name, capability, ordering constraints and capture policy.
pub struct ProviderRegistration {
    name: String,
    provider: Arc<dyn ContextProvider>,
    prerequisites: Vec<String>,
    always_capture: bool,
}

impl ProviderRegistration {
    /// Returns the provider name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the provider capability.
    #[must_use]
    pub fn provider(&self) -> &Arc<dyn ContextProvider> {
        &self.provider
    }

    /// Names of providers that must be applied before this one.
    #[must_use]
    pub fn prerequisites(&self) -> &[String] {
        &self.prerequisites
    }

    /// Whether the provider is captured even when not explicitly configured.
    #[must_use]
    pub const fn always_capture(&self) -> bool {
        self.always_capture
    }
}

impl std::fmt::Debug for ProviderRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistration")
            .field("name", &self.name)
            .field("prerequisites", &self.prerequisites)
            .field("always_capture", &self.always_capture)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct Inner {
    by_name: HashMap<String, Arc<ProviderRegistration>>,
    /// Registration order, used for stable iteration.
    order: Vec<String>,
}

/// Registry of named context providers.
///
/// Providers may come and go while captures and entries are in flight. Readers
/// receive `Arc` handles, so a registration observed by a lookup stays intact
/// even if it is replaced or removed afterwards.
#[derive(Default)]
pub struct ProviderRegistry {
    inner: RwLock<Inner>,
}

impl ProviderRegistry {
    /// Creates a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a provider, replacing any provider with the same name.
    ///
    /// Returns the replaced registration, if any.
    pub fn register<I, S>(
        &self,
        name: impl Into<String>,
        provider: Arc<dyn ContextProvider>,
        prerequisites: I,
        always_capture: bool,
    ) -> Option<Arc<ProviderRegistration>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        let registration = Arc::new(ProviderRegistration {
            name: name.clone(),
            provider,
            prerequisites: prerequisites.into_iter().map(Into::into).collect(),
            always_capture,
        });

        debug!(
            provider = %name,
            prerequisites = ?registration.prerequisites,
            always_capture,
            "Registering context provider"
        );

        let mut inner = self.inner.write();
        let previous = inner.by_name.insert(name.clone(), registration);
        if previous.is_none() {
            inner.order.push(name);
        } else {
            info!(provider = %name, "Replaced existing context provider registration");
        }
        previous
    }

    /// Removes a provider. Returns the removed registration, if any.
    pub fn unregister(&self, name: &str) -> Option<Arc<ProviderRegistration>> {
        let mut inner = self.inner.write();
        let removed = inner.by_name.remove(name);
        if removed.is_some() {
            inner.order.retain(|n| n != name);
            debug!(provider = %name, "Unregistered context provider");
        }
        removed
    }

    /// Looks up a provider by name.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<Arc<ProviderRegistration>> {
        self.inner.read().by_name.get(name).cloned()
    }

    /// Looks up a provider that must exist.
    pub fn lookup_required(&self, name: &str) -> Result<Arc<ProviderRegistration>> {
        self.lookup(name)
            .ok_or_else(|| ContextError::UnresolvedProvider {
                name: name.to_string(),
            })
    }

    /// Returns all provider names in registration order.
    #[must_use]
    pub fn all_names(&self) -> Vec<String> {
        self.inner.read().order.clone()
    }

    /// Returns the always-capture registrations in registration order.
    #[must_use]
    pub fn always_capture(&self) -> Vec<Arc<ProviderRegistration>> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .filter_map(|name| inner.by_name.get(name))
            .filter(|r| r.always_capture)
            .cloned()
            .collect()
    }

    /// Returns true if a provider with the name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.inner.read().by_name.contains_key(name)
    }

    /// Returns the number of registered providers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().by_name.len()
    }

    /// Returns true if no providers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every registration.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.by_name.clear();
        inner.order.clear();
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.all_names())
            .finish()
    }
}

// Global registry
static GLOBAL_REGISTRY: RwLock<Option<Arc<ProviderRegistry>>> = RwLock::new(None);

/// Gets the process-wide provider registry, creating it on first use.
pub fn global_registry() -> Arc<ProviderRegistry> {
    if let Some(registry) = GLOBAL_REGISTRY.read().as_ref() {
        return Arc::clone(registry);
    }

    let mut write = GLOBAL_REGISTRY.write();
    Arc::clone(write.get_or_insert_with(|| Arc::new(ProviderRegistry::new())))
}

/// Drops the process-wide provider registry.
pub fn clear_global_registry() {
    *GLOBAL_REGISTRY.write() = None;
}
