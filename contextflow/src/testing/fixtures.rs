//! Registry fixtures for propagation tests.

use super::{AmbientProvider, Journal};
use crate::providers::ProviderRegistry;
use std::collections::HashMap;
use std::sync::Arc;

/// A registry pre-populated with [`AmbientProvider`]s sharing one journal.
#[derive(Debug, Default)]
pub struct RegistryFixture {
    registry: Arc<ProviderRegistry>,
    journal: Journal,
    providers: HashMap<String, Arc<AmbientProvider>>,
}

impl RegistryFixture {
    /// Creates an empty fixture.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an ambient provider.
    #[must_use]
    pub fn provider(self, name: &str, prerequisites: &[&str], always_capture: bool) -> Self {
        let provider = AmbientProvider::new(name).with_journal(self.journal.clone());
        self.with_provider(provider, prerequisites, always_capture)
    }

    /// Registers a pre-built ambient provider, sharing the fixture journal.
    #[must_use]
    pub fn with_provider(
        mut self,
        provider: AmbientProvider,
        prerequisites: &[&str],
        always_capture: bool,
    ) -> Self {
        let provider = Arc::new(provider.with_journal(self.journal.clone()));
        let name = provider.name().to_string();
        self.registry.register(
            name.clone(),
            Arc::clone(&provider) as Arc<dyn crate::providers::ContextProvider>,
            prerequisites.iter().copied(),
            always_capture,
        );
        self.providers.insert(name, provider);
        self
    }

    /// Returns the registry.
    #[must_use]
    pub fn registry(&self) -> Arc<ProviderRegistry> {
        Arc::clone(&self.registry)
    }

    /// Returns the shared journal.
    #[must_use]
    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// Returns a registered provider.
    ///
    /// # Panics
    ///
    /// Panics if no provider with the name was registered through the fixture.
    #[must_use]
    pub fn get(&self, name: &str) -> Arc<AmbientProvider> {
        Arc::clone(
            self.providers
                .get(name)
                .unwrap_or_else(|| panic!("no fixture provider named {name}")),
        )
    }
}
