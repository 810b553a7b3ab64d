//! Snapshot capture.

use super::PropagationEngine;
use crate::config::{DefaultContext, ExecutionProperties, ProviderConfig, ProviderConfigs};
use crate::context::ContextSnapshot;
use crate::errors::Result;
use crate::observability::SpanTimer;
use crate::providers::{ProviderRegistration, ThreadContext};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

impl PropagationEngine {
    /// Captures the calling thread's context.
    ///
    /// Explicitly configured providers are captured first, in configuration
    /// order, followed by the registry's always-capture providers. Providers
    /// named in `SKIP_CONTEXT_PROVIDERS` are left out. With
    /// `DEFAULT_CONTEXT=ALL_TYPES` nothing is captured.
    ///
    /// Any provider failure aborts the capture.
    pub fn capture(
        &self,
        properties: ExecutionProperties,
        configs: &ProviderConfigs,
    ) -> Result<ContextSnapshot> {
        let timer = SpanTimer::start("context.capture");

        if properties.default_context()? == DefaultContext::AllTypes {
            debug!("All context types use default context; capturing nothing");
            return Ok(ContextSnapshot::new(properties));
        }

        let skipped: HashSet<String> = properties.skipped_providers().into_iter().collect();
        let mut selected: Vec<(Arc<ProviderRegistration>, Option<&ProviderConfig>)> = Vec::new();

        for entry in configs.iter().filter(|e| !skipped.contains(&e.name)) {
            let registration = self.registry.lookup_required(&entry.name)?;
            selected.push((registration, Some(&entry.attributes)));
        }

        for registration in self.registry.always_capture() {
            if skipped.contains(registration.name()) || configs.contains(registration.name()) {
                continue;
            }
            selected.push((registration, None));
        }

        let mut units: Vec<(String, Box<dyn ThreadContext>)> = Vec::with_capacity(selected.len());
        for (registration, config) in selected {
            let unit = registration.provider().capture(&properties, config)?;
            debug!(provider = registration.name(), configured = config.is_some(), "Captured context");
            units.push((registration.name().to_string(), unit));
        }

        let mut snapshot = ContextSnapshot::new(properties)
            .with_metadata_identifier(self.metadata.current_identifier())
            .with_captured_at(Some(Utc::now()));
        for (name, unit) in units {
            snapshot.put(name, unit);
        }

        debug!(
            snapshot_id = %snapshot.id(),
            providers = ?snapshot.provider_names(),
            duration_ms = timer.finish(),
            "Captured thread context"
        );
        Ok(snapshot)
    }
}
