//! Snapshot serialization.
//!
//! Unit payloads are produced and consumed by their own providers; the codec
//! only frames them in a versioned envelope.

mod envelope;
mod names;

use crate::config::ExecutionProperties;
use crate::context::ContextSnapshot;
use crate::errors::{ContextError, Result};
use crate::providers::{ClearedPlaceholders, ProviderRegistry};
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::DateTime;
use envelope::Envelope;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Serializes snapshots to bytes and back, resolving providers by name.
#[derive(Debug, Clone)]
pub struct SnapshotCodec {
    registry: Arc<ProviderRegistry>,
    placeholders: ClearedPlaceholders,
}

impl SnapshotCodec {
    /// Creates a codec over a registry with the default cleared placeholders.
    #[must_use]
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self {
            registry,
            placeholders: ClearedPlaceholders::default(),
        }
    }

    /// Replaces the cleared-context placeholder names.
    #[must_use]
    pub fn with_placeholders(mut self, placeholders: ClearedPlaceholders) -> Self {
        self.placeholders = placeholders;
        self
    }

    /// Serializes a snapshot.
    ///
    /// Each unit is serialized by the provider that owns it. Execution
    /// properties are not written; they are supplied again on deserialize.
    /// A cleared placeholder entry is written with an empty payload.
    pub fn serialize(&self, snapshot: &ContextSnapshot) -> Result<Vec<u8>> {
        let mut envelope = Envelope {
            units: Vec::with_capacity(snapshot.len()),
            metadata_identifier: snapshot.metadata_identifier().map(String::from),
            providers: Vec::with_capacity(snapshot.len()),
            captured_at_millis: snapshot.captured_at().map(|t| t.timestamp_millis()),
        };

        for entry in snapshot.entries() {
            let payload = match self.registry.lookup(entry.provider()) {
                Some(registration) => registration
                    .provider()
                    .serialize_unit(entry.unit())
                    .map_err(|e| ContextError::serialization(e.to_string()))?,
                None if self.placeholders.is_cleared(entry.provider()) => Vec::new(),
                None => {
                    return Err(ContextError::UnresolvedProvider {
                        name: entry.provider().to_string(),
                    })
                }
            };
            envelope.units.push(payload);
            envelope.providers.push(entry.provider().to_string());
        }

        let bytes = envelope.encode()?;
        debug!(snapshot_id = %snapshot.id(), units = snapshot.len(), bytes = bytes.len(), "Serialized snapshot");
        Ok(bytes)
    }

    /// Rebuilds a snapshot from bytes produced by [`serialize`](Self::serialize).
    ///
    /// Every provider is resolved against the live registry before its
    /// payload is handed to it. An unknown provider fails the whole call
    /// unless its name is a cleared placeholder, in which case the unit is
    /// left out. A provider named twice is a serialization error.
    pub fn deserialize(&self, bytes: &[u8], properties: ExecutionProperties) -> Result<ContextSnapshot> {
        let envelope = Envelope::decode(bytes)?;

        let captured_at = match envelope.captured_at_millis {
            Some(millis) => Some(DateTime::from_timestamp_millis(millis).ok_or_else(|| {
                ContextError::serialization(format!("capture time out of range: {millis}"))
            })?),
            None => None,
        };

        let mut snapshot = ContextSnapshot::new(properties)
            .with_metadata_identifier(envelope.metadata_identifier)
            .with_captured_at(captured_at);

        let mut seen = HashSet::with_capacity(envelope.providers.len());
        for (name, payload) in envelope.providers.into_iter().zip(envelope.units) {
            if !seen.insert(name.clone()) {
                return Err(ContextError::serialization(format!(
                    "duplicate provider '{name}'"
                )));
            }
            let Some(registration) = self.registry.lookup(&name) else {
                if self.placeholders.is_cleared(&name) {
                    debug!(provider = %name, "Omitting intentionally cleared context");
                    continue;
                }
                return Err(ContextError::UnresolvedProvider { name });
            };
            let unit = registration
                .provider()
                .deserialize_unit(&payload)
                .map_err(|e| ContextError::serialization(e.to_string()))?;
            snapshot.put(name, unit);
        }

        debug!(snapshot_id = %snapshot.id(), units = snapshot.len(), "Deserialized snapshot");
        Ok(snapshot)
    }

    /// Serializes a snapshot to standard base64 text.
    pub fn serialize_to_base64(&self, snapshot: &ContextSnapshot) -> Result<String> {
        self.serialize(snapshot).map(|bytes| STANDARD.encode(bytes))
    }

    /// Rebuilds a snapshot from [`serialize_to_base64`](Self::serialize_to_base64) output.
    pub fn deserialize_from_base64(
        &self,
        text: &str,
        properties: ExecutionProperties,
    ) -> Result<ContextSnapshot> {
        let bytes = STANDARD
            .decode(text.trim())
            .map_err(|e| ContextError::serialization(format!("invalid base64: {e}")))?;
        self.deserialize(&bytes, properties)
    }
}
