//! Captured thread context.

use crate::config::ExecutionProperties;
use crate::errors::{ContextError, Result};
use crate::providers::ThreadContext;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

/// One captured unit and the provider that owns it.
#[derive(Debug)]
pub struct SnapshotEntry {
    provider: String,
    unit: Box<dyn ThreadContext>,
}

impl SnapshotEntry {
    /// Returns the owning provider name.
    #[must_use]
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Returns the captured unit.
    #[must_use]
    pub fn unit(&self) -> &dyn ThreadContext {
        self.unit.as_ref()
    }
}

/// An ordered bundle of captured context units.
///
/// Entry order is capture order; the engine enters units in this order
/// (subject to prerequisites) and exits them in reverse. A snapshot can be
/// entered any number of times, concurrently, from any thread. It may only be
/// modified with [`upsert`](Self::upsert) before it is first entered.
#[derive(Debug)]
pub struct ContextSnapshot {
    id: Uuid,
    captured_at: Option<DateTime<Utc>>,
    properties: ExecutionProperties,
    metadata_identifier: Option<String>,
    entries: Vec<SnapshotEntry>,
    entered: AtomicBool,
}

impl ContextSnapshot {
    /// Creates an empty snapshot carrying the given properties.
    #[must_use]
    pub fn new(properties: ExecutionProperties) -> Self {
        Self {
            id: Uuid::new_v4(),
            captured_at: None,
            properties,
            metadata_identifier: None,
            entries: Vec::new(),
            entered: AtomicBool::new(false),
        }
    }

    /// Sets the metadata identifier of the capturing component.
    #[must_use]
    pub fn with_metadata_identifier(mut self, identifier: Option<String>) -> Self {
        self.metadata_identifier = identifier;
        self
    }

    /// Sets the capture timestamp.
    #[must_use]
    pub fn with_captured_at(mut self, captured_at: Option<DateTime<Utc>>) -> Self {
        self.captured_at = captured_at;
        self
    }

    /// Returns the in-memory identifier of this snapshot, used for log correlation.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Returns when the context was captured, if known.
    #[must_use]
    pub const fn captured_at(&self) -> Option<DateTime<Utc>> {
        self.captured_at
    }

    /// Returns the execution properties used at capture.
    #[must_use]
    pub const fn properties(&self) -> &ExecutionProperties {
        &self.properties
    }

    /// Returns the metadata identifier of the capturing component.
    #[must_use]
    pub fn metadata_identifier(&self) -> Option<&str> {
        self.metadata_identifier.as_deref()
    }

    /// Iterates over captured entries in capture order.
    pub fn entries(&self) -> impl Iterator<Item = &SnapshotEntry> {
        self.entries.iter()
    }

    /// Returns provider names in capture order.
    #[must_use]
    pub fn provider_names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.provider.as_str()).collect()
    }

    /// Returns the unit captured for a provider.
    #[must_use]
    pub fn get(&self, provider: &str) -> Option<&dyn ThreadContext> {
        self.entries
            .iter()
            .find(|e| e.provider == provider)
            .map(SnapshotEntry::unit)
    }

    /// Returns true if the provider has a captured unit.
    #[must_use]
    pub fn contains(&self, provider: &str) -> bool {
        self.entries.iter().any(|e| e.provider == provider)
    }

    /// Returns the number of captured units.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing was captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns true once the snapshot has been entered.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.entered.load(Ordering::Acquire)
    }

    /// Sets the unit for a provider.
    ///
    /// An existing provider keeps its position; a new provider is appended.
    pub fn upsert(&mut self, provider: impl Into<String>, unit: Box<dyn ThreadContext>) -> Result<()> {
        if self.is_sealed() {
            return Err(ContextError::SnapshotSealed);
        }
        self.put(provider.into(), unit);
        Ok(())
    }

    pub(crate) fn put(&mut self, provider: String, unit: Box<dyn ThreadContext>) {
        match self.entries.iter_mut().find(|e| e.provider == provider) {
            Some(entry) => entry.unit = unit,
            None => self.entries.push(SnapshotEntry { provider, unit }),
        }
    }

    pub(crate) fn seal(&self) {
        self.entered.store(true, Ordering::Release);
    }
}

impl Clone for ContextSnapshot {
    /// Deep-clones every unit. The clone is a new, unsealed snapshot.
    fn clone(&self) -> Self {
        Self {
            id: Uuid::new_v4(),
            captured_at: self.captured_at,
            properties: self.properties.clone(),
            metadata_identifier: self.metadata_identifier.clone(),
            entries: self
                .entries
                .iter()
                .map(|e| SnapshotEntry {
                    provider: e.provider.clone(),
                    unit: e.unit.clone_unit(),
                })
                .collect(),
            entered: AtomicBool::new(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::AmbientUnit;

    fn unit(value: &str) -> Box<dyn ThreadContext> {
        Box::new(AmbientUnit::new("test", Some(value.to_string())))
    }

    fn value_of(snapshot: &ContextSnapshot, provider: &str) -> Option<String> {
        snapshot
            .get(provider)
            .and_then(|u| u.as_any().downcast_ref::<AmbientUnit>())
            .and_then(|u| u.value().map(String::from))
    }

    #[test]
    fn test_upsert_preserves_position_and_appends() {
        let mut snapshot = ContextSnapshot::new(ExecutionProperties::new());
        snapshot.upsert("a", unit("1")).unwrap();
        snapshot.upsert("b", unit("2")).unwrap();
        snapshot.upsert("a", unit("3")).unwrap();
        snapshot.upsert("c", unit("4")).unwrap();

        assert_eq!(snapshot.provider_names(), vec!["a", "b", "c"]);
        assert_eq!(value_of(&snapshot, "a").as_deref(), Some("3"));
    }

    #[test]
    fn test_upsert_after_seal_fails() {
        let mut snapshot = ContextSnapshot::new(ExecutionProperties::new());
        snapshot.upsert("a", unit("1")).unwrap();
        snapshot.seal();

        let err = snapshot.upsert("b", unit("2")).unwrap_err();
        assert!(matches!(err, ContextError::SnapshotSealed));
        assert_eq!(snapshot.len(), 1);
    }

    #[test]
    fn test_clone_is_deep_and_unsealed() {
        let mut snapshot = ContextSnapshot::new(ExecutionProperties::new())
            .with_metadata_identifier(Some("app#mod".to_string()));
        snapshot.upsert("a", unit("1")).unwrap();
        snapshot.seal();

        let mut copy = snapshot.clone();
        assert_ne!(copy.id(), snapshot.id());
        assert!(!copy.is_sealed());
        assert_eq!(copy.metadata_identifier(), Some("app#mod"));

        copy.upsert("a", unit("changed")).unwrap();
        assert_eq!(value_of(&snapshot, "a").as_deref(), Some("1"));
    }
}
