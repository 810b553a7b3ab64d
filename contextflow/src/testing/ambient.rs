//! A provider backed by a thread-local string value.
//!
//! Each provider name owns one slot of thread-local "ambient" state. Capturing
//! reads the slot, applying overwrites it and removing restores the previous
//! value, which makes propagation directly observable from tests.

use crate::config::{ExecutionProperties, ProviderConfig};
use crate::errors::ProviderError;
use crate::providers::{ContextProvider, ThreadContext};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

thread_local! {
    static AMBIENT: RefCell<HashMap<String, String>> = RefCell::new(HashMap::new());
}

/// Sets (or clears, with `None`) the ambient value for a provider on this thread.
pub fn set_ambient(provider: &str, value: Option<&str>) {
    AMBIENT.with(|slots| {
        let mut slots = slots.borrow_mut();
        match value {
            Some(v) => slots.insert(provider.to_string(), v.to_string()),
            None => slots.remove(provider),
        };
    });
}

/// Returns the ambient value for a provider on this thread.
#[must_use]
pub fn ambient_value(provider: &str) -> Option<String> {
    AMBIENT.with(|slots| slots.borrow().get(provider).cloned())
}

/// Provider operations that can be journaled or made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// `ContextProvider::capture`.
    Capture,
    /// `ContextProvider::create_default`.
    Default,
    /// `ThreadContext::apply`.
    Apply,
    /// `ThreadContext::remove`.
    Remove,
    /// `ContextProvider::serialize_unit`.
    Serialize,
    /// `ContextProvider::deserialize_unit`.
    Deserialize,
}

/// How an injected failure manifests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    /// Return [`ProviderError::Runtime`].
    Runtime,
    /// Return [`ProviderError::Failed`].
    Checked,
    /// Panic.
    Panic,
}

/// One journaled provider operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    /// Provider name.
    pub provider: String,
    /// Operation.
    pub phase: Phase,
    /// Value carried by the unit involved.
    pub value: Option<String>,
}

/// Shared, ordered record of provider operations.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<JournalEntry>>>,
}

impl Journal {
    /// Creates an empty journal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, provider: &str, phase: Phase, value: Option<&str>) {
        self.entries.lock().push(JournalEntry {
            provider: provider.to_string(),
            phase,
            value: value.map(String::from),
        });
    }

    /// Returns every entry in order.
    #[must_use]
    pub fn entries(&self) -> Vec<JournalEntry> {
        self.entries.lock().clone()
    }

    /// Returns provider names of the entries for one phase, in order.
    #[must_use]
    pub fn providers_for(&self, phase: Phase) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.phase == phase)
            .map(|e| e.provider.clone())
            .collect()
    }

    /// Clears the journal.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

#[derive(Debug, Default)]
struct FailurePlan {
    failures: Mutex<HashMap<Phase, FailureMode>>,
}

impl FailurePlan {
    fn check(&self, provider: &str, phase: Phase) -> Result<(), ProviderError> {
        let mode = self.failures.lock().get(&phase).copied();
        match mode {
            None => Ok(()),
            Some(FailureMode::Runtime) => Err(ProviderError::runtime(
                provider,
                format!("injected {phase:?} failure"),
            )),
            Some(FailureMode::Checked) => Err(ProviderError::failed(
                provider,
                format!("injected {phase:?} failure"),
            )),
            Some(FailureMode::Panic) => panic!("injected {phase:?} panic in {provider}"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct AmbientPayload {
    value: Option<String>,
}

/// Context unit carrying one ambient value.
#[derive(Debug)]
pub struct AmbientUnit {
    provider: String,
    value: Option<String>,
    previous: Option<Option<String>>,
    journal: Journal,
    plan: Arc<FailurePlan>,
}

impl AmbientUnit {
    /// Creates a detached unit that journals nowhere and never fails.
    #[must_use]
    pub fn new(provider: impl Into<String>, value: Option<String>) -> Self {
        Self {
            provider: provider.into(),
            value,
            previous: None,
            journal: Journal::new(),
            plan: Arc::default(),
        }
    }

    /// Returns the carried value.
    #[must_use]
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }
}

impl ThreadContext for AmbientUnit {
    fn clone_unit(&self) -> Box<dyn ThreadContext> {
        Box::new(Self {
            provider: self.provider.clone(),
            value: self.value.clone(),
            previous: None,
            journal: self.journal.clone(),
            plan: Arc::clone(&self.plan),
        })
    }

    fn apply(&mut self) -> Result<(), ProviderError> {
        self.plan.check(&self.provider, Phase::Apply)?;
        self.previous = Some(ambient_value(&self.provider));
        set_ambient(&self.provider, self.value.as_deref());
        self.journal
            .record(&self.provider, Phase::Apply, self.value.as_deref());
        Ok(())
    }

    fn remove(&mut self) -> Result<(), ProviderError> {
        self.plan.check(&self.provider, Phase::Remove)?;
        let previous = self.previous.take().flatten();
        set_ambient(&self.provider, previous.as_deref());
        self.journal
            .record(&self.provider, Phase::Remove, self.value.as_deref());
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Provider for one ambient slot.
///
/// A configured `"value"` attribute overrides the thread's ambient value at
/// capture. The default context is `default_value` (unset unless configured).
#[derive(Debug)]
pub struct AmbientProvider {
    name: String,
    default_value: Option<String>,
    journal: Journal,
    plan: Arc<FailurePlan>,
}

impl AmbientProvider {
    /// Creates a provider with its own journal.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default_value: None,
            journal: Journal::new(),
            plan: Arc::default(),
        }
    }

    /// Shares a journal with other providers.
    #[must_use]
    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = journal;
        self
    }

    /// Sets the value used for default context.
    #[must_use]
    pub fn with_default_value(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    /// Makes a phase fail from now on.
    pub fn fail_on(&self, phase: Phase, mode: FailureMode) {
        self.plan.failures.lock().insert(phase, mode);
    }

    /// Stops injecting failures.
    pub fn heal(&self) {
        self.plan.failures.lock().clear();
    }

    /// Returns the provider name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the journal.
    #[must_use]
    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    fn unit(&self, value: Option<String>) -> Box<dyn ThreadContext> {
        Box::new(AmbientUnit {
            provider: self.name.clone(),
            value,
            previous: None,
            journal: self.journal.clone(),
            plan: Arc::clone(&self.plan),
        })
    }
}

impl ContextProvider for AmbientProvider {
    fn capture(
        &self,
        _properties: &ExecutionProperties,
        config: Option<&ProviderConfig>,
    ) -> Result<Box<dyn ThreadContext>, ProviderError> {
        self.plan.check(&self.name, Phase::Capture)?;
        let configured = config
            .and_then(|c| c.get("value"))
            .and_then(|v| v.as_str())
            .map(String::from);
        let value = configured.or_else(|| ambient_value(&self.name));
        self.journal.record(&self.name, Phase::Capture, value.as_deref());
        Ok(self.unit(value))
    }

    fn create_default(
        &self,
        _properties: &ExecutionProperties,
    ) -> Result<Box<dyn ThreadContext>, ProviderError> {
        self.plan.check(&self.name, Phase::Default)?;
        self.journal
            .record(&self.name, Phase::Default, self.default_value.as_deref());
        Ok(self.unit(self.default_value.clone()))
    }

    fn serialize_unit(&self, unit: &dyn ThreadContext) -> Result<Vec<u8>, ProviderError> {
        self.plan.check(&self.name, Phase::Serialize)?;
        let unit = unit
            .as_any()
            .downcast_ref::<AmbientUnit>()
            .ok_or_else(|| ProviderError::failed(&self.name, "unit was not created by this provider"))?;
        let payload = AmbientPayload {
            value: unit.value.clone(),
        };
        serde_json::to_vec(&payload)
            .map_err(|e| ProviderError::with_source(&self.name, "cannot serialize unit", e))
    }

    fn deserialize_unit(&self, bytes: &[u8]) -> Result<Box<dyn ThreadContext>, ProviderError> {
        self.plan.check(&self.name, Phase::Deserialize)?;
        let payload: AmbientPayload = serde_json::from_slice(bytes)
            .map_err(|e| ProviderError::with_source(&self.name, "cannot deserialize unit", e))?;
        Ok(self.unit(payload.value))
    }
}
