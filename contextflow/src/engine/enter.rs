//! Establishing a snapshot on the current thread.

use super::{guarded, Failure, PropagationEngine};
use crate::config::{DefaultContext, ExecutionProperties};
use crate::context::{AppliedContextStack, AppliedUnit, ContextSnapshot, MetadataIdentifier};
use crate::errors::{ContextError, Result};
use crate::observability::SpanTimer;
use crate::providers::{ProviderRegistration, ThreadContext};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// A provider waiting to be applied, with its captured unit or `None` for default context.
struct Pending<'s> {
    registration: Arc<ProviderRegistration>,
    captured: Option<&'s dyn ThreadContext>,
}

impl PropagationEngine {
    /// Installs a snapshot's context on the calling thread.
    ///
    /// Providers are applied in snapshot order, except that a provider is
    /// never applied before its prerequisites. If anything fails, every unit
    /// applied so far is removed in reverse order before the error is
    /// returned; the caller never receives a partially applied stack.
    ///
    /// Unchecked provider failures are returned as-is and provider panics
    /// resume after rollback. Everything else is wrapped in
    /// [`ContextError::Rejected`].
    pub fn enter(&self, snapshot: &ContextSnapshot) -> Result<AppliedContextStack> {
        let timer = SpanTimer::start("context.enter");
        snapshot.seal();

        let properties = snapshot.properties();
        let pending = self
            .check_available(snapshot)
            .and_then(|()| self.pending_units(snapshot))
            .map_err(|err| {
                error!(snapshot_id = %snapshot.id(), %err, "Unable to establish thread context");
                ContextError::rejected(err)
            })?;

        let applied = self.apply_in_prerequisite_order(snapshot, pending, properties)?;

        let stack = AppliedContextStack::new(snapshot.id(), applied);
        debug!(
            snapshot_id = %snapshot.id(),
            applied = ?stack.provider_names(),
            duration_ms = timer.finish(),
            "Entered thread context"
        );
        Ok(stack)
    }

    fn check_available(&self, snapshot: &ContextSnapshot) -> Result<()> {
        let properties = snapshot.properties();
        let Some(raw) = snapshot.metadata_identifier() else {
            return Ok(());
        };
        if !properties.require_available_app() {
            return Ok(());
        }

        let identifier = MetadataIdentifier::parse(raw)?;
        if self.metadata.is_available(&identifier) {
            return Ok(());
        }

        let (scope, name) = identifier.most_specific();
        Err(ContextError::Unavailable {
            task: properties.task_name(),
            scope,
            name: name.to_string(),
        })
    }

    /// Resolves captured entries and default-context providers to live providers.
    fn pending_units<'s>(&self, snapshot: &'s ContextSnapshot) -> Result<Vec<Pending<'s>>> {
        let properties = snapshot.properties();
        let mut pending = Vec::with_capacity(snapshot.len());

        for entry in snapshot.entries() {
            match self.registry.lookup(entry.provider()) {
                Some(registration) => pending.push(Pending {
                    registration,
                    captured: Some(entry.unit()),
                }),
                None if self.placeholders.is_cleared(entry.provider()) => {
                    debug!(provider = entry.provider(), "Skipping intentionally cleared context");
                }
                None => {
                    return Err(ContextError::UnresolvedProvider {
                        name: entry.provider().to_string(),
                    });
                }
            }
        }

        if properties.default_context()? != DefaultContext::None {
            let skipped: HashSet<String> = properties.skipped_providers().into_iter().collect();
            for name in self.registry.all_names() {
                if skipped.contains(&name) || snapshot.contains(&name) {
                    continue;
                }
                // A provider unregistered since all_names() was never required.
                if let Some(registration) = self.registry.lookup(&name) {
                    pending.push(Pending {
                        registration,
                        captured: None,
                    });
                }
            }
        }

        Ok(pending)
    }

    /// Applies pending units in repeated passes until all are applied or a pass stalls.
    fn apply_in_prerequisite_order(
        &self,
        snapshot: &ContextSnapshot,
        mut pending: Vec<Pending<'_>>,
        properties: &ExecutionProperties,
    ) -> Result<Vec<AppliedUnit>> {
        let mut applied: Vec<AppliedUnit> = Vec::with_capacity(pending.len());
        let mut applied_names: HashSet<String> = HashSet::with_capacity(pending.len());

        while !pending.is_empty() {
            let before = pending.len();
            let mut deferred = Vec::with_capacity(before);

            for item in std::mem::take(&mut pending) {
                let ready = item
                    .registration
                    .prerequisites()
                    .iter()
                    .all(|p| applied_names.contains(p));
                if !ready {
                    deferred.push(item);
                    continue;
                }

                let name = item.registration.name().to_string();
                match Self::apply_one(&item, properties) {
                    Ok(unit) => {
                        debug!(provider = %name, default = item.captured.is_none(), "Applied context");
                        applied_names.insert(name.clone());
                        applied.push(AppliedUnit {
                            provider: name,
                            unit,
                        });
                    }
                    Err(failure) => {
                        error!(
                            snapshot_id = %snapshot.id(),
                            provider = %name,
                            failure = %failure.describe(),
                            "Context provider failed during entry; rolling back"
                        );
                        rollback(applied);
                        return Err(propagate(failure));
                    }
                }
            }

            if deferred.len() == before {
                let stuck: Vec<String> = deferred
                    .iter()
                    .map(|p| p.registration.name().to_string())
                    .collect();
                error!(snapshot_id = %snapshot.id(), ?stuck, "Context provider prerequisites cannot be satisfied");
                rollback(applied);
                return Err(ContextError::rejected(ContextError::DependencyDeadlock { stuck }));
            }
            pending = deferred;
        }

        Ok(applied)
    }

    fn apply_one(
        item: &Pending<'_>,
        properties: &ExecutionProperties,
    ) -> Result<Box<dyn ThreadContext>, Failure> {
        guarded(|| {
            let mut unit = match item.captured {
                Some(captured) => captured.clone_unit(),
                None => item.registration.provider().create_default(properties)?,
            };
            unit.apply()?;
            Ok(unit)
        })
    }
}

/// Removes applied units in reverse order. Failures are logged and swallowed.
fn rollback(applied: Vec<AppliedUnit>) {
    for AppliedUnit { provider, mut unit } in applied.into_iter().rev() {
        match guarded(|| unit.remove()) {
            Ok(()) => debug!(provider = %provider, "Rolled back context"),
            Err(failure) => warn!(
                provider = %provider,
                failure = %failure.describe(),
                "Ignoring failure while rolling back context"
            ),
        }
    }
}

/// Converts a provider failure into the error returned from `enter`.
///
/// Panics resume unwinding.
fn propagate(failure: Failure) -> ContextError {
    match failure {
        Failure::Error(err) => ContextError::rejected(ContextError::Provider(err)),
        Failure::Panic(payload) => std::panic::resume_unwind(payload),
    }
}
