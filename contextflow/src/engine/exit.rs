//! Tearing down applied context.

use super::{guarded, Failure, PropagationEngine};
use crate::context::{AppliedContextStack, AppliedUnit};
use crate::errors::{ContextError, Result};
use crate::observability::SpanTimer;
use tracing::{debug, warn};

impl PropagationEngine {
    /// Removes the units an `enter` call applied, in reverse application order.
    ///
    /// Every unit gets its removal attempt even if earlier removals fail. The
    /// first failure is reported afterwards: unchecked provider errors as-is,
    /// checked ones as [`ContextError::TeardownFailed`], panics by resuming
    /// the unwind.
    pub fn exit(&self, stack: AppliedContextStack) -> Result<()> {
        let timer = SpanTimer::start("context.exit");
        let snapshot_id = stack.snapshot_id();
        let mut failures: Vec<Failure> = Vec::new();

        for AppliedUnit { provider, mut unit } in stack.take_units().into_iter().rev() {
            match guarded(|| unit.remove()) {
                Ok(()) => debug!(provider = %provider, "Removed context"),
                Err(failure) => {
                    warn!(
                        %snapshot_id,
                        provider = %provider,
                        failure = %failure.describe(),
                        "Context provider failed during exit; continuing teardown"
                    );
                    failures.push(failure);
                }
            }
        }

        debug!(%snapshot_id, failures = failures.len(), duration_ms = timer.finish(), "Exited thread context");

        let additional_failures = failures.len().saturating_sub(1);
        match failures.into_iter().next() {
            None => Ok(()),
            Some(Failure::Panic(payload)) => std::panic::resume_unwind(payload),
            Some(Failure::Error(err)) if err.is_runtime() => Err(ContextError::Provider(err)),
            Some(Failure::Error(source)) => Err(ContextError::TeardownFailed {
                source,
                additional_failures,
            }),
        }
    }
}
