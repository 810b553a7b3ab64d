//! Operation adapters that run a unit of work inside a snapshot.
//!
//! A wrapper enters its snapshot before the target runs and exits it
//! afterwards, whether the target returned, failed or panicked. If entry
//! fails the target never runs.

mod callable;
mod methods;
mod proxy;

pub use callable::{ContextualCallable, ContextualRunnable};
pub use methods::{ContextualMethods, BUILTIN_METHODS};
pub use proxy::{ContextualProxy, DispatchError, MethodDispatch};

use crate::context::ContextSnapshot;
use crate::engine::PropagationEngine;
use crate::errors::ContextError;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use thiserror::Error;
use tracing::warn;

/// Error from a contextual invocation.
#[derive(Debug, Error)]
pub enum ContextualError<E> {
    /// Context could not be established or torn down.
    #[error(transparent)]
    Context(#[from] ContextError),

    /// The target itself failed.
    #[error("{0}")]
    Task(E),
}

impl<E> ContextualError<E> {
    /// Returns true if the failure came from context handling.
    #[must_use]
    pub const fn is_context(&self) -> bool {
        matches!(self, Self::Context(_))
    }

    /// Returns the context error, if this is one.
    #[must_use]
    pub const fn context(&self) -> Option<&ContextError> {
        match self {
            Self::Context(err) => Some(err),
            Self::Task(_) => None,
        }
    }

    /// Returns the target's error, if this is one.
    pub fn into_task(self) -> Option<E> {
        match self {
            Self::Task(err) => Some(err),
            Self::Context(_) => None,
        }
    }
}

/// Runs `task` with the snapshot applied.
///
/// The target's own error takes precedence over a teardown error, which is
/// then only logged. A panicking target still gets its context removed before
/// the panic resumes.
pub(crate) fn run_contextual<T, E>(
    engine: &PropagationEngine,
    snapshot: &ContextSnapshot,
    task: impl FnOnce() -> Result<T, E>,
) -> Result<T, ContextualError<E>> {
    let stack = engine.enter(snapshot)?;
    let outcome = catch_unwind(AssertUnwindSafe(task));
    let teardown = engine.exit(stack);

    match outcome {
        Ok(Ok(value)) => teardown.map(|()| value).map_err(ContextualError::Context),
        Ok(Err(err)) => {
            if let Err(teardown_err) = teardown {
                warn!(error = %teardown_err, "Context teardown failed after task error");
            }
            Err(ContextualError::Task(err))
        }
        Err(payload) => {
            if let Err(teardown_err) = teardown {
                warn!(error = %teardown_err, "Context teardown failed after task panic");
            }
            resume_unwind(payload)
        }
    }
}
