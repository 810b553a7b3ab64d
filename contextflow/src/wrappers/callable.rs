//! Single-operation wrappers. These always run with context.

use super::{run_contextual, ContextualError};
use crate::config::ExecutionProperties;
use crate::context::ContextSnapshot;
use crate::engine::PropagationEngine;
use crate::errors::ContextError;
use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;

/// A fallible nullary task bound to a snapshot.
pub struct ContextualCallable<F> {
    engine: Arc<PropagationEngine>,
    snapshot: Arc<ContextSnapshot>,
    task: F,
}

impl<F> ContextualCallable<F> {
    /// Binds a task to a snapshot.
    pub fn new(engine: Arc<PropagationEngine>, snapshot: Arc<ContextSnapshot>, task: F) -> Self {
        Self {
            engine,
            snapshot,
            task,
        }
    }

    /// Returns the execution properties of the snapshot.
    #[must_use]
    pub fn execution_properties(&self) -> &ExecutionProperties {
        self.snapshot.properties()
    }

    /// Returns the snapshot.
    #[must_use]
    pub fn snapshot(&self) -> &Arc<ContextSnapshot> {
        &self.snapshot
    }

    /// Runs the task with the snapshot applied.
    pub fn call<T, E>(&self) -> Result<T, ContextualError<E>>
    where
        F: Fn() -> Result<T, E>,
    {
        run_contextual(&self.engine, &self.snapshot, &self.task)
    }

    /// Runs a one-shot task with the snapshot applied.
    pub fn call_once<T, E>(self) -> Result<T, ContextualError<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        run_contextual(&self.engine, &self.snapshot, self.task)
    }
}

impl<F> fmt::Debug for ContextualCallable<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextualCallable")
            .field("snapshot", &self.snapshot.id())
            .finish_non_exhaustive()
    }
}

/// A side-effecting task bound to a snapshot.
pub struct ContextualRunnable<F> {
    engine: Arc<PropagationEngine>,
    snapshot: Arc<ContextSnapshot>,
    task: F,
}

impl<F> ContextualRunnable<F> {
    /// Binds a task to a snapshot.
    pub fn new(engine: Arc<PropagationEngine>, snapshot: Arc<ContextSnapshot>, task: F) -> Self {
        Self {
            engine,
            snapshot,
            task,
        }
    }

    /// Returns the execution properties of the snapshot.
    #[must_use]
    pub fn execution_properties(&self) -> &ExecutionProperties {
        self.snapshot.properties()
    }

    /// Runs the task with the snapshot applied.
    pub fn run(&self) -> Result<(), ContextError>
    where
        F: Fn(),
    {
        flatten(run_contextual(&self.engine, &self.snapshot, || {
            (self.task)();
            Ok::<(), Infallible>(())
        }))
    }

    /// Runs a one-shot task with the snapshot applied.
    pub fn run_once(self) -> Result<(), ContextError>
    where
        F: FnOnce(),
    {
        let Self {
            engine,
            snapshot,
            task,
        } = self;
        flatten(run_contextual(&engine, &snapshot, || {
            task();
            Ok::<(), Infallible>(())
        }))
    }
}

impl<F> fmt::Debug for ContextualRunnable<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextualRunnable")
            .field("snapshot", &self.snapshot.id())
            .finish_non_exhaustive()
    }
}

fn flatten(result: Result<(), ContextualError<Infallible>>) -> Result<(), ContextError> {
    match result {
        Ok(()) => Ok(()),
        Err(ContextualError::Context(err)) => Err(err),
        Err(ContextualError::Task(never)) => match never {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProviderConfigs, IDENTITY_NAME};
    use crate::testing::{
        ambient_value, set_ambient, FailureMode, Phase, RegistryFixture,
    };
    use pretty_assertions::assert_eq;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn setup() -> (RegistryFixture, Arc<PropagationEngine>, Arc<ContextSnapshot>) {
        let fixture = RegistryFixture::new().provider("sec", &[], true);
        let engine = Arc::new(PropagationEngine::new(fixture.registry()));
        set_ambient("sec", Some("erin"));
        let props = ExecutionProperties::new().with(IDENTITY_NAME, "report");
        let snapshot = engine.capture(props, &ProviderConfigs::new()).unwrap();
        set_ambient("sec", None);
        (fixture, engine, Arc::new(snapshot))
    }

    #[test]
    fn test_callable_runs_with_context() {
        let (_fixture, engine, snapshot) = setup();
        let callable = ContextualCallable::new(engine, snapshot, || {
            Ok::<_, String>(ambient_value("sec"))
        });

        assert_eq!(callable.call().unwrap().as_deref(), Some("erin"));
        assert_eq!(ambient_value("sec"), None);
        assert_eq!(callable.execution_properties().get(IDENTITY_NAME), Some("report"));
    }

    #[test]
    fn test_task_error_passes_through() {
        let (fixture, engine, snapshot) = setup();
        let callable = ContextualCallable::new(engine, snapshot, || Err::<(), _>("declined"));

        let err = callable.call().unwrap_err();
        assert_eq!(err.into_task(), Some("declined"));
        assert_eq!(fixture.journal().providers_for(Phase::Remove), vec!["sec"]);
    }

    #[test]
    fn test_task_error_wins_over_teardown_error() {
        let (fixture, engine, snapshot) = setup();
        fixture.get("sec").fail_on(Phase::Remove, FailureMode::Checked);
        let callable = ContextualCallable::new(engine, snapshot, || Err::<(), _>("declined"));

        assert_eq!(callable.call().unwrap_err().into_task(), Some("declined"));
    }

    #[test]
    fn test_teardown_error_after_success_is_reported() {
        let (fixture, engine, snapshot) = setup();
        fixture.get("sec").fail_on(Phase::Remove, FailureMode::Checked);
        let callable = ContextualCallable::new(engine, snapshot, || Ok::<_, String>(1));

        let err = callable.call().unwrap_err();
        assert!(matches!(err.context(), Some(ContextError::TeardownFailed { .. })));
    }

    #[test]
    fn test_rejected_entry_never_runs_task() {
        let (fixture, engine, snapshot) = setup();
        fixture.get("sec").fail_on(Phase::Apply, FailureMode::Checked);
        let runs = AtomicUsize::new(0);
        let runnable = ContextualRunnable::new(engine, snapshot, || {
            runs.fetch_add(1, Ordering::SeqCst);
        });

        let err = runnable.run().unwrap_err();
        assert!(err.is_rejected());
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_runnable_panic_still_exits() {
        let (fixture, engine, snapshot) = setup();
        let runnable = ContextualRunnable::new(engine, snapshot, || panic!("task blew up"));

        assert!(catch_unwind(AssertUnwindSafe(|| runnable.run())).is_err());
        assert_eq!(fixture.journal().providers_for(Phase::Remove), vec!["sec"]);
        assert_eq!(ambient_value("sec"), None);
    }

    #[test]
    fn test_one_shot_tasks() {
        let (_fixture, engine, snapshot) = setup();
        let owned = String::from("payload");
        let callable = ContextualCallable::new(Arc::clone(&engine), Arc::clone(&snapshot), move || {
            Ok::<_, String>(format!("{owned}:{}", ambient_value("sec").unwrap_or_default()))
        });
        assert_eq!(callable.call_once().unwrap(), "payload:erin");

        let seen = Arc::new(parking_lot::Mutex::new(None));
        let sink = Arc::clone(&seen);
        ContextualRunnable::new(engine, snapshot, move || {
            *sink.lock() = ambient_value("sec");
        })
        .run_once()
        .unwrap();
        assert_eq!(seen.lock().as_deref(), Some("erin"));
    }

    #[test]
    fn test_wrapper_runs_on_another_thread() {
        let (_fixture, engine, snapshot) = setup();
        let callable = ContextualCallable::new(engine, snapshot, || Ok::<_, String>(ambient_value("sec")));

        let seen = std::thread::spawn(move || callable.call().unwrap()).join().unwrap();
        assert_eq!(seen.as_deref(), Some("erin"));
    }
}
