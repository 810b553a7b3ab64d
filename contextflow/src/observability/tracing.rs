//! Structured logging setup and timing helpers.
//!
//! The engine logs through `tracing` macros. Applications that do not install
//! their own subscriber can call [`init_tracing`].

use std::time::Instant;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "contextflow=info";

/// The global subscriber could not be installed.
#[derive(Debug, Error)]
#[error("Failed to install tracing subscriber: {0}")]
pub struct TracingInitError(#[source] Box<dyn std::error::Error + Send + Sync + 'static>);

/// Installs a global fmt subscriber filtered by `RUST_LOG`.
///
/// Returns an error if a global subscriber is already installed.
pub fn try_init_tracing(json: bool) -> Result<(), TracingInitError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(TracingInitError)
}

/// Installs a global fmt subscriber, ignoring an already-installed one.
pub fn init_tracing() {
    if let Err(err) = try_init_tracing(false) {
        tracing::debug!(%err, "Tracing subscriber already installed");
    }
}

/// Simple span timing helper.
#[derive(Debug)]
pub struct SpanTimer {
    start: Instant,
    name: &'static str,
}

impl SpanTimer {
    /// Starts a new span timer.
    #[must_use]
    pub fn start(name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            name,
        }
    }

    /// Returns the elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Returns the span name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Finishes the span and returns the duration.
    #[must_use]
    pub fn finish(self) -> f64 {
        self.elapsed_ms()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_timer() {
        let timer = SpanTimer::start("context.enter");
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert_eq!(timer.name(), "context.enter");
        assert!(timer.finish() >= 5.0);
    }

    #[test]
    fn test_init_tracing_is_idempotent() {
        init_tracing();
        init_tracing();
        tracing::info!("still alive");
    }

    #[test]
    fn test_second_install_reports_typed_error() {
        let _ = try_init_tracing(false);
        let err = try_init_tracing(true).unwrap_err();
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().starts_with("Failed to install tracing subscriber"));
    }
}
