//! # Contextflow
//!
//! Capture the ambient execution context of one thread and re-establish it on
//! another.
//!
//! Contextflow provides:
//!
//! - **Pluggable providers**: each [`ContextProvider`](providers::ContextProvider)
//!   owns one kind of ambient state (security principal, transaction, locale...)
//! - **Snapshots**: an ordered bundle of captured units that can be entered
//!   any number of times, concurrently, on any thread
//! - **Prerequisite-aware entry**: providers are applied after the providers they
//!   depend on, with full rollback if anything fails
//! - **Symmetric teardown**: exit removes exactly what entry applied, in reverse
//! - **Serialization**: a forward-compatible byte envelope for persisted tasks
//! - **Wrappers**: callables, runnables and method-level proxies that run inside
//!   a snapshot
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use contextflow::prelude::*;
//!
//! let service = ContextService::new(ContextServiceConfig::new("jobs"), registry)?;
//!
//! // On the submitting thread
//! let task = service.contextual_callable(&ExecutionProperties::new(), || run_report())?;
//!
//! // On a worker thread
//! let report = task.call()?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod codec;
pub mod config;
pub mod context;
pub mod engine;
pub mod errors;
pub mod observability;
pub mod providers;
pub mod service;
pub mod testing;
pub mod wrappers;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::codec::SnapshotCodec;
    pub use crate::config::{
        ContextServiceConfig, DefaultContext, ExecutionProperties, ProviderConfig,
        ProviderConfigs,
    };
    pub use crate::context::{
        AppliedContextStack, ComponentMetadata, ContextSnapshot, DeployedComponents,
        MetadataIdentifier,
    };
    pub use crate::engine::PropagationEngine;
    pub use crate::errors::{ContextError, ProviderError, Result};
    pub use crate::providers::{
        global_registry, ClearedPlaceholders, ContextProvider, ProviderRegistry, ThreadContext,
    };
    pub use crate::service::ContextService;
    pub use crate::wrappers::{
        ContextualCallable, ContextualError, ContextualMethods, ContextualProxy,
        ContextualRunnable, MethodDispatch,
    };
}
