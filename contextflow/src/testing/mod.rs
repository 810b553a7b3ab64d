//! Testing utilities for context propagation.
//!
//! This module provides:
//! - An ambient-value provider with failure injection
//! - A shared journal of provider operations
//! - A registry fixture

mod ambient;
mod fixtures;

pub use ambient::{
    ambient_value, set_ambient, AmbientProvider, AmbientUnit, FailureMode, Journal,
    JournalEntry, Phase,
};
pub use fixtures::RegistryFixture;
