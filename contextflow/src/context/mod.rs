//! Captured and applied thread context.
//!
//! This module provides:
//! - Snapshots of captured context units
//! - The per-thread record of applied units
//! - Component metadata used for availability checks

mod applied;
mod metadata;
mod snapshot;

pub(crate) use applied::AppliedUnit;
pub use applied::AppliedContextStack;
pub use metadata::{
    ComponentMetadata, ComponentScope, DeployedComponents, MetadataIdentifier,
    NoComponentMetadata,
};
#[cfg(test)]
pub use metadata::MockComponentMetadata;
pub use snapshot::{ContextSnapshot, SnapshotEntry};
