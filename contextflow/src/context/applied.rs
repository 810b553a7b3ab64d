//! Context applied to the current thread by one `enter` call.

use crate::providers::ThreadContext;
use std::marker::PhantomData;
use tracing::warn;
use uuid::Uuid;

/// A unit installed on the current thread.
#[derive(Debug)]
pub(crate) struct AppliedUnit {
    pub(crate) provider: String,
    pub(crate) unit: Box<dyn ThreadContext>,
}

/// The units one `enter` call installed, in application order.
///
/// The stack is bound to the thread that created it (it is neither `Send` nor
/// `Sync`) and is consumed by `exit`, so it cannot be reused afterwards.
#[derive(Debug)]
pub struct AppliedContextStack {
    snapshot_id: Uuid,
    units: Vec<AppliedUnit>,
    _thread_bound: PhantomData<*const ()>,
}

impl AppliedContextStack {
    pub(crate) fn new(snapshot_id: Uuid, units: Vec<AppliedUnit>) -> Self {
        Self {
            snapshot_id,
            units,
            _thread_bound: PhantomData,
        }
    }

    /// Returns the id of the snapshot this stack was entered from.
    #[must_use]
    pub const fn snapshot_id(&self) -> Uuid {
        self.snapshot_id
    }

    /// Returns provider names in the order they were applied.
    #[must_use]
    pub fn provider_names(&self) -> Vec<&str> {
        self.units.iter().map(|u| u.provider.as_str()).collect()
    }

    /// Returns the number of applied units.
    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Returns true if nothing was applied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub(crate) fn take_units(mut self) -> Vec<AppliedUnit> {
        std::mem::take(&mut self.units)
    }
}

impl Drop for AppliedContextStack {
    fn drop(&mut self) {
        if !self.units.is_empty() {
            warn!(
                snapshot_id = %self.snapshot_id,
                providers = ?self.provider_names(),
                "Applied context dropped without exit; thread context was not restored"
            );
        }
    }
}
