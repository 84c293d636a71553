//! Test-only `Interface` types shared by the `rc`, `make`, and `swarm`
//! test modules, so each doesn't have to invent its own.

#![cfg(test)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::ConstructError;
use crate::interface::Interface;
use crate::policy::InitializeThis;
use crate::Object;

/// Counts drops of whatever fixture value was handed a clone of it,
/// independent of how many `StrongRef`/`WeakRef` handles exist.
#[derive(Clone, Default)]
pub(crate) struct DropTally(Arc<AtomicUsize>);

impl DropTally {
    pub(crate) fn new() -> Self {
        DropTally(Arc::new(AtomicUsize::new(0)))
    }

    pub(crate) fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn mark(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// A one-step-constructible fixture (for `DirectConstruct`), with a
/// `tally` bump on drop so tests can assert the destructor actually ran.
#[derive(Object)]
pub(crate) struct Widget {
    pub(crate) name: &'static str,
    tally: DropTally,
}

impl Interface for Widget {}

impl Drop for Widget {
    fn drop(&mut self) {
        self.tally.mark();
    }
}

impl TryFrom<(&'static str, DropTally)> for Widget {
    type Error = ConstructError;

    fn try_from((name, tally): (&'static str, DropTally)) -> Result<Self, ConstructError> {
        if name.is_empty() {
            return Err(ConstructError::new("widget name must not be empty"));
        }
        Ok(Widget { name, tally })
    }
}

/// A two-phase-constructible fixture (for `TwoPhaseConstruct`).
#[derive(Object, Default)]
pub(crate) struct Gadget {
    pub(crate) serial: u32,
}

impl Interface for Gadget {}

impl InitializeThis<u32> for Gadget {
    fn initialize_this(&mut self, serial: u32) -> Result<(), ConstructError> {
        self.serial = serial;
        Ok(())
    }
}

/// A distinct `Interface` type with no relation to `Widget`/`Gadget`,
/// used to assert `query_interface`/`answers_to` correctly reject
/// unrelated ids.
#[derive(Object, Default)]
pub(crate) struct Unrelated;

impl Interface for Unrelated {}
