//! Fatal-abort and recoverable-error surfaces: an unrecoverable
//! condition aborts the process under a named [`Tag`]; a recoverable one
//! propagates through a [`ConstructError`] return value instead.

use std::fmt;

/// Identifies a specific fatal checkpoint, for diagnosability. Named here
/// instead of left as raw integers, since this crate, unlike the
/// component it's modeled on, has no host-side tag registry to look
/// numbers up in.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    AllocationFailure,
    ConstructionFailure,
    StrongIncrementFromZero,
    RefcountUnderflow,
    SwarmDoubleAdd,
    /// `downgrade()` called on an object made with `RefCountPolicy =
    /// StrongOnly`, which never declared itself downgradable.
    WeakRefUnsupported,
    PostAfterShutdownMisuse,
    /// Unreachable by construction: a worker never blocks on its own
    /// `await_termination` because it detaches itself first. Kept as a
    /// documented invariant check for conditions that must never occur.
    DeadlockInAwaitTermination,
    /// A posted task panicked. Not fatal by itself — the scheduler
    /// catches it and keeps running — but logged under this tag so a
    /// `verbose` build surfaces it the same way other checkpoints do.
    DispatchTaskPanic,
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Unconditionally aborts the process, reporting `tag` on the way out.
///
/// This is the crate's single fatal-error entry point: every unrecoverable
/// condition reports a tag and aborts. There is no `panic!` +
/// `catch_unwind` escape hatch here on purpose: callers that want a
/// recoverable error use `ConstructError` instead and route through a
/// `FailurePolicy` (see [`crate::policy`]).
#[cold]
#[inline(never)]
pub fn abort_with_tag(tag: Tag) -> ! {
    crate::log!(abort_with_tag, Red, tag, "fatal: aborting process ({})", tag);
    std::process::abort();
}

/// A user constructor (or `initialize_this`) failed. Carries a message for
/// diagnostics; this crate does not attempt to model a taxonomy of
/// construction failure causes, since those are entirely up to the type
/// being constructed.
#[derive(Debug, Clone)]
pub struct ConstructError(pub String);

impl ConstructError {
    pub fn new(msg: impl Into<String>) -> Self {
        ConstructError(msg.into())
    }
}

impl fmt::Display for ConstructError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "construction failed: {}", self.0)
    }
}

impl std::error::Error for ConstructError {}
