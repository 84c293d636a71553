//! Policy types selected at the call site of [`crate::make::make`]:
//! how a constructed object's control block reserves refcount slots,
//! how its value gets built, and what happens on failure. Rust generics
//! over zero-sized marker types stand in for compile-time template
//! parameters; no dynamic dispatch is involved.

use crate::error::{ConstructError, Tag};
use crate::interface::Interface;
use crate::rc::StrongRef;

/// Whether a freshly made object's control block ever expects to be
/// downgraded. `StrongOnly` objects still carry both counters in memory
/// (see DESIGN.md for why the one-counter layout isn't pursued), but
/// `downgrade()` on one is a declared-impossible call: it aborts under
/// [`crate::error::Tag::WeakRefUnsupported`] rather than silently handing
/// out a `WeakRef` the caller never asked the type to support.
pub trait RefCountPolicy {
    const RESERVE_WEAK: bool;
}

/// Only strong references are expected; `downgrade()` aborts.
pub struct StrongOnly;
impl RefCountPolicy for StrongOnly {
    const RESERVE_WEAK: bool = false;
}

/// Both strong and weak references are expected; `downgrade()` succeeds.
pub struct StrongAndWeak;
impl RefCountPolicy for StrongAndWeak {
    const RESERVE_WEAK: bool = true;
}

/// How `make` turns constructor arguments into a `T`. Selected as a type
/// parameter rather than an enum value so the compiler can devirtualize
/// and monomorphize the chosen strategy per call site.
pub trait MakePolicy<T, Args> {
    fn construct(args: Args) -> Result<T, ConstructError>;
}

/// `T` is constructed in one step from `Args` via `TryFrom`.
pub struct DirectConstruct;
impl<T, Args> MakePolicy<T, Args> for DirectConstruct
where
    T: TryFrom<Args, Error = ConstructError>,
{
    fn construct(args: Args) -> Result<T, ConstructError> {
        T::try_from(args)
    }
}

/// Two-phase construction: `T::default()` followed by `initialize_this`,
/// for objects whose constructor needs a stable `self` address before it
/// can fully set itself up (self-referential fields, registering `self`
/// with a collaborator).
pub trait InitializeThis<Args> {
    fn initialize_this(&mut self, args: Args) -> Result<(), ConstructError>;
}

pub struct TwoPhaseConstruct;
impl<T, Args> MakePolicy<T, Args> for TwoPhaseConstruct
where
    T: Default + InitializeThis<Args>,
{
    fn construct(args: Args) -> Result<T, ConstructError> {
        let mut value = T::default();
        value.initialize_this(args)?;
        Ok(value)
    }
}

/// What happens when allocation or construction fails.
pub trait FailurePolicy {
    fn on_failure<T: Interface>(reason: Tag) -> StrongRef<T>;
}

/// Failure is unrecoverable: abort the process.
pub struct AbortOnFailure;
impl FailurePolicy for AbortOnFailure {
    fn on_failure<T: Interface>(reason: Tag) -> StrongRef<T> {
        crate::error::abort_with_tag(reason)
    }
}

/// Failure is recoverable: hand back a null `StrongRef` instead of
/// aborting. Pass this to [`crate::make::make_else_null`] to also turn a
/// construction failure into `None` (allocation failure is `None` there
/// regardless of `F`).
pub struct PropagateFailure;
impl FailurePolicy for PropagateFailure {
    fn on_failure<T: Interface>(_reason: Tag) -> StrongRef<T> {
        StrongRef::null()
    }
}
