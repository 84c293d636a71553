//! The object factory: allocate a control block, run the
//! chosen [`MakePolicy`], and leave a fully-initialized object behind a
//! [`StrongRef`] — or unwind cleanly back to [`FailurePolicy`] if either
//! step fails.

use std::ptr::NonNull;

use crate::error::Tag;
use crate::interface::Interface;
use crate::policy::{FailurePolicy, MakePolicy, RefCountPolicy};
use crate::rc::control_block::{self, ControlBlock};
use crate::rc::StrongRef;

/// Deallocates an uninitialized control block if dropped before
/// `disarm()` is called, so a panicking constructor can't leak the
/// allocation.
struct MakeGuard<T: Interface> {
    block: Option<NonNull<ControlBlock<T>>>,
}

impl<T: Interface> MakeGuard<T> {
    fn disarm(&mut self) {
        self.block = None;
    }
}

impl<T: Interface> Drop for MakeGuard<T> {
    fn drop(&mut self) {
        if let Some(block) = self.block.take() {
            unsafe { control_block::dealloc_uninit(block) };
        }
    }
}

/// Builds a new `T` from `args` using policy `M`, places it behind a
/// freshly allocated control block configured by `R`, and returns an
/// owning [`StrongRef<T>`]. On allocation or construction failure, control
/// passes to `F::on_failure`.
///
/// Type parameters are meant to be given explicitly at the call site —
/// `make::<Widget, _, StrongAndWeak, DirectConstruct, AbortOnFailure>(args)` —
/// since inference has nothing to go on for `R`/`M`/`F`.
pub fn make<T, Args, R, M, F>(args: Args) -> StrongRef<T>
where
    T: Interface,
    R: RefCountPolicy,
    M: MakePolicy<T, Args>,
    F: FailurePolicy,
{
    let block = match control_block::allocate::<T>(R::RESERVE_WEAK) {
        Some(block) => block,
        None => return F::on_failure(Tag::AllocationFailure),
    };
    let mut guard = MakeGuard { block: Some(block) };

    let value = match M::construct(args) {
        Ok(value) => value,
        Err(_) => return F::on_failure(Tag::ConstructionFailure),
    };

    // SAFETY: `block`'s `value` field is allocated-but-uninitialized up to
    // this point; this is the one write that initializes it.
    unsafe { std::ptr::write(control_block::value_ptr(block), value) };
    guard.disarm();

    StrongRef::from_block(block)
}

/// `make`'s allocation-side escape hatch: allocation failure always
/// becomes `None` here, regardless of `F`, since there is no block to
/// hand `F::on_failure` a `StrongRef` into in the first place. Construction
/// failure is a separate axis and still follows the caller's `F` — an
/// `AbortOnFailure` caller still aborts on a failed constructor even
/// through `make_else_null`; only `F = PropagateFailure` turns that into
/// `None` too.
pub fn make_else_null<T, Args, R, M, F>(args: Args) -> Option<StrongRef<T>>
where
    T: Interface,
    R: RefCountPolicy,
    M: MakePolicy<T, Args>,
    F: FailurePolicy,
{
    let block = control_block::allocate::<T>(R::RESERVE_WEAK)?;
    let mut guard = MakeGuard { block: Some(block) };

    let value = match M::construct(args) {
        Ok(value) => value,
        Err(_) => {
            let result = F::on_failure(Tag::ConstructionFailure);
            return if result.is_null() { None } else { Some(result) };
        }
    };

    // SAFETY: `block`'s `value` field is allocated-but-uninitialized up to
    // this point; this is the one write that initializes it.
    unsafe { std::ptr::write(control_block::value_ptr(block), value) };
    guard.disarm();

    Some(StrongRef::from_block(block))
}
