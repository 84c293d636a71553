//! `StrongRef<T>`: an owning, intrusively-refcounted handle to a
//! [`ControlBlock<T>`] — the Rust analogue of `Mso::TCntPtr`/`IUnknown*`.
//! Default-null constructible like a raw-pointer-backed smart pointer,
//! clone increments, drop decrements, and `detach`/`attach` are the one
//! place raw `*mut T` crosses the API boundary, so ownership transfer
//! can be expressed without a reference count bump.

use std::cmp;
use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;
use std::ptr::NonNull;

use crate::interface::{Interface, Opaque, TypeId};
use crate::rc::control_block::{self, ControlBlock};
use crate::rc::weak::WeakRef;

pub struct StrongRef<T: Interface> {
    pub(crate) block: Option<NonNull<ControlBlock<T>>>,
    _marker: PhantomData<T>,
}

// SAFETY: a StrongRef only ever reaches another thread by moving the
// handle itself (never by aliasing the raw pointer), so it's Send/Sync
// exactly when T is, same as std::sync::Arc<T>.
unsafe impl<T: Interface + Sync + Send> Send for StrongRef<T> {}
unsafe impl<T: Interface + Sync + Send> Sync for StrongRef<T> {}

impl<T: Interface> StrongRef<T> {
    /// The default-constructed, null reference.
    pub const fn null() -> Self {
        StrongRef {
            block: None,
            _marker: PhantomData,
        }
    }

    pub fn is_null(&self) -> bool {
        self.block.is_none()
    }

    pub(crate) fn from_block(block: NonNull<ControlBlock<T>>) -> Self {
        StrongRef {
            block: Some(block),
            _marker: PhantomData,
        }
    }

    /// Borrows the pointee, or `None` if this reference is null.
    pub fn get(&self) -> Option<&T> {
        self.block
            .map(|b| unsafe { Deref::deref(&(*b.as_ptr()).value) })
    }

    /// Number of outstanding `StrongRef`s sharing this object, or 0 if null.
    pub fn strong_count(&self) -> usize {
        match self.block {
            Some(b) => unsafe { control_block::strong_count(control_block::header_of(b)) },
            None => 0,
        }
    }

    /// Number of outstanding `WeakRef`s, or 0 if null.
    pub fn weak_count(&self) -> usize {
        match self.block {
            Some(b) => unsafe { control_block::weak_count(control_block::header_of(b)) },
            None => 0,
        }
    }

    /// A non-owning handle to the same object.
    /// # Aborts
    /// Aborts under [`crate::error::Tag::WeakRefUnsupported`] if this
    /// object was made with `RefCountPolicy = StrongOnly`, which never
    /// declared itself downgradable.
    pub fn downgrade(&self) -> WeakRef<T> {
        match self.block {
            Some(b) => {
                let header = control_block::header_of(b);
                if !unsafe { control_block::weak_capable(header) } {
                    crate::error::abort_with_tag(crate::error::Tag::WeakRefUnsupported);
                }
                unsafe { control_block::incr_weak(header) };
                WeakRef::from_block(b)
            }
            None => WeakRef::null(),
        }
    }

    /// COM-style interface query: returns a fresh strong
    /// reference to the same object typed as `U`, or `None` if the object
    /// does not answer to `U::TYPE_ID`. Always `None` on a null reference.
    pub fn query_interface<U: Interface>(&self) -> Option<StrongRef<U>> {
        let block = self.block?;
        let header = control_block::header_of(block);
        if !unsafe { control_block::answers_to(header, U::TYPE_ID) } {
            return None;
        }
        unsafe { control_block::incr_strong(header) };
        Some(StrongRef::from_block(block.cast::<ControlBlock<U>>()))
    }

    /// Whether the underlying object answers to `id`, without producing a
    /// new reference.
    pub fn answers_to(&self, id: TypeId) -> bool {
        match self.block {
            Some(b) => unsafe { control_block::answers_to(control_block::header_of(b), id) },
            None => false,
        }
    }

    /// Erases `T`, yielding a `StrongRef<Opaque>` to the same object.
    /// Consumes `self`; no refcount change.
    pub fn to_opaque(self) -> StrongRef<Opaque> {
        let block = self.block;
        std::mem::forget(self);
        StrongRef {
            block: block.map(NonNull::cast),
            _marker: PhantomData,
        }
    }

    /// Releases ownership, handing back a raw pointer to the value without
    /// decrementing the strong count. Pair with
    /// [`StrongRef::attach`] to hand the pointer back across an FFI-style
    /// boundary and later reclaim ownership.
    pub fn detach(self) -> *mut T {
        let block = self.block.expect("detach of a null StrongRef");
        let ptr = control_block::value_ptr(block);
        std::mem::forget(self);
        ptr
    }

    /// Reclaims ownership of a pointer produced by [`StrongRef::detach`]
    /// without incrementing the strong count.
    ///
    /// # Safety
    /// `ptr` must be the result of a `detach()` call on a `StrongRef<T>`
    /// that has not since been re-attached.
    pub unsafe fn attach(ptr: *mut T) -> Self {
        let block = control_block::block_from_value_ptr(ptr);
        StrongRef::from_block(block)
    }

    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        match (a.block, b.block) {
            (Some(x), Some(y)) => x == y,
            (None, None) => true,
            _ => false,
        }
    }

    pub fn swap(a: &mut Self, b: &mut Self) {
        std::mem::swap(&mut a.block, &mut b.block);
    }
}

impl<T: Interface> Clone for StrongRef<T> {
    fn clone(&self) -> Self {
        if let Some(b) = self.block {
            unsafe { control_block::incr_strong(control_block::header_of(b)) };
        }
        StrongRef {
            block: self.block,
            _marker: PhantomData,
        }
    }
}

impl<T: Interface> Drop for StrongRef<T> {
    fn drop(&mut self) {
        if let Some(b) = self.block {
            unsafe { control_block::decr_strong(control_block::header_of(b)) };
        }
    }
}

impl<T: Interface> Default for StrongRef<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T: Interface> PartialEq for StrongRef<T> {
    fn eq(&self, other: &Self) -> bool {
        Self::ptr_eq(self, other)
    }
}

impl<T: Interface> Eq for StrongRef<T> {}

impl<T: Interface + fmt::Debug> fmt::Debug for StrongRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(v) => f.debug_tuple("StrongRef").field(v).finish(),
            None => f.write_str("StrongRef(null)"),
        }
    }
}

// Pure bookkeeping, no I/O: ordering by control-block identity gives
// StrongRef<T> a total order usable as a map key without requiring T: Ord.
impl<T: Interface> PartialOrd for StrongRef<T> {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: Interface> Ord for StrongRef<T> {
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        let a = self.block.map_or(0, |b| b.as_ptr() as usize);
        let b = other.block.map_or(0, |b| b.as_ptr() as usize);
        a.cmp(&b)
    }
}

#[cfg(test)]
mod tests {
    use crate::fixtures::{DropTally, Gadget, Unrelated, Widget};
    use crate::interface::TypeIdentified;
    use crate::make::{make, make_else_null};
    use crate::policy::{
        AbortOnFailure, DirectConstruct, PropagateFailure, StrongAndWeak, StrongOnly,
        TwoPhaseConstruct,
    };
    use crate::rc::StrongRef;

    fn widget(name: &'static str, tally: &DropTally) -> StrongRef<Widget> {
        make::<Widget, _, StrongOnly, DirectConstruct, AbortOnFailure>((name, tally.clone()))
    }

    #[test]
    fn null_is_default_and_reads_as_null() {
        let r: StrongRef<Widget> = StrongRef::null();
        assert!(r.is_null());
        assert!(r.get().is_none());
        assert_eq!(r.strong_count(), 0);
        assert_eq!(r, StrongRef::default());
    }

    #[test]
    fn clone_increments_and_drop_decrements_strong_count() {
        let tally = DropTally::new();
        let a = widget("gizmo", &tally);
        assert_eq!(a.strong_count(), 1);
        let b = a.clone();
        assert_eq!(a.strong_count(), 2);
        assert_eq!(b.strong_count(), 2);
        drop(b);
        assert_eq!(a.strong_count(), 1);
    }

    #[test]
    fn dropping_the_last_strong_ref_runs_the_destructor_once() {
        let tally = DropTally::new();
        let a = widget("gizmo", &tally);
        let b = a.clone();
        assert_eq!(tally.count(), 0);
        drop(a);
        assert_eq!(tally.count(), 0, "destructor must not run while b is alive");
        drop(b);
        assert_eq!(tally.count(), 1);
    }

    #[test]
    fn query_interface_hits_own_type_and_misses_unrelated() {
        let tally = DropTally::new();
        let a = widget("gizmo", &tally);
        assert!(a.query_interface::<Widget>().is_some());
        assert!(a.query_interface::<Unrelated>().is_none());
        assert!(!a.answers_to(Unrelated::TYPE_ID));
    }

    #[test]
    fn to_opaque_then_query_interface_recovers_the_concrete_type() {
        let tally = DropTally::new();
        let a = widget("gizmo", &tally);
        let opaque = a.to_opaque();
        assert!(opaque.query_interface::<Unrelated>().is_none());
        let back = opaque.query_interface::<Widget>().expect("widget behind opaque");
        assert_eq!(back.get().unwrap().name, "gizmo");
    }

    #[test]
    fn detach_then_attach_round_trips_without_changing_refcount() {
        let tally = DropTally::new();
        let a = widget("gizmo", &tally);
        assert_eq!(a.strong_count(), 1);
        let raw = a.detach();
        let reattached = unsafe { StrongRef::attach(raw) };
        assert_eq!(reattached.strong_count(), 1);
        assert_eq!(reattached.get().unwrap().name, "gizmo");
    }

    #[test]
    fn downgrade_then_upgrade_succeeds_while_strong_refs_remain() {
        let tally = DropTally::new();
        let a = make::<Widget, _, StrongAndWeak, DirectConstruct, AbortOnFailure>((
            "gizmo",
            tally.clone(),
        ));
        let weak = a.downgrade();
        assert!(!weak.is_expired());
        let upgraded = weak.upgrade().expect("object still alive");
        assert_eq!(a.strong_count(), 2);
        drop(upgraded);
        drop(a);
        assert!(weak.is_expired());
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn two_phase_construct_runs_initialize_this() {
        let g = make::<Gadget, _, StrongOnly, TwoPhaseConstruct, AbortOnFailure>(7u32);
        assert_eq!(g.get().unwrap().serial, 7);
    }

    #[test]
    fn make_else_null_propagates_construction_failure_as_none_under_propagate_failure() {
        let tally = DropTally::new();
        let result = make_else_null::<Widget, _, StrongOnly, DirectConstruct, PropagateFailure>((
            "",
            tally.clone(),
        ));
        assert!(result.is_none());
    }

    #[test]
    fn ptr_eq_distinguishes_distinct_objects_and_matches_clones() {
        let tally = DropTally::new();
        let a = widget("gizmo", &tally);
        let b = a.clone();
        let c = widget("other", &tally);
        assert!(StrongRef::ptr_eq(&a, &b));
        assert!(!StrongRef::ptr_eq(&a, &c));
    }
}
