//! The control block: the strong/weak counter pair plus destroy/free
//! dispatch, shared by every reference to an object. Places the counters
//! *before* the user value in a single allocation, so a raw pointer to
//! the value can recover its owning block with a fixed negative offset.

use std::alloc::Layout;
use std::mem::ManuallyDrop;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{abort_with_tag, Tag};
use crate::interface::{Interface, TypeId};
use crate::sys_alloc::{SysAllocator, GLOBAL};
use crate::util::Backoff;

/// Upper bound on either counter: once it gets anywhere near here
/// something has leaked reference bookkeeping, and continuing to
/// increment risks silent wraparound.
const MAX_REFCOUNT: usize = (isize::MAX) as usize;

pub(crate) struct ObjectVTable {
    pub(crate) drop_value: unsafe fn(NonNull<ControlBlockHeader>),
    pub(crate) dealloc: unsafe fn(NonNull<ControlBlockHeader>),
    pub(crate) query: unsafe fn(TypeId) -> bool,
}

#[repr(C)]
pub(crate) struct ControlBlockHeader {
    pub(crate) strong: AtomicUsize,
    pub(crate) weak: AtomicUsize,
    pub(crate) vtable: &'static ObjectVTable,
    /// Set from `RefCountPolicy::RESERVE_WEAK` at `allocate` time.
    /// `downgrade()` aborts rather than handing out a `WeakRef` when this
    /// is `false` (see `rc::strong::StrongRef::downgrade`).
    pub(crate) weak_capable: bool,
}

/// `#[repr(C)]` guarantees `header` sits at offset 0 regardless of `T`,
/// which is what lets [`crate::interface::Opaque`] erasure work: casting
/// a `NonNull<ControlBlock<T>>` to `NonNull<ControlBlock<Opaque>>` and
/// only ever touching `.header` through it is sound for any `T`.
#[repr(C)]
pub(crate) struct ControlBlock<T> {
    pub(crate) header: ControlBlockHeader,
    pub(crate) value: ManuallyDrop<T>,
}

unsafe fn drop_value<T>(header: NonNull<ControlBlockHeader>) {
    let block = header.cast::<ControlBlock<T>>();
    let value_ptr = &mut (*block.as_ptr()).value as *mut ManuallyDrop<T> as *mut T;
    std::ptr::drop_in_place(value_ptr);
}

unsafe fn dealloc_block<T>(header: NonNull<ControlBlockHeader>) {
    let block = header.cast::<ControlBlock<T>>();
    let layout = Layout::new::<ControlBlock<T>>();
    GLOBAL.free(block.cast::<u8>(), layout.size(), layout.align());
}

unsafe fn query_block<T: Interface>(id: TypeId) -> bool {
    T::answers_to(id)
}

/// Gives every `Interface` type its own `ObjectVTable`, one instance per
/// monomorphization, via a generic associated const — the usual
/// workaround for "a `static` can't be generic": the const's value is a
/// promotable constant expression (three function pointers, no interior
/// mutability), so `&T::VTABLE` is a `'static` reference produced by
/// constant promotion, with no runtime initialization or allocation.
trait VTableHolder: Interface {
    const VTABLE: ObjectVTable;
}

impl<T: Interface> VTableHolder for T {
    const VTABLE: ObjectVTable = ObjectVTable {
        drop_value: drop_value::<T>,
        dealloc: dealloc_block::<T>,
        query: query_block::<T>,
    };
}

pub(crate) fn vtable<T: Interface>() -> &'static ObjectVTable {
    &<T as VTableHolder>::VTABLE
}

/// Allocates a `ControlBlock<T>` with strong = 1 and weak = 1, leaving
/// `value` uninitialized. Returns `None` on allocation failure — callers
/// decide whether that's fatal (see `make::make`).
///
/// Weak always starts at 1, the same way `std::sync::Arc` does: every
/// live strong reference collectively holds one implicit weak reference,
/// released only once the strong count reaches zero, so the allocation
/// is never freed out from under the object while it's still alive. Both
/// counters are always present regardless of `reserve_weak` (the control
/// block's memory layout does not shrink for `StrongOnly` — see
/// DESIGN.md); `reserve_weak`, driven by [`crate::policy::RefCountPolicy`],
/// is recorded in `weak_capable` instead and checked by `downgrade()`,
/// which aborts rather than silently handing out a `WeakRef` a
/// `StrongOnly` object never declared it supports.
pub(crate) fn allocate<T: Interface>(reserve_weak: bool) -> Option<NonNull<ControlBlock<T>>> {
    let layout = Layout::new::<ControlBlock<T>>();
    let raw = GLOBAL.allocate(layout.size(), layout.align())?;
    let block = raw.cast::<ControlBlock<T>>();
    unsafe {
        std::ptr::write(
            &mut (*block.as_ptr()).header,
            ControlBlockHeader {
                strong: AtomicUsize::new(1),
                weak: AtomicUsize::new(1),
                vtable: vtable::<T>(),
                weak_capable: reserve_weak,
            },
        );
    }
    Some(block)
}

#[inline]
pub(crate) unsafe fn weak_capable(header: NonNull<ControlBlockHeader>) -> bool {
    (*header.as_ptr()).weak_capable
}

/// Frees a block allocated by `allocate` whose `value` was never written
/// (used by the factory's unwind guard).
pub(crate) unsafe fn dealloc_uninit<T: Interface>(block: NonNull<ControlBlock<T>>) {
    let layout = Layout::new::<ControlBlock<T>>();
    GLOBAL.free(block.cast::<u8>(), layout.size(), layout.align());
}

#[inline]
pub(crate) fn header_of<T>(block: NonNull<ControlBlock<T>>) -> NonNull<ControlBlockHeader> {
    block.cast()
}

#[inline]
pub(crate) unsafe fn incr_strong(header: NonNull<ControlBlockHeader>) {
    let prev = (*header.as_ptr()).strong.fetch_add(1, Ordering::Relaxed);
    if prev == 0 {
        abort_with_tag(Tag::StrongIncrementFromZero);
    }
    if prev > MAX_REFCOUNT {
        abort_with_tag(Tag::RefcountUnderflow);
    }
}

#[inline]
pub(crate) unsafe fn incr_weak(header: NonNull<ControlBlockHeader>) {
    (*header.as_ptr()).weak.fetch_add(1, Ordering::Relaxed);
}

/// Strong count reaching zero: runs destroy-object exactly once, then
/// releases the control block's own "weak while strong > 0" reservation.
pub(crate) unsafe fn decr_strong(header: NonNull<ControlBlockHeader>) {
    let h = &*header.as_ptr();
    if h.strong.fetch_sub(1, Ordering::Release) != 1 {
        return;
    }
    std::sync::atomic::fence(Ordering::Acquire);
    (h.vtable.drop_value)(header);
    decr_weak(header);
}

/// Weak count reaching zero: frees the backing allocation exactly once.
pub(crate) unsafe fn decr_weak(header: NonNull<ControlBlockHeader>) {
    let h = &*header.as_ptr();
    if h.weak.fetch_sub(1, Ordering::Release) != 1 {
        return;
    }
    std::sync::atomic::fence(Ordering::Acquire);
    (h.vtable.dealloc)(header);
}

/// `WeakRef::upgrade`: CAS-loop the strong counter up by one, refusing to
/// increment from zero so an expired object can never be resurrected.
pub(crate) unsafe fn try_upgrade(header: NonNull<ControlBlockHeader>) -> bool {
    let strong = &(*header.as_ptr()).strong;
    let mut current = strong.load(Ordering::Relaxed);
    let mut backoff = Backoff::new();
    loop {
        if current == 0 {
            return false;
        }
        if current > MAX_REFCOUNT {
            abort_with_tag(Tag::RefcountUnderflow);
        }
        match strong.compare_exchange_weak(
            current,
            current + 1,
            Ordering::Acquire,
            Ordering::Relaxed,
        ) {
            Ok(_) => return true,
            Err(observed) => {
                current = observed;
                backoff.spin();
            }
        }
    }
}

#[inline]
pub(crate) unsafe fn strong_count(header: NonNull<ControlBlockHeader>) -> usize {
    (*header.as_ptr()).strong.load(Ordering::SeqCst)
}

#[inline]
pub(crate) unsafe fn weak_count(header: NonNull<ControlBlockHeader>) -> usize {
    let h = &*header.as_ptr();
    let weak = h.weak.load(Ordering::SeqCst);
    // The block reserves one implicit weak while strong > 0;
    // callers comparing against "outstanding weak references" typically
    // want that reservation hidden.
    if h.strong.load(Ordering::SeqCst) > 0 {
        weak.saturating_sub(1)
    } else {
        weak
    }
}

#[inline]
pub(crate) unsafe fn answers_to(header: NonNull<ControlBlockHeader>, id: TypeId) -> bool {
    ((*header.as_ptr()).vtable.query)(id)
}

/// Byte offset of `ControlBlock<T>::value` from the start of the block,
/// used to recover the owning block from a bare `*mut T`.
pub(crate) fn data_offset<T>() -> usize {
    let header_size = std::mem::size_of::<ControlBlockHeader>();
    let align = std::mem::align_of::<T>().max(1);
    (header_size + align - 1) / align * align
}

/// Pointer to the (still logically owned) value inside `block`, used by
/// `StrongRef::detach` to hand callers a raw `*mut T`.
pub(crate) fn value_ptr<T>(block: NonNull<ControlBlock<T>>) -> *mut T {
    unsafe { &mut (*block.as_ptr()).value as *mut ManuallyDrop<T> as *mut T }
}

/// Recovers the owning control block from a `*mut T` previously produced
/// by `value_ptr`/`StrongRef::detach`.
///
/// # Safety
/// `ptr` must have come from `value_ptr` (directly or via `detach`) on a
/// still-live `ControlBlock<T>`.
pub(crate) unsafe fn block_from_value_ptr<T>(ptr: *mut T) -> NonNull<ControlBlock<T>> {
    let base = (ptr as *mut u8).sub(data_offset::<T>());
    NonNull::new_unchecked(base as *mut ControlBlock<T>)
}
