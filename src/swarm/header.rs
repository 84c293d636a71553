//! The shared control block backing every swarm variant: several
//! heterogeneous objects living behind one set of refcounts. Mirrors
//! `rc::control_block` closely — same counters-then-dispatch shape,
//! same CAS-guarded upgrade — but carries a `find_member` thunk instead
//! of a single-type `query`, since a swarm's `query_interface` has to
//! locate *which* member answers, not just whether the whole object does.

use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{abort_with_tag, Tag};
use crate::interface::TypeId;
use crate::util::Backoff;

const MAX_REFCOUNT: usize = isize::MAX as usize;

pub(crate) struct SwarmVTable {
    pub(crate) drop_members: unsafe fn(NonNull<SwarmHeader>),
    pub(crate) dealloc: unsafe fn(NonNull<SwarmHeader>),
    pub(crate) find_member: unsafe fn(NonNull<SwarmHeader>, TypeId) -> Option<NonNull<u8>>,
}

#[repr(C)]
pub(crate) struct SwarmHeader {
    pub(crate) strong: AtomicUsize,
    pub(crate) weak: AtomicUsize,
    pub(crate) vtable: &'static SwarmVTable,
}

#[inline]
pub(crate) unsafe fn incr_strong(header: NonNull<SwarmHeader>) {
    let prev = (*header.as_ptr()).strong.fetch_add(1, Ordering::Relaxed);
    if prev == 0 {
        abort_with_tag(Tag::StrongIncrementFromZero);
    }
    if prev > MAX_REFCOUNT {
        abort_with_tag(Tag::RefcountUnderflow);
    }
}

#[inline]
pub(crate) unsafe fn incr_weak(header: NonNull<SwarmHeader>) {
    (*header.as_ptr()).weak.fetch_add(1, Ordering::Relaxed);
}

pub(crate) unsafe fn decr_strong(header: NonNull<SwarmHeader>) {
    let h = &*header.as_ptr();
    if h.strong.fetch_sub(1, Ordering::Release) != 1 {
        return;
    }
    std::sync::atomic::fence(Ordering::Acquire);
    (h.vtable.drop_members)(header);
    decr_weak(header);
}

pub(crate) unsafe fn decr_weak(header: NonNull<SwarmHeader>) {
    let h = &*header.as_ptr();
    if h.weak.fetch_sub(1, Ordering::Release) != 1 {
        return;
    }
    std::sync::atomic::fence(Ordering::Acquire);
    (h.vtable.dealloc)(header);
}

pub(crate) unsafe fn try_upgrade(header: NonNull<SwarmHeader>) -> bool {
    let strong = &(*header.as_ptr()).strong;
    let mut current = strong.load(Ordering::Relaxed);
    let mut backoff = Backoff::new();
    loop {
        if current == 0 {
            return false;
        }
        match strong.compare_exchange_weak(current, current + 1, Ordering::Acquire, Ordering::Relaxed) {
            Ok(_) => return true,
            Err(observed) => {
                current = observed;
                backoff.spin();
            }
        }
    }
}

#[inline]
pub(crate) unsafe fn find_member(
    header: NonNull<SwarmHeader>,
    id: TypeId,
) -> Option<NonNull<u8>> {
    ((*header.as_ptr()).vtable.find_member)(header, id)
}

#[inline]
pub(crate) unsafe fn strong_count(header: NonNull<SwarmHeader>) -> usize {
    (*header.as_ptr()).strong.load(Ordering::SeqCst)
}
