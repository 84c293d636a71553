//! `SwarmMemberPtr<T>`: a strong reference to one member of a swarm that
//! keeps the *whole swarm* alive — one control block, several objects.
//! Releasing the last `SwarmMemberPtr`/`StrongRef` into
//! a swarm destroys every member, not just the one this handle points at.

use std::marker::PhantomData;
use std::ptr::NonNull;

use crate::interface::{Interface, TypeId};
use crate::swarm::header::{self, SwarmHeader};

/// `KNOWN_SAME_SWARM` makes "holds no strong count" part of the type
/// rather than a runtime flag. It defaults to `false` — "this handle
/// owns a strong count and must release it on drop" — which is what
/// every public accessor
/// (`member`/`sibling`/`add_member`) hands out, since the caller may
/// hold it independently of whatever handle it was derived from.
/// `KNOWN_SAME_SWARM = true` is for the opposite case: a pointer whose
/// validity is already guaranteed by something else keeping the swarm
/// alive for at least as long (typically another member of the same
/// swarm referencing a sibling as one of its own fields), where holding
/// a redundant count would itself be the bug — an uncollectable swarm.
pub struct SwarmMemberPtr<T: Interface, const KNOWN_SAME_SWARM: bool = false> {
    value: NonNull<T>,
    header: NonNull<SwarmHeader>,
    /// Whether *this* handle contributed its own strong count. Always
    /// `false` when `KNOWN_SAME_SWARM` is `true` — that specialization
    /// never touches the counter, by construction (`held = !KNOWN_SAME_SWARM`
    /// unless overridden by [`SwarmMemberPtr::new_cross_swarm`]'s runtime
    /// check).
    held: bool,
    _marker: PhantomData<T>,
}

unsafe impl<T: Interface + Send + Sync, const K: bool> Send for SwarmMemberPtr<T, K> {}
unsafe impl<T: Interface + Send + Sync, const K: bool> Sync for SwarmMemberPtr<T, K> {}

impl<T: Interface, const K: bool> SwarmMemberPtr<T, K> {
    /// Builds a handle over an already-accounted-for strong count: the
    /// caller must have already called `header::incr_strong` itself
    /// (`K = false`) or must be constructing a genuinely zero-cost
    /// `K = true` handle whose validity is guaranteed some other way.
    pub(crate) fn new(value: NonNull<T>, header: NonNull<SwarmHeader>) -> Self {
        SwarmMemberPtr {
            value,
            header,
            held: !K,
            _marker: PhantomData,
        }
    }

    pub fn get(&self) -> &T {
        unsafe { self.value.as_ref() }
    }

    /// The identity of the swarm this member lives in — opaque, but
    /// stable and comparable, so callers can tell whether two members
    /// came from the same swarm without exposing swarm internals.
    pub fn swarm_id(&self) -> usize {
        self.header.as_ptr() as usize
    }

    pub fn same_swarm(a: &Self, b: &Self) -> bool {
        a.header == b.header
    }

    /// The raw swarm header, for collaborators elsewhere in `swarm::*`
    /// that need to share ownership of the swarm itself rather than of
    /// one member (e.g. `swarm::handle::SwarmHandle`).
    pub(crate) fn header(&self) -> NonNull<SwarmHeader> {
        self.header
    }

    /// True if this specific handle is holding its own strong count
    /// (exposed for tests verifying the refcount-elision contract rather
    /// than for general use).
    #[cfg(test)]
    pub(crate) fn holds_strong_count(&self) -> bool {
        self.held
    }

    /// Looks up a sibling member by type within the same swarm, returning
    /// an independently-owned handle — it takes its own strong count,
    /// since the caller may drop `self` and keep this one.
    pub fn sibling<U: Interface>(&self) -> Option<SwarmMemberPtr<U, false>> {
        let found = unsafe { header::find_member(self.header, U::TYPE_ID) }?;
        unsafe { header::incr_strong(self.header) };
        Some(SwarmMemberPtr::new(found.cast::<U>(), self.header))
    }

    pub fn answers_to(&self, id: TypeId) -> bool {
        unsafe { header::find_member(self.header, id).is_some() }
    }

    /// Asserts, without checking, that `self` and some other member known
    /// by identity are in the same swarm, producing a handle whose type
    /// carries that fact and which holds no strong count of its own —
    /// `self`'s own count (if any) is released normally when `self` drops
    /// at the end of this call. Intended for call sites that already hold
    /// independent proof the swarm outlives the result (e.g. the result is
    /// stored as a field inside another member of the very same swarm).
    ///
    /// # Safety
    /// The caller must ensure something else keeps this swarm alive for
    /// the entire lifetime of the returned handle — it does not hold its
    /// own reference. Misusing this can free the swarm out from under the
    /// returned pointer.
    pub unsafe fn assert_same_swarm(self) -> SwarmMemberPtr<T, true> {
        SwarmMemberPtr::new(self.value, self.header)
    }
}

impl<T: Interface> SwarmMemberPtr<T, false> {
    /// Compares `target`'s control block against `from`'s, and only takes
    /// a strong count if
    /// they differ. Used for member-to-member references set up during
    /// swarm construction (one member holding a pointer to a sibling as
    /// one of its own fields) where `from` is the referencing member's own
    /// swarm — when it matches `target`'s swarm, the reference is free:
    /// the common strong count already keeps both alive together, and an
    /// extra count would make the swarm uncollectable.
    ///
    /// # Safety
    /// `target`/`target_header` must describe a live member of the swarm
    /// rooted at `target_header`.
    pub(crate) unsafe fn new_cross_swarm(
        target: NonNull<T>,
        target_header: NonNull<SwarmHeader>,
        from_header: NonNull<SwarmHeader>,
    ) -> Self {
        let held = target_header != from_header;
        if held {
            header::incr_strong(target_header);
        }
        SwarmMemberPtr {
            value: target,
            header: target_header,
            held,
            _marker: PhantomData,
        }
    }
}

impl<T: Interface, const K: bool> Clone for SwarmMemberPtr<T, K> {
    fn clone(&self) -> Self {
        if self.held {
            unsafe { header::incr_strong(self.header) };
        }
        SwarmMemberPtr {
            value: self.value,
            header: self.header,
            held: self.held,
            _marker: PhantomData,
        }
    }
}

impl<T: Interface, const K: bool> Drop for SwarmMemberPtr<T, K> {
    fn drop(&mut self) {
        if self.held {
            unsafe { header::decr_strong(self.header) };
        }
    }
}

impl<T: Interface + std::fmt::Debug, const K: bool> std::fmt::Debug for SwarmMemberPtr<T, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SwarmMemberPtr").field(self.get()).finish()
    }
}
