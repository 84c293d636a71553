//! `SwarmTuple`: the compile-time member list behind [`crate::swarm::FixedSwarm`].
//! Each member's [`TypeId`] is a type-level constant (`Interface::TYPE_ID`),
//! so both "does this swarm answer to `id`" and "find the member behind
//! `id`" can be resolved without touching the member's data — the same
//! type-level dispatch `rc::control_block`'s per-`T` v-table uses, just
//! fanned out over several types at once instead of one.
//!
//! Implemented for tuples of 1 to 4 members by hand rather than through
//! `impl-trait-for-tuples`: that crate expands its `for_tuples!` body in
//! declaration order only, and reverse-declaration-order destruction
//! needs the opposite order. See DESIGN.md.

use std::ptr::NonNull;

use crate::interface::{Interface, TypeId};

/// # Safety
/// Implementors must ensure `drop_reverse` drops every field exactly
/// once, in the reverse of their declaration order, and that
/// `find_member` returns a pointer to the field whose `TYPE_ID` matches
/// `id`, valid for at least the lifetime of `*ptr`.
pub trait SwarmTuple: Sized + 'static {
    const LEN: usize;

    fn answers_to(id: TypeId) -> bool;

    /// # Safety
    /// `ptr` must point to a live, fully-initialized `Self`; after this
    /// call every field of `*ptr` is logically uninitialized.
    unsafe fn drop_reverse(ptr: *mut Self);

    /// # Safety
    /// `ptr` must point to a live, fully-initialized `Self`.
    unsafe fn find_member(ptr: *mut Self, id: TypeId) -> Option<NonNull<u8>>;
}

impl<A: Interface> SwarmTuple for (A,) {
    const LEN: usize = 1;

    fn answers_to(id: TypeId) -> bool {
        id == A::TYPE_ID
    }

    unsafe fn drop_reverse(ptr: *mut Self) {
        std::ptr::drop_in_place(std::ptr::addr_of_mut!((*ptr).0));
    }

    unsafe fn find_member(ptr: *mut Self, id: TypeId) -> Option<NonNull<u8>> {
        if id == A::TYPE_ID {
            Some(NonNull::new_unchecked(
                std::ptr::addr_of_mut!((*ptr).0) as *mut u8
            ))
        } else {
            None
        }
    }
}

impl<A: Interface, B: Interface> SwarmTuple for (A, B) {
    const LEN: usize = 2;

    fn answers_to(id: TypeId) -> bool {
        id == A::TYPE_ID || id == B::TYPE_ID
    }

    unsafe fn drop_reverse(ptr: *mut Self) {
        std::ptr::drop_in_place(std::ptr::addr_of_mut!((*ptr).1));
        std::ptr::drop_in_place(std::ptr::addr_of_mut!((*ptr).0));
    }

    unsafe fn find_member(ptr: *mut Self, id: TypeId) -> Option<NonNull<u8>> {
        if id == A::TYPE_ID {
            Some(NonNull::new_unchecked(
                std::ptr::addr_of_mut!((*ptr).0) as *mut u8
            ))
        } else if id == B::TYPE_ID {
            Some(NonNull::new_unchecked(
                std::ptr::addr_of_mut!((*ptr).1) as *mut u8
            ))
        } else {
            None
        }
    }
}

impl<A: Interface, B: Interface, C: Interface> SwarmTuple for (A, B, C) {
    const LEN: usize = 3;

    fn answers_to(id: TypeId) -> bool {
        id == A::TYPE_ID || id == B::TYPE_ID || id == C::TYPE_ID
    }

    unsafe fn drop_reverse(ptr: *mut Self) {
        std::ptr::drop_in_place(std::ptr::addr_of_mut!((*ptr).2));
        std::ptr::drop_in_place(std::ptr::addr_of_mut!((*ptr).1));
        std::ptr::drop_in_place(std::ptr::addr_of_mut!((*ptr).0));
    }

    unsafe fn find_member(ptr: *mut Self, id: TypeId) -> Option<NonNull<u8>> {
        if id == A::TYPE_ID {
            Some(NonNull::new_unchecked(
                std::ptr::addr_of_mut!((*ptr).0) as *mut u8
            ))
        } else if id == B::TYPE_ID {
            Some(NonNull::new_unchecked(
                std::ptr::addr_of_mut!((*ptr).1) as *mut u8
            ))
        } else if id == C::TYPE_ID {
            Some(NonNull::new_unchecked(
                std::ptr::addr_of_mut!((*ptr).2) as *mut u8
            ))
        } else {
            None
        }
    }
}

impl<A: Interface, B: Interface, C: Interface, D: Interface> SwarmTuple for (A, B, C, D) {
    const LEN: usize = 4;

    fn answers_to(id: TypeId) -> bool {
        id == A::TYPE_ID || id == B::TYPE_ID || id == C::TYPE_ID || id == D::TYPE_ID
    }

    unsafe fn drop_reverse(ptr: *mut Self) {
        std::ptr::drop_in_place(std::ptr::addr_of_mut!((*ptr).3));
        std::ptr::drop_in_place(std::ptr::addr_of_mut!((*ptr).2));
        std::ptr::drop_in_place(std::ptr::addr_of_mut!((*ptr).1));
        std::ptr::drop_in_place(std::ptr::addr_of_mut!((*ptr).0));
    }

    unsafe fn find_member(ptr: *mut Self, id: TypeId) -> Option<NonNull<u8>> {
        if id == A::TYPE_ID {
            Some(NonNull::new_unchecked(
                std::ptr::addr_of_mut!((*ptr).0) as *mut u8
            ))
        } else if id == B::TYPE_ID {
            Some(NonNull::new_unchecked(
                std::ptr::addr_of_mut!((*ptr).1) as *mut u8
            ))
        } else if id == C::TYPE_ID {
            Some(NonNull::new_unchecked(
                std::ptr::addr_of_mut!((*ptr).2) as *mut u8
            ))
        } else if id == D::TYPE_ID {
            Some(NonNull::new_unchecked(
                std::ptr::addr_of_mut!((*ptr).3) as *mut u8
            ))
        } else {
            None
        }
    }
}
