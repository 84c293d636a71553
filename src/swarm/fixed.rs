//! `FixedSwarm`: a compile-time-sized group of members sharing a single
//! allocation and control block, with destruction walking the tuple in
//! reverse declaration order (see DESIGN.md).

use std::alloc::Layout;
use std::mem::ManuallyDrop;
use std::ptr::NonNull;
use std::sync::atomic::AtomicUsize;

use crate::error::Tag;
use crate::interface::{Interface, TypeId};
use crate::policy::FailurePolicy;
use crate::sys_alloc::{SysAllocator, GLOBAL};
use crate::swarm::header::{self, SwarmHeader, SwarmVTable};
use crate::swarm::member::SwarmMemberPtr;
use crate::swarm::tuple::SwarmTuple;

#[repr(C)]
struct FixedSwarmBlock<Tup: SwarmTuple> {
    header: SwarmHeader,
    members: ManuallyDrop<Tup>,
}

unsafe fn drop_members<Tup: SwarmTuple>(header: NonNull<SwarmHeader>) {
    let block = header.cast::<FixedSwarmBlock<Tup>>();
    let members_ptr = &mut (*block.as_ptr()).members as *mut ManuallyDrop<Tup> as *mut Tup;
    Tup::drop_reverse(members_ptr);
}

unsafe fn dealloc_block<Tup: SwarmTuple>(header: NonNull<SwarmHeader>) {
    let block = header.cast::<FixedSwarmBlock<Tup>>();
    let layout = Layout::new::<FixedSwarmBlock<Tup>>();
    GLOBAL.free(block.cast::<u8>(), layout.size(), layout.align());
}

unsafe fn find_member_in<Tup: SwarmTuple>(
    header: NonNull<SwarmHeader>,
    id: TypeId,
) -> Option<NonNull<u8>> {
    let block = header.cast::<FixedSwarmBlock<Tup>>();
    let members_ptr = &mut (*block.as_ptr()).members as *mut ManuallyDrop<Tup> as *mut Tup;
    Tup::find_member(members_ptr, id)
}

/// Per-`Tup` v-table via a generic associated const, same promoted-
/// constant trick as `rc::control_block::VTableHolder`.
trait VTableHolder: SwarmTuple {
    const VTABLE: SwarmVTable;
}

impl<Tup: SwarmTuple> VTableHolder for Tup {
    const VTABLE: SwarmVTable = SwarmVTable {
        drop_members: drop_members::<Tup>,
        dealloc: dealloc_block::<Tup>,
        find_member: find_member_in::<Tup>,
    };
}

fn vtable<Tup: SwarmTuple>() -> &'static SwarmVTable {
    &<Tup as VTableHolder>::VTABLE
}

/// A handle to a `FixedSwarm`'s shared ownership, without pinning down
/// which member is "the" value — most callers instead keep one
/// [`SwarmMemberPtr`] per member they care about (`FixedSwarm::make`
/// returns the full set).
pub struct FixedSwarmHandle<Tup: SwarmTuple> {
    header: NonNull<SwarmHeader>,
    _marker: std::marker::PhantomData<Tup>,
}

unsafe impl<Tup: SwarmTuple + Send + Sync> Send for FixedSwarmHandle<Tup> {}
unsafe impl<Tup: SwarmTuple + Send + Sync> Sync for FixedSwarmHandle<Tup> {}

impl<Tup: SwarmTuple> Clone for FixedSwarmHandle<Tup> {
    fn clone(&self) -> Self {
        unsafe { header::incr_strong(self.header) };
        FixedSwarmHandle {
            header: self.header,
            _marker: std::marker::PhantomData,
        }
    }
}

impl<Tup: SwarmTuple> Drop for FixedSwarmHandle<Tup> {
    fn drop(&mut self) {
        unsafe { header::decr_strong(self.header) };
    }
}

impl<Tup: SwarmTuple> FixedSwarmHandle<Tup> {
    pub fn answers_to(&self, id: TypeId) -> bool {
        Tup::answers_to(id)
    }

    pub fn member<U: Interface>(&self) -> Option<SwarmMemberPtr<U>> {
        let found = unsafe { header::find_member(self.header, U::TYPE_ID) }?;
        unsafe { header::incr_strong(self.header) };
        Some(SwarmMemberPtr::new(found.cast::<U>(), self.header))
    }
}

/// Allocates a `FixedSwarm` containing exactly `members`, returning a
/// handle plus one [`SwarmMemberPtr`] per member for convenience. On
/// allocation failure, defers to `F::on_failure` the same way
/// [`crate::make::make`] does; since a swarm has no single `T` to hand
/// `F::on_failure` a `StrongRef<T>` for, failure is instead reported by
/// returning `None` regardless of `F` (an `AbortOnFailure` caller that
/// wants a hard abort can call `F::on_failure::<crate::interface::Opaque>`
/// itself on a `None` result).
pub fn make<Tup: SwarmTuple, F: FailurePolicy>(members: Tup) -> Option<FixedSwarmHandle<Tup>> {
    let layout = Layout::new::<FixedSwarmBlock<Tup>>();
    let raw = match GLOBAL.allocate(layout.size(), layout.align()) {
        Some(raw) => raw,
        None => {
            let _: crate::rc::StrongRef<crate::interface::Opaque> =
                F::on_failure(Tag::AllocationFailure);
            return None;
        }
    };
    let block = raw.cast::<FixedSwarmBlock<Tup>>();
    unsafe {
        std::ptr::write(
            &mut (*block.as_ptr()).header,
            SwarmHeader {
                strong: AtomicUsize::new(1),
                // Always reserved, same rationale as rc::control_block::allocate:
                // the implicit weak held by the strong side is what makes
                // decr_strong -> decr_weak -> dealloc safe to chain unconditionally.
                weak: AtomicUsize::new(1),
                vtable: vtable::<Tup>(),
            },
        );
        std::ptr::write(
            &mut (*block.as_ptr()).members as *mut ManuallyDrop<Tup> as *mut Tup,
            members,
        );
    }
    Some(FixedSwarmHandle {
        header: block.cast(),
        _marker: std::marker::PhantomData,
    })
}
