//! `GrowableSwarm`: a swarm whose member count is not known until
//! runtime. Members are CAS-prepended onto a lock-free singly-linked
//! list hanging off the shared control block; destruction simply walks
//! the list head-to-tail, so it naturally visits members in reverse-add
//! order, matching the fixed variant's reverse-declaration-order
//! teardown (see DESIGN.md).

use std::alloc::Layout;
use std::mem::ManuallyDrop;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

use crate::error::Tag;
use crate::interface::{Interface, TypeId};
use crate::policy::FailurePolicy;
use crate::rc::StrongRef;
use crate::sys_alloc::{SysAllocator, GLOBAL};
use crate::swarm::header::{self, SwarmHeader, SwarmVTable};
use crate::swarm::member::SwarmMemberPtr;
use crate::util::Backoff;

struct NodeVTable {
    drop_value: unsafe fn(NonNull<NodeHeader>),
    dealloc: unsafe fn(NonNull<NodeHeader>),
    type_id_of: unsafe fn() -> TypeId,
    value_ptr: unsafe fn(NonNull<NodeHeader>) -> NonNull<u8>,
}

#[repr(C)]
struct NodeHeader {
    next: AtomicPtr<NodeHeader>,
    vtable: &'static NodeVTable,
}

#[repr(C)]
struct MemberNode<T> {
    header: NodeHeader,
    value: ManuallyDrop<T>,
}

unsafe fn drop_node_value<T>(header: NonNull<NodeHeader>) {
    let node = header.cast::<MemberNode<T>>();
    let ptr = &mut (*node.as_ptr()).value as *mut ManuallyDrop<T> as *mut T;
    std::ptr::drop_in_place(ptr);
}

unsafe fn dealloc_node<T>(header: NonNull<NodeHeader>) {
    let node = header.cast::<MemberNode<T>>();
    let layout = Layout::new::<MemberNode<T>>();
    GLOBAL.free(node.cast::<u8>(), layout.size(), layout.align());
}

unsafe fn node_type_id<T: Interface>() -> TypeId {
    T::TYPE_ID
}

unsafe fn node_value_ptr<T>(header: NonNull<NodeHeader>) -> NonNull<u8> {
    let node = header.cast::<MemberNode<T>>();
    NonNull::new_unchecked(&mut (*node.as_ptr()).value as *mut ManuallyDrop<T> as *mut u8)
}

/// Per-`T` v-table via a generic associated const, same promoted-constant
/// trick as `rc::control_block::VTableHolder`.
trait NodeVTableHolder: Interface {
    const VTABLE: NodeVTable;
}

impl<T: Interface> NodeVTableHolder for T {
    const VTABLE: NodeVTable = NodeVTable {
        drop_value: drop_node_value::<T>,
        dealloc: dealloc_node::<T>,
        type_id_of: node_type_id::<T>,
        value_ptr: node_value_ptr::<T>,
    };
}

fn node_vtable<T: Interface>() -> &'static NodeVTable {
    &<T as NodeVTableHolder>::VTABLE
}

/// Frees `node` if dropped before `disarm()` — covers the window between
/// allocating a node and successfully CAS-prepending it onto the list,
/// so a panic in `T`'s move/drop between allocation and linking can't
/// leak the node.
struct NodeGuard<T> {
    node: Option<NonNull<MemberNode<T>>>,
}

impl<T> NodeGuard<T> {
    fn disarm(&mut self) {
        self.node = None;
    }
}

impl<T> Drop for NodeGuard<T> {
    fn drop(&mut self) {
        if let Some(node) = self.node.take() {
            let layout = Layout::new::<MemberNode<T>>();
            unsafe { GLOBAL.free(node.cast::<u8>(), layout.size(), layout.align()) };
        }
    }
}

#[repr(C)]
struct GrowableSwarmBlock {
    header: SwarmHeader,
    head: AtomicPtr<NodeHeader>,
}

unsafe fn drop_members(header: NonNull<SwarmHeader>) {
    let block = header.cast::<GrowableSwarmBlock>();
    let mut cursor = (*block.as_ptr()).head.load(Ordering::Acquire);
    while !cursor.is_null() {
        let node = NonNull::new_unchecked(cursor);
        let next = (*cursor).next.load(Ordering::Relaxed);
        ((*cursor).vtable.drop_value)(node);
        cursor = next;
    }
}

unsafe fn dealloc(header: NonNull<SwarmHeader>) {
    let block = header.cast::<GrowableSwarmBlock>();
    let mut cursor = (*block.as_ptr()).head.load(Ordering::Acquire);
    while !cursor.is_null() {
        let node = NonNull::new_unchecked(cursor);
        let next = (*cursor).next.load(Ordering::Relaxed);
        ((*cursor).vtable.dealloc)(node);
        cursor = next;
    }
    let layout = Layout::new::<GrowableSwarmBlock>();
    GLOBAL.free(block.cast::<u8>(), layout.size(), layout.align());
}

unsafe fn find_member(header: NonNull<SwarmHeader>, id: TypeId) -> Option<NonNull<u8>> {
    let block = header.cast::<GrowableSwarmBlock>();
    let mut cursor = (*block.as_ptr()).head.load(Ordering::Acquire);
    while !cursor.is_null() {
        let node = NonNull::new_unchecked(cursor);
        if ((*cursor).vtable.type_id_of)() == id {
            return Some(((*cursor).vtable.value_ptr)(node));
        }
        cursor = (*cursor).next.load(Ordering::Relaxed);
    }
    None
}

static GROWABLE_VTABLE: SwarmVTable = SwarmVTable {
    drop_members,
    dealloc,
    find_member,
};

pub struct GrowableSwarmHandle {
    header: NonNull<SwarmHeader>,
}

unsafe impl Send for GrowableSwarmHandle {}
unsafe impl Sync for GrowableSwarmHandle {}

impl Clone for GrowableSwarmHandle {
    fn clone(&self) -> Self {
        unsafe { header::incr_strong(self.header) };
        GrowableSwarmHandle {
            header: self.header,
        }
    }
}

impl Drop for GrowableSwarmHandle {
    fn drop(&mut self) {
        unsafe { header::decr_strong(self.header) };
    }
}

impl GrowableSwarmHandle {
    pub fn member<U: Interface>(&self) -> Option<SwarmMemberPtr<U>> {
        let found = unsafe { header::find_member(self.header, U::TYPE_ID) }?;
        unsafe { header::incr_strong(self.header) };
        Some(SwarmMemberPtr::new(found.cast::<U>(), self.header))
    }

    pub fn contains(&self, id: TypeId) -> bool {
        unsafe { header::find_member(self.header, id) }.is_some()
    }

    /// CAS-prepends a new member onto the swarm's list.
    /// Safe to call concurrently from multiple threads; contends only
    /// with other `add_member` calls on the same swarm, never with
    /// readers, which only ever walk the list forward from a snapshot of
    /// `head`.
    pub fn add_member<T: Interface, F: FailurePolicy>(
        &self,
        value: T,
    ) -> Option<SwarmMemberPtr<T>> {
        let layout = Layout::new::<MemberNode<T>>();
        let raw = match GLOBAL.allocate(layout.size(), layout.align()) {
            Some(raw) => raw,
            None => {
                let _: StrongRef<crate::interface::Opaque> = F::on_failure(Tag::AllocationFailure);
                return None;
            }
        };
        let node = raw.cast::<MemberNode<T>>();
        let mut guard = NodeGuard { node: Some(node) };
        unsafe {
            std::ptr::write(
                &mut (*node.as_ptr()).header,
                NodeHeader {
                    next: AtomicPtr::new(std::ptr::null_mut()),
                    vtable: node_vtable::<T>(),
                },
            );
            std::ptr::write(
                &mut (*node.as_ptr()).value as *mut ManuallyDrop<T> as *mut T,
                value,
            );
        }
        guard.disarm();

        let block = self.header.cast::<GrowableSwarmBlock>();
        let node_header: *mut NodeHeader = node.cast().as_ptr();
        let mut backoff = Backoff::new();
        loop {
            let current_head = unsafe { (*block.as_ptr()).head.load(Ordering::Acquire) };
            unsafe { (*node_header).next.store(current_head, Ordering::Relaxed) };
            if unsafe {
                (*block.as_ptr())
                    .head
                    .compare_exchange_weak(
                        current_head,
                        node_header,
                        Ordering::AcqRel,
                        Ordering::Relaxed,
                    )
                    .is_ok()
            } {
                break;
            }
            backoff.spin();
        }

        unsafe { header::incr_strong(self.header) };
        let value_ptr = unsafe {
            NonNull::new_unchecked(&mut (*node.as_ptr()).value as *mut ManuallyDrop<T> as *mut T)
        };
        Some(SwarmMemberPtr::new(value_ptr, self.header))
    }
}

/// Allocates a new, empty growable swarm.
pub fn make<F: FailurePolicy>() -> Option<GrowableSwarmHandle> {
    let layout = Layout::new::<GrowableSwarmBlock>();
    let raw = match GLOBAL.allocate(layout.size(), layout.align()) {
        Some(raw) => raw,
        None => {
            let _: StrongRef<crate::interface::Opaque> = F::on_failure(Tag::AllocationFailure);
            return None;
        }
    };
    let block = raw.cast::<GrowableSwarmBlock>();
    unsafe {
        std::ptr::write(
            &mut (*block.as_ptr()).header,
            SwarmHeader {
                strong: AtomicUsize::new(1),
                weak: AtomicUsize::new(1),
                vtable: &GROWABLE_VTABLE,
            },
        );
        std::ptr::write(
            &mut (*block.as_ptr()).head,
            AtomicPtr::new(std::ptr::null_mut()),
        );
    }
    Some(GrowableSwarmHandle {
        header: block.cast(),
    })
}

#[cfg(test)]
mod tests {
    use super::make;
    use crate::fixtures::{DropTally, Gadget, Unrelated, Widget};
    use crate::interface::TypeIdentified;
    use crate::policy::AbortOnFailure;

    #[test]
    fn starts_empty_and_answers_to_nothing() {
        let handle = make::<AbortOnFailure>().unwrap();
        assert!(!handle.contains(Widget::TYPE_ID));
    }

    #[test]
    fn added_members_are_reachable_by_type() {
        let tally = DropTally::new();
        let handle = make::<AbortOnFailure>().unwrap();
        handle
            .add_member::<Widget, AbortOnFailure>(Widget::try_from(("w", tally.clone())).unwrap())
            .unwrap();
        handle
            .add_member::<Gadget, AbortOnFailure>(Gadget { serial: 9 })
            .unwrap();
        assert!(handle.contains(Widget::TYPE_ID));
        assert!(handle.contains(Gadget::TYPE_ID));
        assert!(!handle.contains(Unrelated::TYPE_ID));
        assert_eq!(handle.member::<Gadget>().unwrap().get().serial, 9);
    }

    /// Members are prepended, so the list's natural head-to-tail walk at
    /// teardown visits them in the opposite order they were added in.
    #[test]
    fn destruction_order_is_reverse_of_add_order() {
        let order = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));

        struct Tracker(u32, std::sync::Arc<std::sync::Mutex<Vec<u32>>>);
        impl Drop for Tracker {
            fn drop(&mut self) {
                self.1.lock().unwrap().push(self.0);
            }
        }
        impl crate::interface::TypeIdentified for Tracker {
            const TYPE_ID: crate::interface::TypeId =
                crate::interface::TypeId::from_parts(0xdeadbeef, 0, 0, [0; 8]);
        }
        impl crate::interface::Interface for Tracker {}

        {
            let handle = make::<AbortOnFailure>().unwrap();
            for i in 0..4 {
                handle
                    .add_member::<Tracker, AbortOnFailure>(Tracker(i, order.clone()))
                    .unwrap();
            }
        }
        assert_eq!(*order.lock().unwrap(), vec![3, 2, 1, 0]);
    }

    /// `add_member` CAS-prepends concurrently from several threads; every
    /// successful add also bumps the swarm's strong count once (returned
    /// to the caller as the new member's own `SwarmMemberPtr`), so holding
    /// on to all of them should leave the count at 1 (the handle itself)
    /// plus one per member, with none lost to a missed retry.
    #[test]
    fn concurrent_add_member_loses_no_increments() {
        let handle = std::sync::Arc::new(make::<AbortOnFailure>().unwrap());
        let threads: Vec<_> = (0..8u32)
            .map(|i| {
                let handle = handle.clone();
                std::thread::spawn(move || {
                    handle
                        .add_member::<Gadget, AbortOnFailure>(Gadget { serial: i })
                        .unwrap()
                })
            })
            .collect();
        let members: Vec<_> = threads.into_iter().map(|t| t.join().unwrap()).collect();
        let strong = unsafe { crate::swarm::header::strong_count(handle.header) };
        assert_eq!(strong, 1 + 8);
        drop(members);
    }
}
