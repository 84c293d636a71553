//! Swarms: several heterogeneous objects sharing one control block and
//! one allocation lifetime, in a compile-time-sized (`FixedSwarm`) or
//! runtime-grown (`GrowableSwarm`) flavor. A swarm member,
//! `SwarmMemberPtr<T>`, behaves like a
//! [`crate::rc::StrongRef<T>`] for borrowing purposes but its clone/drop
//! adjust the whole swarm's refcount, not a per-member one — dropping the
//! last reference to any one member tears down every member.

mod fixed;
mod growable;
mod handle;
mod header;
mod member;
mod tuple;

pub use fixed::{make as make_fixed, FixedSwarmHandle};
pub use growable::{make as make_growable, GrowableSwarmHandle};
pub use handle::SwarmHandle;
pub use member::SwarmMemberPtr;
pub use tuple::SwarmTuple;

use crate::interface::Interface;
use crate::policy::FailurePolicy;

/// An owning handle to whichever swarm `member` belongs to — a real
/// capability over the swarm (lookup siblings, keep it alive
/// independently), not just an opaque identity comparable with `==`. For
/// the latter, compare `SwarmMemberPtr::swarm_id()` directly instead.
pub fn swarm_of<T: Interface, const K: bool>(member: &SwarmMemberPtr<T, K>) -> Option<SwarmHandle> {
    Some(SwarmHandle::from_member(member))
}

/// A single-member growable swarm in one call: the common case of
/// "I just want one ref-counted object, and the option to grow a swarm
/// around it later," without juggling `growable::make` and
/// `GrowableSwarmHandle::add_member` separately.
pub fn make<T0: Interface, F: FailurePolicy>(first: T0) -> Option<SwarmMemberPtr<T0>> {
    let swarm = growable::make::<F>()?;
    swarm.add_member::<T0, F>(first)
}
