//! `SwarmHandle`: an owning reference to "whichever swarm a given member
//! lives in," without pinning down the swarm's concrete flavor
//! (`FixedSwarm` vs `GrowableSwarm`) or any one member's type. Backs
//! `swarm::swarm_of`, which otherwise has no way to hand back a real
//! owning capability — only the two concrete `*SwarmHandle` types do.

use std::ptr::NonNull;

use crate::interface::{Interface, TypeId};
use crate::swarm::header::{self, SwarmHeader};
use crate::swarm::member::SwarmMemberPtr;

pub struct SwarmHandle {
    header: NonNull<SwarmHeader>,
}

unsafe impl Send for SwarmHandle {}
unsafe impl Sync for SwarmHandle {}

impl SwarmHandle {
    /// Takes its own strong count over the swarm backing `member`.
    pub(crate) fn from_member<T: Interface, const K: bool>(member: &SwarmMemberPtr<T, K>) -> Self {
        let header = member.header();
        unsafe { header::incr_strong(header) };
        SwarmHandle { header }
    }

    pub fn member<U: Interface>(&self) -> Option<SwarmMemberPtr<U>> {
        let found = unsafe { header::find_member(self.header, U::TYPE_ID) }?;
        unsafe { header::incr_strong(self.header) };
        Some(SwarmMemberPtr::new(found.cast::<U>(), self.header))
    }

    pub fn contains(&self, id: TypeId) -> bool {
        unsafe { header::find_member(self.header, id) }.is_some()
    }

    pub fn strong_count(&self) -> usize {
        unsafe { header::strong_count(self.header) }
    }
}

impl Clone for SwarmHandle {
    fn clone(&self) -> Self {
        unsafe { header::incr_strong(self.header) };
        SwarmHandle {
            header: self.header,
        }
    }
}

impl Drop for SwarmHandle {
    fn drop(&mut self) {
        unsafe { header::decr_strong(self.header) };
    }
}

#[cfg(test)]
mod tests {
    use crate::fixtures::{DropTally, Gadget, Widget};
    use crate::interface::TypeIdentified;
    use crate::policy::AbortOnFailure;
    use crate::swarm::{fixed, swarm_of};

    #[test]
    fn swarm_of_returns_a_handle_that_finds_siblings() {
        let tally = DropTally::new();
        let handle = fixed::make::<_, AbortOnFailure>((
            Widget::try_from(("a", tally)).unwrap(),
            Gadget { serial: 9 },
        ))
        .unwrap();
        let widget = handle.member::<Widget>().unwrap();

        let via_swarm_of = swarm_of(&widget).expect("member must belong to a swarm");
        let gadget = via_swarm_of.member::<Gadget>().expect("gadget sibling");
        assert_eq!(gadget.get().serial, 9);
    }

    #[test]
    fn swarm_of_keeps_the_swarm_alive_independently() {
        let tally = DropTally::new();
        let handle = fixed::make::<_, AbortOnFailure>((
            Widget::try_from(("a", tally.clone())).unwrap(),
            Gadget { serial: 1 },
        ))
        .unwrap();
        let widget = handle.member::<Widget>().unwrap();
        let via_swarm_of = swarm_of(&widget).unwrap();

        drop(handle);
        drop(widget);
        assert_eq!(tally.count(), 0, "swarm_of's handle must keep members alive");
        drop(via_swarm_of);
        assert_eq!(tally.count(), 1);
    }
}
