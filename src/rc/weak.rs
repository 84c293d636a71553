//! `WeakRef<T>`: a non-owning handle that can attempt to upgrade back to
//! a [`crate::rc::StrongRef`]. Upgrading refuses to revive an object
//! whose strong count has already hit zero, via the CAS loop in
//! `control_block::try_upgrade`.

use std::marker::PhantomData;
use std::ptr::NonNull;

use crate::interface::Interface;
use crate::rc::control_block::{self, ControlBlock};
use crate::rc::strong::StrongRef;

pub struct WeakRef<T: Interface> {
    block: Option<NonNull<ControlBlock<T>>>,
    _marker: PhantomData<T>,
}

unsafe impl<T: Interface + Sync + Send> Send for WeakRef<T> {}
unsafe impl<T: Interface + Sync + Send> Sync for WeakRef<T> {}

impl<T: Interface> WeakRef<T> {
    pub const fn null() -> Self {
        WeakRef {
            block: None,
            _marker: PhantomData,
        }
    }

    pub(crate) fn from_block(block: NonNull<ControlBlock<T>>) -> Self {
        WeakRef {
            block: Some(block),
            _marker: PhantomData,
        }
    }

    pub fn is_null(&self) -> bool {
        self.block.is_none()
    }

    /// True once the referent's strong count has reached zero (it may
    /// still be in the process of being destroyed on another thread, so
    /// this is necessarily a snapshot, not a guarantee).
    pub fn is_expired(&self) -> bool {
        match self.block {
            Some(b) => unsafe { control_block::strong_count(control_block::header_of(b)) == 0 },
            None => true,
        }
    }

    /// Attempts to produce a new owning [`StrongRef<T>`]. Fails once the
    /// strong count has reached zero, even if this call races the final
    /// `StrongRef` drop — upgrade never resurrects a destroyed object.
    pub fn upgrade(&self) -> Option<StrongRef<T>> {
        let block = self.block?;
        let header = control_block::header_of(block);
        if unsafe { control_block::try_upgrade(header) } {
            Some(StrongRef::from_block(block))
        } else {
            None
        }
    }

    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        match (a.block, b.block) {
            (Some(x), Some(y)) => x == y,
            (None, None) => true,
            _ => false,
        }
    }
}

impl<T: Interface> Clone for WeakRef<T> {
    fn clone(&self) -> Self {
        if let Some(b) = self.block {
            unsafe { control_block::incr_weak(control_block::header_of(b)) };
        }
        WeakRef {
            block: self.block,
            _marker: PhantomData,
        }
    }
}

impl<T: Interface> Drop for WeakRef<T> {
    fn drop(&mut self) {
        if let Some(b) = self.block {
            unsafe { control_block::decr_weak(control_block::header_of(b)) };
        }
    }
}

impl<T: Interface> Default for WeakRef<T> {
    fn default() -> Self {
        Self::null()
    }
}

#[cfg(test)]
mod tests {
    use super::WeakRef;
    use crate::fixtures::{DropTally, Widget};
    use crate::make::make;
    use crate::policy::{AbortOnFailure, DirectConstruct, StrongAndWeak};
    use crate::rc::StrongRef;

    fn widget(tally: &DropTally) -> StrongRef<Widget> {
        make::<Widget, _, StrongAndWeak, DirectConstruct, AbortOnFailure>(("gizmo", tally.clone()))
    }

    #[test]
    fn null_weak_is_expired_and_never_upgrades() {
        let w: WeakRef<Widget> = WeakRef::null();
        assert!(w.is_null());
        assert!(w.is_expired());
        assert!(w.upgrade().is_none());
    }

    #[test]
    fn clone_increments_weak_count_drop_decrements() {
        let tally = DropTally::new();
        let a = widget(&tally);
        let w1 = a.downgrade();
        assert_eq!(a.weak_count(), 1);
        let w2 = w1.clone();
        assert_eq!(a.weak_count(), 2);
        drop(w2);
        assert_eq!(a.weak_count(), 1);
        drop(w1);
        assert_eq!(a.weak_count(), 0);
    }

    #[test]
    fn upgrade_fails_forever_once_the_object_is_gone() {
        let tally = DropTally::new();
        let a = widget(&tally);
        let w = a.downgrade();
        drop(a);
        assert!(w.is_expired());
        assert!(w.upgrade().is_none());
        assert_eq!(tally.count(), 1);
    }

    #[test]
    fn weak_ptr_eq_matches_clones_of_the_same_weak() {
        let tally = DropTally::new();
        let a = widget(&tally);
        let w1 = a.downgrade();
        let w2 = w1.clone();
        let other = widget(&tally).downgrade();
        assert!(WeakRef::ptr_eq(&w1, &w2));
        assert!(!WeakRef::ptr_eq(&w1, &other));
    }
}
