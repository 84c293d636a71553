//! The memory-allocator external collaborator: the core only ever calls
//! `allocate`/`free`/`allocation_size`; the backing implementation is
//! deliberately swappable. The default forwards straight to
//! `std::alloc`, but the seam is a trait object so a caller could swap
//! in a pool allocator, an arena, or a tracking allocator without the
//! object model or dispatch runtime knowing the difference.

use std::alloc::{self, Layout};
use std::ptr::NonNull;
use std::sync::Mutex;

use crate::error::{abort_with_tag, Tag};

/// Allocate/free/size. `allocation_size` takes a previously-`allocate`d
/// pointer and reports how large a block was handed out for it; there is
/// no portable `malloc_usable_size` in stable Rust, so the default
/// implementation below tracks layouts out-of-band instead of recovering
/// them from the pointer.
pub trait SysAllocator: Send + Sync {
    fn allocate(&self, size: usize, align: usize) -> Option<NonNull<u8>>;
    /// # Safety
    /// `ptr` must have been returned by `allocate` on `self` and not yet freed.
    unsafe fn free(&self, ptr: NonNull<u8>, size: usize, align: usize);
    fn allocation_size(&self, ptr: NonNull<u8>) -> usize;
}

/// Default collaborator: the process's global allocator, with a side
/// table recording the `Layout` handed out per pointer so
/// `allocation_size` has something to answer with. A flat `Vec` rather
/// than a hash map so `System::new` stays a `const fn` usable in a
/// `static`; the core allocates control blocks, not a high-frequency
/// workload, so the linear scan is not a hot path.
pub struct System {
    layouts: Mutex<Vec<(usize, Layout)>>,
}

impl System {
    pub const fn new() -> Self {
        System {
            layouts: Mutex::new(Vec::new()),
        }
    }
}

impl Default for System {
    fn default() -> Self {
        Self::new()
    }
}

impl SysAllocator for System {
    fn allocate(&self, size: usize, align: usize) -> Option<NonNull<u8>> {
        let layout = Layout::from_size_align(size.max(1), align).ok()?;
        // SAFETY: layout has non-zero size by construction above.
        let raw = unsafe { alloc::alloc(layout) };
        let ptr = NonNull::new(raw)?;
        self.layouts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((ptr.as_ptr() as usize, layout));
        Some(ptr)
    }

    unsafe fn free(&self, ptr: NonNull<u8>, size: usize, align: usize) {
        let mut layouts = self.layouts.lock().unwrap_or_else(|e| e.into_inner());
        let key = ptr.as_ptr() as usize;
        let layout = match layouts.iter().position(|(k, _)| *k == key) {
            Some(idx) => layouts.swap_remove(idx).1,
            None => Layout::from_size_align(size.max(1), align)
                .unwrap_or_else(|_| abort_with_tag(Tag::AllocationFailure)),
        };
        drop(layouts);
        alloc::dealloc(ptr.as_ptr(), layout);
    }

    fn allocation_size(&self, ptr: NonNull<u8>) -> usize {
        let key = ptr.as_ptr() as usize;
        self.layouts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, l)| l.size())
            .unwrap_or(0)
    }
}

/// The process-wide default allocator collaborator. `make`/`swarm::make`
/// use this unless a future caller wires up a different `SysAllocator`
/// (no such call site exists yet in this crate, but the trait seam is
/// there for one).
pub static GLOBAL: System = System::new();
