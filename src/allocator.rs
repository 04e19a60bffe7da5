//! Allocator capability consumed by the containers.
//!
//! Containers never touch the global heap directly: every block they hold
//! is requested from an `Allocator` and returned to the same allocator.
//! Allocators take `&self` so that several containers can share one
//! instance through `&A` or `Rc<A>`; counters live in `Cell`s, which keeps
//! every allocator here single-threaded (`!Sync`).

use crate::error::AllocError;
use core::alloc::Layout;
use core::cell::Cell;
use core::ptr::NonNull;
use std::rc::Rc;

/// A source of raw memory blocks.
///
/// # Safety contract for callers
/// - `free` must receive a pointer returned by `allocate` on the same
///   allocator, together with the layout used to obtain it.
/// - Zero-sized layouts are never requested; implementations may reject them.
pub trait Allocator {
    /// Obtain a block fitting `layout`.
    #[track_caller]
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError>;

    /// Return a block to the allocator.
    ///
    /// # Safety
    /// `ptr` must come from `allocate` on this allocator with `layout`, and
    /// must not be used afterwards.
    #[track_caller]
    unsafe fn free(&self, ptr: NonNull<u8>, layout: Layout);

    /// Bytes this allocator can hand out in total.
    fn total_size(&self) -> usize;

    /// Bytes currently handed out.
    fn used_size(&self) -> usize;

    /// Blocks currently handed out.
    fn allocation_count(&self) -> usize;
}

impl<A: Allocator + ?Sized> Allocator for &A {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        (**self).allocate(layout)
    }

    unsafe fn free(&self, ptr: NonNull<u8>, layout: Layout) {
        (**self).free(ptr, layout)
    }

    fn total_size(&self) -> usize {
        (**self).total_size()
    }

    fn used_size(&self) -> usize {
        (**self).used_size()
    }

    fn allocation_count(&self) -> usize {
        (**self).allocation_count()
    }
}

impl<A: Allocator + ?Sized> Allocator for Rc<A> {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        (**self).allocate(layout)
    }

    unsafe fn free(&self, ptr: NonNull<u8>, layout: Layout) {
        (**self).free(ptr, layout)
    }

    fn total_size(&self) -> usize {
        (**self).total_size()
    }

    fn used_size(&self) -> usize {
        (**self).used_size()
    }

    fn allocation_count(&self) -> usize {
        (**self).allocation_count()
    }
}

/// Global-heap backed allocator with usage counters.
///
/// An optional byte limit makes requests fail once the limit would be
/// exceeded, which is how exhaustion is exercised in tests.
#[derive(Debug, Default)]
pub struct HeapAllocator {
    limit: Option<usize>,
    used: Cell<usize>,
    count: Cell<usize>,
}

impl HeapAllocator {
    pub const fn new() -> Self {
        Self {
            limit: None,
            used: Cell::new(0),
            count: Cell::new(0),
        }
    }

    /// Heap allocator that refuses to hand out more than `bytes` at once.
    pub const fn with_limit(bytes: usize) -> Self {
        Self {
            limit: Some(bytes),
            used: Cell::new(0),
            count: Cell::new(0),
        }
    }

    fn within_limit(&self, size: usize) -> bool {
        match self.limit {
            Some(limit) => self
                .used
                .get()
                .checked_add(size)
                .is_some_and(|total| total <= limit),
            None => true,
        }
    }
}

impl Allocator for HeapAllocator {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        if layout.size() == 0 || !self.within_limit(layout.size()) {
            return Err(AllocError::new(layout));
        }
        // SAFETY: layout has a non-zero size.
        let raw = unsafe { std::alloc::alloc(layout) };
        let ptr = NonNull::new(raw).ok_or_else(|| AllocError::new(layout))?;
        self.used.set(self.used.get() + layout.size());
        self.count.set(self.count.get() + 1);
        Ok(ptr)
    }

    unsafe fn free(&self, ptr: NonNull<u8>, layout: Layout) {
        std::alloc::dealloc(ptr.as_ptr(), layout);
        self.used.set(self.used.get().saturating_sub(layout.size()));
        self.count.set(self.count.get().saturating_sub(1));
    }

    fn total_size(&self) -> usize {
        self.limit.unwrap_or(usize::MAX)
    }

    fn used_size(&self) -> usize {
        self.used.get()
    }

    fn allocation_count(&self) -> usize {
        self.count.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_track_live_blocks() {
        let a = HeapAllocator::new();
        let layout = Layout::from_size_align(64, 8).unwrap();
        let p = a.allocate(layout).unwrap();
        let q = a.allocate(layout).unwrap();
        assert_eq!(a.used_size(), 128);
        assert_eq!(a.allocation_count(), 2);
        unsafe {
            a.free(p, layout);
            a.free(q, layout);
        }
        assert_eq!(a.used_size(), 0);
        assert_eq!(a.allocation_count(), 0);
    }

    #[test]
    fn limit_rejects_oversized_requests() {
        let a = HeapAllocator::with_limit(100);
        let small = Layout::from_size_align(60, 8).unwrap();
        let p = a.allocate(small).unwrap();
        assert_eq!(a.allocate(small), Err(AllocError::new(small)));
        unsafe { a.free(p, small) };
        let q = a.allocate(small).expect("fits again after free");
        unsafe { a.free(q, small) };
        assert_eq!(a.total_size(), 100);
    }

    #[test]
    fn zero_sized_requests_are_rejected() {
        let a = HeapAllocator::new();
        let layout = Layout::from_size_align(0, 1).unwrap();
        assert!(a.allocate(layout).is_err());
        assert_eq!(a.allocation_count(), 0);
    }

    #[test]
    fn shared_handles_see_same_counters() {
        let a = Rc::new(HeapAllocator::new());
        let by_ref = &*a;
        let layout = Layout::new::<u64>();
        let p = Allocator::allocate(&a, layout).unwrap();
        assert_eq!(Allocator::used_size(&by_ref), 8);
        unsafe { Allocator::free(&by_ref, p, layout) };
        assert_eq!(a.used_size(), 0);
    }
}
