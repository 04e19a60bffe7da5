//! Bump (arena) allocator over a single slab.
//!
//! Allocation moves an offset forward. Freeing only reclaims space when the
//! freed block is the most recent one, or when the last outstanding block
//! is returned, in which case the whole arena rewinds.

use crate::allocator::Allocator;
use crate::error::AllocError;
use core::alloc::Layout;
use core::cell::Cell;
use core::ptr::NonNull;

const SLAB_ALIGN: usize = 16;

pub struct BumpAllocator {
    slab: NonNull<u8>,
    capacity: usize,
    offset: Cell<usize>,
    // Start offset of the most recent block, if it is still live.
    last: Cell<Option<usize>>,
    count: Cell<usize>,
}

impl BumpAllocator {
    /// Reserve a slab of `capacity` bytes from the global heap.
    pub fn new(capacity: usize) -> Result<Self, AllocError> {
        let layout = Layout::from_size_align(capacity.max(1), SLAB_ALIGN).map_err(|_| AllocError {
            size: capacity,
            align: SLAB_ALIGN,
        })?;
        // SAFETY: layout size is at least one byte.
        let raw = unsafe { std::alloc::alloc(layout) };
        let slab = NonNull::new(raw).ok_or_else(|| AllocError::new(layout))?;
        Ok(Self {
            slab,
            capacity,
            offset: Cell::new(0),
            last: Cell::new(None),
            count: Cell::new(0),
        })
    }

    /// Bytes still available past the current offset (ignoring alignment).
    pub fn remaining(&self) -> usize {
        self.capacity - self.offset.get()
    }

    /// Rewind the arena. Requires exclusive access, so no block handed out
    /// earlier can still be referenced through a borrowing container.
    pub fn reset(&mut self) {
        if self.count.get() != 0 {
            tracing::warn!(
                live = self.count.get(),
                "bump allocator reset with blocks still outstanding"
            );
        }
        self.offset.set(0);
        self.last.set(None);
        self.count.set(0);
    }

    fn slab_layout(&self) -> Layout {
        // Same arguments as in `new`, which already validated them.
        Layout::from_size_align(self.capacity.max(1), SLAB_ALIGN).unwrap_or(Layout::new::<u8>())
    }
}

impl Allocator for BumpAllocator {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        if layout.size() == 0 {
            return Err(AllocError::new(layout));
        }
        let base = self.slab.as_ptr() as usize;
        let cursor = base + self.offset.get();
        let aligned = cursor
            .checked_add(layout.align() - 1)
            .map(|c| c & !(layout.align() - 1))
            .ok_or_else(|| AllocError::new(layout))?;
        let start = aligned - base;
        let end = start
            .checked_add(layout.size())
            .filter(|&end| end <= self.capacity)
            .ok_or_else(|| AllocError::new(layout))?;

        self.offset.set(end);
        self.last.set(Some(start));
        self.count.set(self.count.get() + 1);
        // SAFETY: start < end <= capacity, so the pointer stays inside the slab.
        Ok(unsafe { NonNull::new_unchecked(self.slab.as_ptr().add(start)) })
    }

    unsafe fn free(&self, ptr: NonNull<u8>, layout: Layout) {
        let start = ptr.as_ptr() as usize - self.slab.as_ptr() as usize;
        let remaining = self.count.get().saturating_sub(1);
        self.count.set(remaining);
        if remaining == 0 {
            self.offset.set(0);
            self.last.set(None);
        } else if self.last.get() == Some(start) && start + layout.size() == self.offset.get() {
            self.offset.set(start);
            self.last.set(None);
        }
    }

    fn total_size(&self) -> usize {
        self.capacity
    }

    fn used_size(&self) -> usize {
        self.offset.get()
    }

    fn allocation_count(&self) -> usize {
        self.count.get()
    }
}

impl Drop for BumpAllocator {
    fn drop(&mut self) {
        if self.count.get() != 0 {
            tracing::warn!(
                live = self.count.get(),
                "bump allocator dropped with blocks still outstanding"
            );
        }
        // SAFETY: slab was obtained from the global heap with this layout.
        unsafe { std::alloc::dealloc(self.slab.as_ptr(), self.slab_layout()) };
    }
}

impl core::fmt::Debug for BumpAllocator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BumpAllocator")
            .field("capacity", &self.capacity)
            .field("used", &self.offset.get())
            .field("count", &self.count.get())
            .finish()
    }
}
