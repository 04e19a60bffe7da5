//! TrackingAllocator: decorator that records the call site of every live
//! block handed out by an inner allocator.
//!
//! Container entry points that may allocate are `#[track_caller]`, so the
//! recorded location is the user's call (`array.push(..)`), not container
//! internals. The tracker is an explicit service: construct it around an
//! allocator, pass it (usually by reference) to containers, and call
//! `shutdown` to get the inner allocator back and a report of leaks.

use crate::allocator::Allocator;
use crate::error::AllocError;
use core::alloc::Layout;
use core::cell::{Cell, RefCell};
use core::panic::Location;
use core::ptr::NonNull;
use hashbrown::HashMap;

/// Metadata kept for each live block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AllocationRecord {
    pub size: usize,
    pub align: usize,
    pub location: &'static Location<'static>,
}

pub struct TrackingAllocator<A> {
    inner: A,
    live: RefCell<HashMap<usize, AllocationRecord>>,
    peak_used: Cell<usize>,
    failures: Cell<usize>,
}

impl<A: Allocator> TrackingAllocator<A> {
    pub fn new(inner: A) -> Self {
        Self {
            inner,
            live: RefCell::new(HashMap::new()),
            peak_used: Cell::new(0),
            failures: Cell::new(0),
        }
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }

    /// Snapshot of the blocks currently handed out, ordered by call site.
    pub fn live_allocations(&self) -> Vec<AllocationRecord> {
        let mut records: Vec<_> = self.live.borrow().values().copied().collect();
        records.sort_by_key(|r| (r.location.file(), r.location.line(), r.location.column()));
        records
    }

    /// Highest `used_size` observed on the inner allocator.
    pub fn peak_used(&self) -> usize {
        self.peak_used.get()
    }

    /// Number of requests the inner allocator refused.
    pub fn failures(&self) -> usize {
        self.failures.get()
    }

    /// End the tracking session: log every block that was never returned
    /// and hand back the inner allocator together with those records.
    pub fn shutdown(self) -> (A, Vec<AllocationRecord>) {
        let leaks = self.live_allocations();
        for leak in &leaks {
            tracing::warn!(
                size = leak.size,
                align = leak.align,
                at = %leak.location,
                "block leaked past tracking allocator shutdown"
            );
        }
        (self.inner, leaks)
    }
}

impl<A: Allocator> Allocator for TrackingAllocator<A> {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        let location = Location::caller();
        match self.inner.allocate(layout) {
            Ok(ptr) => {
                let record = AllocationRecord {
                    size: layout.size(),
                    align: layout.align(),
                    location,
                };
                self.live.borrow_mut().insert(ptr.as_ptr() as usize, record);
                self.peak_used
                    .set(self.peak_used.get().max(self.inner.used_size()));
                Ok(ptr)
            }
            Err(e) => {
                self.failures.set(self.failures.get() + 1);
                tracing::debug!(size = e.size, align = e.align, at = %location, "tracked allocation failed");
                Err(e)
            }
        }
    }

    unsafe fn free(&self, ptr: NonNull<u8>, layout: Layout) {
        let removed = self.live.borrow_mut().remove(&(ptr.as_ptr() as usize));
        match removed {
            Some(record) if record.size != layout.size() || record.align != layout.align() => {
                tracing::error!(
                    recorded_size = record.size,
                    freed_size = layout.size(),
                    allocated_at = %record.location,
                    freed_at = %Location::caller(),
                    "block freed with a different layout than it was allocated with"
                );
            }
            Some(_) => {}
            None => {
                tracing::error!(at = %Location::caller(), "free of a block this tracker never handed out");
            }
        }
        self.inner.free(ptr, layout)
    }

    fn total_size(&self) -> usize {
        self.inner.total_size()
    }

    fn used_size(&self) -> usize {
        self.inner.used_size()
    }

    fn allocation_count(&self) -> usize {
        self.inner.allocation_count()
    }
}
