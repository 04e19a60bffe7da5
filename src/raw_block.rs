//! Typed, uninitialized storage obtained from an `Allocator`.
//!
//! A `RawBlock` does not remember its allocator and has no `Drop`: the
//! owning container must hand it back through `release_in` with the same
//! allocator it was obtained from. Element initialization is entirely the
//! container's business.

use crate::allocator::Allocator;
use crate::error::Error;
use core::alloc::Layout;
use core::ptr::NonNull;

pub(crate) struct RawBlock<T> {
    ptr: NonNull<T>,
    cap: usize,
}

impl<T> RawBlock<T> {
    pub(crate) const fn empty() -> Self {
        Self {
            ptr: NonNull::dangling(),
            cap: 0,
        }
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.cap
    }

    #[inline]
    pub(crate) fn as_ptr(&self) -> *mut T {
        self.ptr.as_ptr()
    }

    fn layout(cap: usize) -> Result<Layout, Error> {
        Layout::array::<T>(cap).map_err(|_| Error::CapacityOverflow)
    }

    /// Obtain room for `cap` elements. Zero-sized element types never reach
    /// the allocator.
    #[track_caller]
    pub(crate) fn allocate_in<A: Allocator + ?Sized>(alloc: &A, cap: usize) -> Result<Self, Error> {
        if cap == 0 {
            return Ok(Self::empty());
        }
        let layout = Self::layout(cap)?;
        if layout.size() == 0 {
            return Ok(Self {
                ptr: NonNull::dangling(),
                cap,
            });
        }
        match alloc.allocate(layout) {
            Ok(ptr) => Ok(Self {
                ptr: ptr.cast(),
                cap,
            }),
            Err(e) => {
                tracing::debug!(size = e.size, align = e.align, "container block allocation failed");
                Err(e.into())
            }
        }
    }

    /// Return the block to `alloc` and leave `self` empty.
    ///
    /// # Safety
    /// `self` must have been obtained from `alloc`, and every element must
    /// already be dropped or moved out.
    #[track_caller]
    pub(crate) unsafe fn release_in<A: Allocator + ?Sized>(&mut self, alloc: &A) {
        if self.cap == 0 {
            return;
        }
        if let Ok(layout) = Self::layout(self.cap) {
            if layout.size() != 0 {
                alloc.free(self.ptr.cast(), layout);
            }
        }
        *self = Self::empty();
    }
}
