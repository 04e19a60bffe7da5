//! Error types shared by the allocators and containers.

use core::alloc::Layout;
use thiserror::Error;

/// An allocator could not satisfy a request.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("allocator could not provide {size} bytes aligned to {align}")]
pub struct AllocError {
    pub size: usize,
    pub align: usize,
}

impl AllocError {
    pub fn new(layout: Layout) -> Self {
        Self {
            size: layout.size(),
            align: layout.align(),
        }
    }
}

/// Failures reported by container operations.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The backing allocator ran out of memory.
    #[error("allocation of {size} bytes (align {align}) failed")]
    AllocationFailed { size: usize, align: usize },

    /// The requested capacity does not fit in the address space.
    #[error("capacity overflow")]
    CapacityOverflow,

    /// An index at or past the array length was read.
    #[error("index {index} out of bounds for length {len}")]
    OutOfBounds { index: usize, len: usize },

    /// The container was mutated before an allocator was bound to it.
    #[error("container has no allocator bound")]
    NoAllocator,
}

impl From<AllocError> for Error {
    fn from(e: AllocError) -> Self {
        Error::AllocationFailed {
            size: e.size,
            align: e.align,
        }
    }
}
