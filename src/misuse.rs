//! Misuse reporting for containers.
//!
//! Mutating a container that has no allocator bound is a programmer error.
//! It is always logged with the caller's location. In debug builds it then
//! panics; in release builds the operation is abandoned and
//! `Error::NoAllocator` is returned, leaving the container untouched.

use crate::error::Error;
use core::panic::Location;

/// Report an attempt to mutate an unbound container.
#[track_caller]
#[inline(never)]
pub(crate) fn no_allocator(op: &'static str) -> Error {
    let at = Location::caller();
    tracing::error!(op, %at, "container mutated without an allocator");

    #[cfg(debug_assertions)]
    {
        panic!("{op} called on a container with no allocator bound (at {at})");
    }

    #[cfg(not(debug_assertions))]
    {
        Error::NoAllocator
    }
}

/// Report that a live container is being bound to a new allocator. The
/// caller releases the old block before rebinding.
#[track_caller]
pub(crate) fn rebind(op: &'static str, held_capacity: usize) {
    tracing::warn!(
        op,
        held_capacity,
        at = %Location::caller(),
        "rebinding a container that still holds a block; releasing it first"
    );
}
