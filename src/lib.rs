//! robin-containers: allocator-aware growable array and Robin Hood hash
//! map for a single-threaded game engine core.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: give every engine subsystem the same two containers, each
//!   drawing memory from an explicitly passed allocator rather than the
//!   global heap.
//! - Layers:
//!   - Allocator: capability trait (`allocate`/`free` plus usage counters),
//!     with heap, bump-arena and call-site tracking implementations.
//!   - RawBlock<T>: typed, uninitialized storage obtained from and returned
//!     to an allocator; shared by both containers.
//!   - GrowableArray<T, A>: contiguous sequence with doubling growth and
//!     sparse (default-filling) writes past the end.
//!   - RobinHoodMap<K, V, A, S>: open-addressing map with Robin Hood
//!     displacement, wrapping probes and backward-shift deletion.
//!   - hash: seedable 64-bit span hash used as the map's default hasher.
//!
//! Constraints
//! - Single-threaded: allocators count through `Cell`s and containers hold
//!   raw block pointers, so neither is `Send`/`Sync`.
//! - Each container exclusively owns its block. Holding the allocator by
//!   value makes the container its owner; `&A` and `Rc<A>` share it.
//! - Containers never outlive their allocator; for `&A` the borrow checker
//!   enforces this.
//!
//! Failure semantics
//! - Allocation failure is returned as `Error::AllocationFailed`; nothing
//!   is retried and the container is left as it was.
//! - Key misses are `None`; out-of-range reads through `try_get` are
//!   `Error::OutOfBounds`.
//! - Mutating an unbound container is misuse: logged, fatal in debug
//!   builds, `Error::NoAllocator` in release builds.
//!
//! Hasher and rehashing invariants
//! - Each bucket stores its precomputed `u64` hash; resizing re-places
//!   buckets by stored hash and never calls `K: Hash` again.
//!
//! Notes and non-goals
//! - No concurrent access; wrap a container in a lock if needed.
//! - Arrays never shrink implicitly; `set_capacity` is the explicit way.
//! - Maps grow by doubling once occupancy would exceed
//!   `MapConfig::max_load_percent`; they never shrink.

mod allocator;
mod bump;
mod error;
pub mod growable_array;
pub mod hash;
mod misuse;
mod raw_block;
pub mod robin_map;
mod robin_map_proptest;
mod tracking;

// Public surface
pub use allocator::{Allocator, HeapAllocator};
pub use bump::BumpAllocator;
pub use error::{AllocError, Error};
pub use growable_array::GrowableArray;
pub use hash::{hash_bytes, SeededState, SpanHasher};
pub use robin_map::{Bucket, MapConfig, ProbeStats, RobinHoodMap};
pub use tracking::{AllocationRecord, TrackingAllocator};
