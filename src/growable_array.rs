//! GrowableArray: owning, contiguous, allocator-backed sequence.
//!
//! Growth doubles the capacity with a floor of `MIN_CAPACITY`. Writing past
//! the current length (`insert`, `at_mut`, `set_length`) extends the array
//! and fills the gap with `T::default()` instead of failing.

use crate::allocator::{Allocator, HeapAllocator};
use crate::error::Error;
use crate::misuse;
use crate::raw_block::RawBlock;
use core::fmt;
use core::ops::{Deref, DerefMut};
use core::ptr;

/// Smallest block an array allocates.
pub const MIN_CAPACITY: usize = 4;

pub struct GrowableArray<T, A: Allocator = HeapAllocator> {
    block: RawBlock<T>,
    len: usize,
    alloc: Option<A>,
}

impl<T, A: Allocator> GrowableArray<T, A> {
    /// An array with no allocator. Any mutation that needs memory is misuse.
    pub const fn unbound() -> Self {
        Self {
            block: RawBlock::empty(),
            len: 0,
            alloc: None,
        }
    }

    /// Bind to `alloc` without allocating yet.
    pub const fn new_in(alloc: A) -> Self {
        Self {
            block: RawBlock::empty(),
            len: 0,
            alloc: Some(alloc),
        }
    }

    #[track_caller]
    pub fn with_capacity_in(alloc: A, capacity: usize) -> Result<Self, Error> {
        let mut array = Self::new_in(alloc);
        array.relocate(capacity.max(MIN_CAPACITY))?;
        Ok(array)
    }

    /// Bind to `alloc` and allocate `max(capacity, MIN_CAPACITY)` slots.
    ///
    /// An array that still holds a block is shut down through its previous
    /// allocator first.
    #[track_caller]
    pub fn init(&mut self, alloc: A, capacity: usize) -> Result<(), Error> {
        if self.block.capacity() != 0 {
            misuse::rebind("GrowableArray::init", self.block.capacity());
            self.shutdown();
        }
        self.alloc = Some(alloc);
        self.relocate(capacity.max(MIN_CAPACITY))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.block.capacity()
    }

    pub fn allocator(&self) -> Option<&A> {
        self.alloc.as_ref()
    }

    pub fn as_slice(&self) -> &[T] {
        // SAFETY: [0, len) is initialized; the pointer is non-null and aligned
        // even when no block is held.
        unsafe { core::slice::from_raw_parts(self.block.as_ptr(), self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        // SAFETY: as in `as_slice`, with exclusive access through `&mut self`.
        unsafe { core::slice::from_raw_parts_mut(self.block.as_ptr(), self.len) }
    }

    /// Capacity the growth policy picks when at least `required` slots are needed.
    fn grown_capacity(&self, required: usize) -> usize {
        self.capacity()
            .saturating_mul(2)
            .max(required)
            .max(MIN_CAPACITY)
    }

    #[track_caller]
    fn reserve_for(&mut self, required: usize) -> Result<(), Error> {
        if required <= self.capacity() {
            return Ok(());
        }
        self.relocate(self.grown_capacity(required))
    }

    /// Move the live elements into a fresh block of exactly `new_cap` slots
    /// and release the old block. `new_cap` must be at least `len`.
    #[track_caller]
    fn relocate(&mut self, new_cap: usize) -> Result<(), Error> {
        debug_assert!(new_cap >= self.len);
        let Some(alloc) = self.alloc.as_ref() else {
            return Err(misuse::no_allocator("GrowableArray"));
        };
        let fresh = RawBlock::allocate_in(alloc, new_cap)?;
        // SAFETY: both blocks hold at least `len` slots and do not overlap.
        // The old slots are released without dropping, completing the move.
        unsafe {
            ptr::copy_nonoverlapping(self.block.as_ptr(), fresh.as_ptr(), self.len);
        }
        let old_cap = self.block.capacity();
        let mut old = core::mem::replace(&mut self.block, fresh);
        unsafe { old.release_in(alloc) };
        tracing::trace!(old_cap, new_cap, len = self.len, "relocated array block");
        Ok(())
    }

    /// Make room for at least `additional` more elements.
    #[track_caller]
    pub fn reserve(&mut self, additional: usize) -> Result<(), Error> {
        let required = self
            .len
            .checked_add(additional)
            .ok_or(Error::CapacityOverflow)?;
        self.reserve_for(required)
    }

    /// Append `value`, growing first when full.
    #[track_caller]
    pub fn push(&mut self, value: T) -> Result<(), Error> {
        if self.len == self.capacity() {
            self.reserve(1)?;
        }
        // SAFETY: len < capacity after the reserve above.
        unsafe { self.block.as_ptr().add(self.len).write(value) };
        self.len += 1;
        Ok(())
    }

    /// Append clones of every element of `items`.
    #[track_caller]
    pub fn extend_from_slice(&mut self, items: &[T]) -> Result<(), Error>
    where
        T: Clone,
    {
        self.reserve(items.len())?;
        for item in items {
            // SAFETY: capacity was reserved for all of `items`. `len` is bumped
            // per element so a panicking `clone` leaves a consistent array.
            unsafe { self.block.as_ptr().add(self.len).write(item.clone()) };
            self.len += 1;
        }
        Ok(())
    }

    /// Insert `value` at `index`.
    ///
    /// Below the length, the tail shifts right by one. At or past the
    /// length, the array is extended to `index + 1` and the gap between the
    /// old length and `index` holds `T::default()`. Element types without a
    /// default use `insert_within`.
    #[track_caller]
    pub fn insert(&mut self, index: usize, value: T) -> Result<(), Error>
    where
        T: Default,
    {
        if index <= self.len {
            return self.insert_within(index, value);
        }
        let end = index.checked_add(1).ok_or(Error::CapacityOverflow)?;
        self.reserve_for(end)?;
        self.fill_default(index);
        self.push(value)
    }

    /// Insert `value` at `index <= len`, shifting the tail right by one.
    #[track_caller]
    pub fn insert_within(&mut self, index: usize, value: T) -> Result<(), Error> {
        if index > self.len {
            return Err(Error::OutOfBounds {
                index,
                len: self.len,
            });
        }
        if self.len == self.capacity() {
            self.reserve(1)?;
        }
        // SAFETY: index <= len < capacity; `ptr::copy` handles the overlap.
        unsafe {
            let at = self.block.as_ptr().add(index);
            ptr::copy(at, at.add(1), self.len - index);
            at.write(value);
        }
        self.len += 1;
        Ok(())
    }

    /// Bounds-checked shared access.
    pub fn try_get(&self, index: usize) -> Result<&T, Error> {
        let len = self.len;
        self.as_slice()
            .get(index)
            .ok_or(Error::OutOfBounds { index, len })
    }

    /// Bounds-checked exclusive access. Never extends the array.
    pub fn try_get_mut(&mut self, index: usize) -> Result<&mut T, Error> {
        let len = self.len;
        self.as_mut_slice()
            .get_mut(index)
            .ok_or(Error::OutOfBounds { index, len })
    }

    /// Exclusive access that extends the array when `index >= len`,
    /// default-filling up to and including `index`.
    #[track_caller]
    pub fn at_mut(&mut self, index: usize) -> Result<&mut T, Error>
    where
        T: Default,
    {
        if index >= self.len {
            let end = index.checked_add(1).ok_or(Error::CapacityOverflow)?;
            self.reserve_for(end)?;
            self.fill_default(end);
        }
        self.try_get_mut(index)
    }

    /// Order-preserving removal; shifts the tail left by one.
    pub fn remove_at(&mut self, index: usize) -> Result<T, Error> {
        if index >= self.len {
            return Err(Error::OutOfBounds {
                index,
                len: self.len,
            });
        }
        // SAFETY: index < len; the slot is read out before being overwritten.
        let value = unsafe {
            let at = self.block.as_ptr().add(index);
            let value = at.read();
            ptr::copy(at.add(1), at, self.len - index - 1);
            value
        };
        self.len -= 1;
        Ok(value)
    }

    /// O(1) removal; the last element takes the removed slot.
    pub fn remove_swap_with_tail(&mut self, index: usize) -> Result<T, Error> {
        if index >= self.len {
            return Err(Error::OutOfBounds {
                index,
                len: self.len,
            });
        }
        let last = self.len - 1;
        // SAFETY: index and last are both < len.
        let value = unsafe {
            let base = self.block.as_ptr();
            let value = base.add(index).read();
            if index != last {
                ptr::copy_nonoverlapping(base.add(last), base.add(index), 1);
            }
            value
        };
        self.len = last;
        Ok(value)
    }

    pub fn pop(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        self.len -= 1;
        // SAFETY: the slot at the old `len - 1` was initialized and is now
        // outside the live range.
        Some(unsafe { self.block.as_ptr().add(self.len).read() })
    }

    /// Set the logical length. Growing follows the push growth policy and
    /// default-fills; shrinking drops the removed elements and keeps capacity.
    #[track_caller]
    pub fn set_length(&mut self, len: usize) -> Result<(), Error>
    where
        T: Default,
    {
        if len <= self.len {
            self.truncate(len);
            return Ok(());
        }
        self.reserve_for(len)?;
        self.fill_default(len);
        Ok(())
    }

    /// Drop every element at or past `len`.
    pub fn truncate(&mut self, len: usize) {
        if len >= self.len {
            return;
        }
        let tail = self.len - len;
        self.len = len;
        // SAFETY: [len, len + tail) was initialized and is now outside the
        // live range, so a panicking destructor cannot cause a double drop.
        unsafe {
            let tail = ptr::slice_from_raw_parts_mut(self.block.as_ptr().add(len), tail);
            ptr::drop_in_place(tail);
        }
    }

    /// Reallocate to exactly `capacity` slots. Elements past `capacity` are
    /// dropped; a capacity of zero releases the block.
    #[track_caller]
    pub fn set_capacity(&mut self, capacity: usize) -> Result<(), Error> {
        if capacity == self.capacity() {
            return Ok(());
        }
        self.truncate(capacity);
        self.relocate(capacity)
    }

    /// Drop every element; the block is kept for reuse.
    pub fn clear(&mut self) {
        self.truncate(0);
    }

    /// Drop every element and return the block to the allocator. The array
    /// stays bound and can be used again.
    pub fn shutdown(&mut self) {
        self.clear();
        if let Some(alloc) = self.alloc.as_ref() {
            // SAFETY: the block came from this allocator and is now empty.
            unsafe { self.block.release_in(alloc) };
        }
    }

    /// Default-fill from the current length up to `end`. Capacity for `end`
    /// slots must already be reserved.
    fn fill_default(&mut self, end: usize)
    where
        T: Default,
    {
        debug_assert!(end <= self.capacity());
        while self.len < end {
            // SAFETY: len < end <= capacity.
            unsafe { self.block.as_ptr().add(self.len).write(T::default()) };
            self.len += 1;
        }
    }
}

impl<T, A: Allocator> Drop for GrowableArray<T, A> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<T, A: Allocator> Default for GrowableArray<T, A> {
    fn default() -> Self {
        Self::unbound()
    }
}

impl<T, A: Allocator> Deref for GrowableArray<T, A> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T, A: Allocator> DerefMut for GrowableArray<T, A> {
    fn deref_mut(&mut self) -> &mut [T] {
        self.as_mut_slice()
    }
}

impl<'a, T, A: Allocator> IntoIterator for &'a GrowableArray<T, A> {
    type Item = &'a T;
    type IntoIter = core::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.as_slice().iter()
    }
}

impl<'a, T, A: Allocator> IntoIterator for &'a mut GrowableArray<T, A> {
    type Item = &'a mut T;
    type IntoIter = core::slice::IterMut<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.as_mut_slice().iter_mut()
    }
}

impl<T: fmt::Debug, A: Allocator> fmt::Debug for GrowableArray<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    /// Drop counter shared between a test and the values it stores.
    #[derive(Clone, Default)]
    struct Tracked(Rc<Cell<usize>>);

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.0.set(self.0.get() + 1);
        }
    }

    /// Invariant: initial capacity is floored at MIN_CAPACITY.
    #[test]
    fn init_floors_capacity() {
        let a = HeapAllocator::new();
        let arr: GrowableArray<u8, _> = GrowableArray::with_capacity_in(&a, 1).unwrap();
        assert_eq!(arr.capacity(), MIN_CAPACITY);
        assert!(arr.is_empty());
        assert_eq!(a.allocation_count(), 1);
    }

    /// Invariant: growth doubles capacity and keeps earlier values in place.
    #[test]
    fn push_doubles_capacity() {
        let a = HeapAllocator::new();
        let mut arr = GrowableArray::with_capacity_in(&a, 4).unwrap();
        for i in 0..5u32 {
            arr.push(i).unwrap();
        }
        assert_eq!(arr.capacity(), 8);
        assert_eq!(arr.as_slice(), &[0, 1, 2, 3, 4]);
        assert_eq!(a.allocation_count(), 1, "old block released on growth");
    }

    /// Invariant: pushing onto a bound but unallocated array uses the floor.
    #[test]
    fn first_push_allocates_min_capacity() {
        let a = HeapAllocator::new();
        let mut arr = GrowableArray::new_in(&a);
        assert_eq!(arr.capacity(), 0);
        arr.push(1u64).unwrap();
        assert_eq!(arr.capacity(), MIN_CAPACITY);
    }

    /// Invariant: sparse insert extends the length and default-fills the gap.
    #[test]
    fn sparse_insert_scenario() {
        let a = HeapAllocator::new();
        let mut arr = GrowableArray::with_capacity_in(&a, 4).unwrap();
        arr.push(67i32).unwrap();
        arr.push(32).unwrap();
        arr.push(78).unwrap();
        assert_eq!(arr.len(), 3);
        arr.insert(7, 2312).unwrap();
        assert_eq!(arr.len(), 8);
        assert_eq!(arr.as_slice(), &[67, 32, 78, 0, 0, 0, 0, 2312]);
    }

    /// Invariant: insert within capacity but past length writes without shifting.
    #[test]
    fn insert_past_length_within_capacity() {
        let a = HeapAllocator::new();
        let mut arr = GrowableArray::with_capacity_in(&a, 8).unwrap();
        arr.push(1u8).unwrap();
        arr.insert(5, 9).unwrap();
        assert_eq!(arr.capacity(), 8);
        assert_eq!(arr.as_slice(), &[1, 0, 0, 0, 0, 9]);
    }

    /// Invariant: insert below length shifts the tail right.
    #[test]
    fn insert_shifts_tail() {
        let a = HeapAllocator::new();
        let mut arr = GrowableArray::with_capacity_in(&a, 4).unwrap();
        arr.extend_from_slice(&[1, 2, 3, 4]).unwrap();
        arr.insert(1, 10).unwrap();
        assert_eq!(arr.as_slice(), &[1, 10, 2, 3, 4]);
        arr.insert(0, 20).unwrap();
        assert_eq!(arr.as_slice(), &[20, 1, 10, 2, 3, 4]);
    }

    /// Invariant: shifting inserts need no `Default` and stay within `len`.
    #[test]
    fn insert_within_without_default() {
        #[derive(Debug, PartialEq)]
        struct Id(u32);

        let a = HeapAllocator::new();
        let mut arr = GrowableArray::new_in(&a);
        arr.insert_within(0, Id(2)).unwrap();
        arr.insert_within(0, Id(1)).unwrap();
        arr.insert_within(2, Id(4)).unwrap();
        arr.insert_within(2, Id(3)).unwrap();
        arr.insert_within(4, Id(5)).unwrap();
        assert_eq!(arr.as_slice(), &[Id(1), Id(2), Id(3), Id(4), Id(5)]);
        assert_eq!(arr.capacity(), 8);
        assert_eq!(
            arr.insert_within(7, Id(9)),
            Err(Error::OutOfBounds { index: 7, len: 5 })
        );
        assert_eq!(arr.len(), 5);
    }

    /// Invariant: the two removal flavors differ only in ordering.
    #[test]
    fn remove_at_vs_swap_with_tail() {
        let a = HeapAllocator::new();
        let mut ordered = GrowableArray::new_in(&a);
        ordered.extend_from_slice(&[1, 2, 3, 4, 5]).unwrap();
        assert_eq!(ordered.remove_at(1), Ok(2));
        assert_eq!(ordered.as_slice(), &[1, 3, 4, 5]);

        let mut swapped = GrowableArray::new_in(&a);
        swapped.extend_from_slice(&[1, 2, 3, 4, 5]).unwrap();
        assert_eq!(swapped.remove_swap_with_tail(1), Ok(2));
        assert_eq!(swapped.as_slice(), &[1, 5, 3, 4]);
        assert_eq!(swapped.remove_swap_with_tail(3), Ok(4));
        assert_eq!(swapped.as_slice(), &[1, 5, 3]);
    }

    /// Invariant: out-of-range reads and removals are explicit errors.
    #[test]
    fn out_of_bounds_is_an_error() {
        let a = HeapAllocator::new();
        let mut arr = GrowableArray::new_in(&a);
        arr.push('x').unwrap();
        assert_eq!(arr.try_get(0), Ok(&'x'));
        assert_eq!(arr.try_get(1), Err(Error::OutOfBounds { index: 1, len: 1 }));
        assert_eq!(arr.remove_at(3), Err(Error::OutOfBounds { index: 3, len: 1 }));
        assert!(arr.try_get_mut(1).is_err());
        assert_eq!(arr.len(), 1);
    }

    /// Invariant: `at_mut` extends on out-of-range access; reading stays checked.
    #[test]
    fn at_mut_extends() {
        let a = HeapAllocator::new();
        let mut arr: GrowableArray<u16, _> = GrowableArray::new_in(&a);
        *arr.at_mut(9).unwrap() = 7;
        assert_eq!(arr.len(), 10);
        assert!(arr.capacity() >= 10);
        assert_eq!(arr[9], 7);
        assert!(arr[..9].iter().all(|&v| v == 0));
        *arr.at_mut(2).unwrap() = 3;
        assert_eq!(arr.len(), 10);
    }

    /// Invariant: shrinking length runs destructors but keeps capacity.
    #[test]
    fn set_length_shrink_drops_and_keeps_capacity() {
        let drops = Rc::new(Cell::new(0));
        let a = HeapAllocator::new();
        let mut arr = GrowableArray::new_in(&a);
        for _ in 0..6 {
            arr.push(Tracked(drops.clone())).unwrap();
        }
        let cap = arr.capacity();
        arr.set_length(2).unwrap();
        assert_eq!(drops.get(), 4);
        assert_eq!(arr.capacity(), cap);
        // Default-filled values carry their own counters.
        arr.set_length(5).unwrap();
        assert_eq!(arr.len(), 5);
        assert_eq!(drops.get(), 4);
        drop(arr);
        assert_eq!(drops.get(), 6);
    }

    /// Invariant: set_capacity reallocates exactly and can release the block.
    #[test]
    fn set_capacity_exact() {
        let a = HeapAllocator::new();
        let mut arr = GrowableArray::new_in(&a);
        arr.extend_from_slice(&[1u32, 2, 3, 4, 5, 6]).unwrap();
        arr.set_capacity(3).unwrap();
        assert_eq!(arr.capacity(), 3);
        assert_eq!(arr.as_slice(), &[1, 2, 3]);
        arr.set_capacity(0).unwrap();
        assert_eq!(arr.capacity(), 0);
        assert_eq!(a.allocation_count(), 0);
    }

    /// Invariant: clear keeps the block; shutdown releases it and the array
    /// can be reused afterwards.
    #[test]
    fn clear_then_shutdown_then_reuse() {
        let a = HeapAllocator::new();
        let mut arr = GrowableArray::with_capacity_in(&a, 16).unwrap();
        arr.extend_from_slice(&[1u8; 10]).unwrap();
        arr.clear();
        assert_eq!(arr.len(), 0);
        assert_eq!(arr.capacity(), 16);
        arr.shutdown();
        assert_eq!(arr.capacity(), 0);
        assert_eq!(a.used_size(), 0);
        arr.push(5).unwrap();
        assert_eq!(arr.as_slice(), &[5]);
    }

    /// Invariant: pop returns elements in reverse and None when empty.
    #[test]
    fn pop_order() {
        let a = HeapAllocator::new();
        let mut arr = GrowableArray::new_in(&a);
        arr.extend_from_slice(&["a".to_string(), "b".to_string()]).unwrap();
        assert_eq!(arr.pop().as_deref(), Some("b"));
        assert_eq!(arr.pop().as_deref(), Some("a"));
        assert_eq!(arr.pop(), None);
    }

    /// Invariant: every element is dropped exactly once across relocations.
    #[test]
    fn relocation_never_double_drops() {
        let drops = Rc::new(Cell::new(0));
        let a = HeapAllocator::new();
        let mut arr = GrowableArray::new_in(&a);
        for _ in 0..33 {
            arr.push(Tracked(drops.clone())).unwrap();
        }
        let removed = arr.remove_at(0).unwrap();
        drop(removed);
        let swapped = arr.remove_swap_with_tail(0).unwrap();
        drop(swapped);
        assert_eq!(drops.get(), 2);
        drop(arr);
        assert_eq!(drops.get(), 33);
    }

    /// Invariant: re-initializing a live array releases the old block through
    /// the old allocator before binding the new one.
    #[test]
    fn init_on_live_array_releases_old_block() {
        let first = HeapAllocator::new();
        let second = HeapAllocator::new();
        let mut arr = GrowableArray::with_capacity_in(&first, 8).unwrap();
        arr.push(1i64).unwrap();
        arr.init(&second, 4).unwrap();
        assert_eq!(first.allocation_count(), 0);
        assert_eq!(second.allocation_count(), 1);
        assert!(arr.is_empty());
    }

    /// Invariant: allocation failure is propagated and leaves contents intact.
    #[test]
    fn allocation_failure_propagates() {
        let a = HeapAllocator::with_limit(16);
        let mut arr = GrowableArray::with_capacity_in(&a, 4).unwrap();
        for i in 0..4u32 {
            arr.push(i).unwrap();
        }
        assert_eq!(
            arr.push(4),
            Err(Error::AllocationFailed { size: 32, align: 4 })
        );
        assert_eq!(arr.as_slice(), &[0, 1, 2, 3]);
        assert_eq!(arr.capacity(), 4);
    }

    /// Invariant (debug-only): mutating an unbound array panics.
    #[cfg(debug_assertions)]
    #[test]
    fn unbound_push_panics_in_debug() {
        let res = std::panic::catch_unwind(|| {
            let mut arr: GrowableArray<u8> = GrowableArray::unbound();
            let _ = arr.push(1);
        });
        assert!(res.is_err(), "expected misuse to panic in debug builds");
    }

    /// Invariant (release-only): mutating an unbound array is a reported no-op.
    #[cfg(not(debug_assertions))]
    #[test]
    fn unbound_push_is_noop_in_release() {
        let mut arr: GrowableArray<u8> = GrowableArray::unbound();
        assert_eq!(arr.push(1), Err(Error::NoAllocator));
        assert!(arr.is_empty());
        assert_eq!(arr.capacity(), 0);
    }

    /// Invariant: zero-sized elements never touch the allocator.
    #[test]
    fn zero_sized_elements() {
        let a = HeapAllocator::new();
        let mut arr = GrowableArray::new_in(&a);
        for _ in 0..100 {
            arr.push(()).unwrap();
        }
        assert_eq!(arr.len(), 100);
        assert_eq!(a.allocation_count(), 0);
    }
}
