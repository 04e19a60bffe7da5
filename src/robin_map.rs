//! RobinHoodMap: open-addressing hash map with Robin Hood displacement.
//!
//! The table is a flat, power-of-two sized block of `Option<Bucket>` slots
//! obtained from the map's allocator. Every bucket stores its precomputed
//! hash and its probe distance from the ideal slot `hash & mask`.
//!
//! Invariants, for every occupied slot `i`:
//! - `distance(i)` equals the cyclic offset of `i` from the bucket's ideal slot.
//! - If slot `i + 1` is occupied, `distance(i + 1) <= distance(i) + 1`.
//! - If `distance(i) > 0`, slot `i - 1` is occupied.
//!
//! Probing wraps around the end of the table. Removal shifts the rest of
//! the probe run back by one slot, so no tombstones are needed. `K: Hash` is
//! only invoked on the way in; resizing re-places buckets by stored hash.

use crate::allocator::{Allocator, HeapAllocator};
use crate::error::Error;
use crate::hash::SeededState;
use crate::misuse;
use crate::raw_block::RawBlock;
use core::borrow::Borrow;
use core::fmt;
use core::hash::{BuildHasher, Hash};
use core::mem;

/// Bucket count used when none is requested.
pub const DEFAULT_CAPACITY: usize = 32;

/// Smallest table a map allocates.
pub const MIN_BUCKETS: usize = 8;

const MIN_LOAD_PERCENT: u8 = 10;
const MAX_LOAD_PERCENT: u8 = 95;

/// Sizing knobs for a `RobinHoodMap`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MapConfig {
    /// Buckets allocated at construction (rounded up to a power of two).
    pub initial_capacity: usize,
    /// The table doubles before an insert of a new key would push the
    /// occupancy above this percentage.
    pub max_load_percent: u8,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            initial_capacity: DEFAULT_CAPACITY,
            max_load_percent: 87,
        }
    }
}

impl MapConfig {
    pub const fn with_initial_capacity(mut self, initial_capacity: usize) -> Self {
        self.initial_capacity = initial_capacity;
        self
    }

    pub const fn with_max_load_percent(mut self, max_load_percent: u8) -> Self {
        self.max_load_percent = max_load_percent;
        self
    }

    fn validated(self) -> Self {
        let clamped = self
            .max_load_percent
            .clamp(MIN_LOAD_PERCENT, MAX_LOAD_PERCENT);
        if clamped != self.max_load_percent {
            tracing::warn!(
                requested = self.max_load_percent,
                used = clamped,
                "max_load_percent out of range; clamped"
            );
        }
        Self {
            max_load_percent: clamped,
            ..self
        }
    }
}

fn table_capacity(requested: usize) -> Result<usize, Error> {
    requested
        .max(MIN_BUCKETS)
        .checked_next_power_of_two()
        .ok_or(Error::CapacityOverflow)
}

/// One occupied slot.
#[derive(Debug)]
pub struct Bucket<K, V> {
    hash: u64,
    distance: usize,
    key: K,
    value: V,
}

impl<K, V> Bucket<K, V> {
    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    /// Slots between this bucket and its ideal slot.
    pub fn distance(&self) -> usize {
        self.distance
    }

    pub fn hash(&self) -> u64 {
        self.hash
    }
}

type Slot<K, V> = Option<Bucket<K, V>>;

/// Probe-length summary over the occupied buckets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProbeStats {
    pub len: usize,
    pub capacity: usize,
    pub max_distance: usize,
    pub total_distance: usize,
}

impl ProbeStats {
    pub fn mean_distance(&self) -> f64 {
        if self.len == 0 {
            0.0
        } else {
            self.total_distance as f64 / self.len as f64
        }
    }

    pub fn load_factor(&self) -> f64 {
        if self.capacity == 0 {
            0.0
        } else {
            self.len as f64 / self.capacity as f64
        }
    }
}

pub struct RobinHoodMap<K, V, A: Allocator = HeapAllocator, S = SeededState> {
    slots: RawBlock<Slot<K, V>>,
    len: usize,
    config: MapConfig,
    hasher: S,
    alloc: Option<A>,
}

impl<K, V, A: Allocator, S: Default> RobinHoodMap<K, V, A, S> {
    /// A map with no allocator. Lookups report misses; inserting is misuse.
    pub fn unbound() -> Self {
        Self {
            slots: RawBlock::empty(),
            len: 0,
            config: MapConfig::default(),
            hasher: S::default(),
            alloc: None,
        }
    }

    /// Map with `DEFAULT_CAPACITY` buckets.
    #[track_caller]
    pub fn new_in(alloc: A) -> Result<Self, Error> {
        Self::with_hasher_in(alloc, MapConfig::default(), S::default())
    }

    #[track_caller]
    pub fn with_capacity_in(alloc: A, capacity: usize) -> Result<Self, Error> {
        Self::with_hasher_in(
            alloc,
            MapConfig::default().with_initial_capacity(capacity),
            S::default(),
        )
    }

    #[track_caller]
    pub fn with_config_in(alloc: A, config: MapConfig) -> Result<Self, Error> {
        Self::with_hasher_in(alloc, config, S::default())
    }
}

impl<K, V, A: Allocator, S> RobinHoodMap<K, V, A, S> {
    #[track_caller]
    pub fn with_hasher_in(alloc: A, config: MapConfig, hasher: S) -> Result<Self, Error> {
        let mut map = Self {
            slots: RawBlock::empty(),
            len: 0,
            config: config.validated(),
            hasher,
            alloc: Some(alloc),
        };
        map.resize(map.config.initial_capacity)?;
        Ok(map)
    }

    /// Bind to `alloc` and allocate `capacity` buckets (rounded up to a
    /// power of two). A map that still holds a table is shut down through
    /// its previous allocator first.
    #[track_caller]
    pub fn init(&mut self, alloc: A, capacity: usize) -> Result<(), Error> {
        if self.slots.capacity() != 0 {
            misuse::rebind("RobinHoodMap::init", self.slots.capacity());
            self.shutdown();
        }
        self.alloc = Some(alloc);
        self.config.initial_capacity = capacity;
        self.resize(capacity)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of buckets in the table.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.capacity()
    }

    pub fn config(&self) -> MapConfig {
        self.config
    }

    pub fn allocator(&self) -> Option<&A> {
        self.alloc.as_ref()
    }

    pub fn hasher(&self) -> &S {
        &self.hasher
    }

    fn slots(&self) -> &[Slot<K, V>] {
        // SAFETY: every slot of an allocated table is initialized to `None`
        // or `Some` at all times; an empty block yields an empty slice.
        unsafe { core::slice::from_raw_parts(self.slots.as_ptr(), self.slots.capacity()) }
    }

    fn slots_mut(&mut self) -> &mut [Slot<K, V>] {
        // SAFETY: as in `slots`, with exclusive access through `&mut self`.
        unsafe { core::slice::from_raw_parts_mut(self.slots.as_ptr(), self.slots.capacity()) }
    }

    /// Place a bucket known to be absent. The table must have a free slot.
    fn place(&mut self, mut carried: Bucket<K, V>) {
        let slots = self.slots_mut();
        let mask = slots.len() - 1;
        let mut idx = carried.hash as usize & mask;
        carried.distance = 0;
        loop {
            match slots[idx] {
                Some(ref mut resident) => {
                    if resident.distance < carried.distance {
                        mem::swap(resident, &mut carried);
                    }
                }
                None => {
                    slots[idx] = Some(carried);
                    return;
                }
            }
            idx = (idx + 1) & mask;
            carried.distance += 1;
        }
    }

    /// Move every bucket into a fresh table of at least `requested` slots.
    #[track_caller]
    fn resize(&mut self, requested: usize) -> Result<(), Error> {
        let new_cap = table_capacity(requested)?;
        let Some(alloc) = self.alloc.as_ref() else {
            return Err(misuse::no_allocator("RobinHoodMap"));
        };
        let fresh = RawBlock::<Slot<K, V>>::allocate_in(alloc, new_cap)?;
        for i in 0..new_cap {
            // SAFETY: i < new_cap; the slot is uninitialized.
            unsafe { fresh.as_ptr().add(i).write(None) };
        }

        let mut old = mem::replace(&mut self.slots, fresh);
        let old_cap = old.capacity();
        for i in 0..old_cap {
            // SAFETY: every old slot is initialized and read exactly once; the
            // old block is released below without dropping its contents.
            if let Some(bucket) = unsafe { old.as_ptr().add(i).read() } {
                self.place(bucket);
            }
        }
        if let Some(alloc) = self.alloc.as_ref() {
            unsafe { old.release_in(alloc) };
        }
        tracing::trace!(old_cap, new_cap, len = self.len, "resized robin hood table");
        Ok(())
    }

    /// Make sure one more key fits under the load limit, doubling as many
    /// times as needed. A map without a table starts from the configured
    /// initial capacity.
    #[track_caller]
    fn reserve_one(&mut self) -> Result<(), Error> {
        let cap = self.capacity();
        let load = self.config.max_load_percent as usize;
        let needed = (self.len + 1).saturating_mul(100);
        let mut target = if cap == 0 {
            table_capacity(self.config.initial_capacity)?
        } else {
            cap
        };
        while needed > target.saturating_mul(load) {
            target = target.checked_mul(2).ok_or(Error::CapacityOverflow)?;
        }
        if target == cap {
            return Ok(());
        }
        self.resize(target)
    }

    /// Grow so that `additional` more keys fit under the load limit.
    #[track_caller]
    pub fn reserve(&mut self, additional: usize) -> Result<(), Error> {
        let wanted = self
            .len
            .checked_add(additional)
            .and_then(|n| n.checked_mul(100))
            .ok_or(Error::CapacityOverflow)?;
        let load = self.config.max_load_percent as usize;
        let buckets = wanted.div_ceil(load).max(self.config.initial_capacity);
        if buckets <= self.capacity() {
            return Ok(());
        }
        self.resize(buckets)
    }

    /// Drop every entry; the table is kept.
    ///
    /// If a destructor panics, the remaining slots are still emptied while
    /// unwinding, so the map is left empty rather than holding entries it
    /// has already dropped.
    pub fn clear(&mut self) {
        self.len = 0;
        let mut drain = SlotDrain {
            slots: self.slots_mut().iter_mut(),
        };
        drain.run();
    }

    /// Drop every entry and return the table to the allocator. The map stays
    /// bound; the next insert allocates the configured initial capacity.
    pub fn shutdown(&mut self) {
        self.clear();
        let Some(alloc) = self.alloc.as_ref() else {
            return;
        };
        // SAFETY: every slot is `None` after `clear`, so nothing is left to drop.
        unsafe { self.slots.release_in(alloc) };
    }

    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            it: self.slots().iter(),
        }
    }

    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        IterMut {
            it: self.slots_mut().iter_mut(),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.iter().map(|(_, v)| v)
    }

    /// Occupied buckets in table order.
    pub fn buckets(&self) -> Buckets<'_, K, V> {
        Buckets {
            it: self.slots().iter(),
        }
    }

    pub fn probe_stats(&self) -> ProbeStats {
        self.buckets().fold(
            ProbeStats {
                len: self.len,
                capacity: self.capacity(),
                ..ProbeStats::default()
            },
            |mut stats, b| {
                stats.max_distance = stats.max_distance.max(b.distance);
                stats.total_distance += b.distance;
                stats
            },
        )
    }

    /// Check the Robin Hood invariants slot by slot.
    #[cfg(test)]
    pub(crate) fn assert_invariants(&self) {
        let slots = self.slots();
        let cap = slots.len();
        if cap == 0 {
            assert_eq!(self.len, 0);
            return;
        }
        assert!(cap.is_power_of_two());
        let mask = cap - 1;
        let mut occupied = 0;
        for (i, slot) in slots.iter().enumerate() {
            let Some(b) = slot else { continue };
            occupied += 1;
            let ideal = b.hash as usize & mask;
            assert_eq!(b.distance, i.wrapping_sub(ideal) & mask, "distance at slot {i}");
            let prev = &slots[(i + cap - 1) & mask];
            if b.distance > 0 {
                assert!(prev.is_some(), "gap before displaced bucket at slot {i}");
            }
            if let Some(p) = prev {
                assert!(b.distance <= p.distance + 1, "distance jump at slot {i}");
            }
        }
        assert_eq!(occupied, self.len);
    }
}

impl<K, V, A, S> RobinHoodMap<K, V, A, S>
where
    K: Eq + Hash,
    A: Allocator,
    S: BuildHasher,
{
    fn make_hash<Q>(&self, q: &Q) -> u64
    where
        Q: ?Sized + Hash,
    {
        self.hasher.hash_one(q)
    }

    /// Probe for `q`, stopping at an empty slot or at a resident closer to
    /// its ideal slot than the current probe distance.
    fn find_index<Q>(&self, hash: u64, q: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
    {
        let slots = self.slots();
        if slots.is_empty() {
            return None;
        }
        let mask = slots.len() - 1;
        let mut idx = hash as usize & mask;
        for dist in 0..slots.len() {
            match &slots[idx] {
                None => return None,
                Some(b) if b.distance < dist => return None,
                Some(b) if b.hash == hash && Borrow::<Q>::borrow(&b.key) == q => {
                    return Some(idx)
                }
                Some(_) => {}
            }
            idx = (idx + 1) & mask;
        }
        None
    }

    /// Insert or overwrite. Returns the previous value for an existing key;
    /// overwriting never resizes the table.
    #[track_caller]
    pub fn insert(&mut self, key: K, value: V) -> Result<Option<V>, Error> {
        let hash = self.make_hash(&key);
        if let Some(idx) = self.find_index(hash, &key) {
            if let Some(b) = self.slots_mut()[idx].as_mut() {
                return Ok(Some(mem::replace(&mut b.value, value)));
            }
        }
        self.reserve_one()?;
        self.place(Bucket {
            hash,
            distance: 0,
            key,
            value,
        });
        self.len += 1;
        Ok(None)
    }

    pub fn get<Q>(&self, q: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.get_key_value(q).map(|b| &b.value)
    }

    pub fn get_mut<Q>(&mut self, q: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let idx = self.find_index(self.make_hash(q), q)?;
        self.slots_mut()[idx].as_mut().map(|b| &mut b.value)
    }

    /// The whole bucket for `q`: key, value, hash and probe distance.
    pub fn get_key_value<Q>(&self, q: &Q) -> Option<&Bucket<K, V>>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let idx = self.find_index(self.make_hash(q), q)?;
        self.slots()[idx].as_ref()
    }

    pub fn contains_key<Q>(&self, q: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.find_index(self.make_hash(q), q).is_some()
    }

    pub fn remove<Q>(&mut self, q: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.remove_entry(q).map(|(_, v)| v)
    }

    /// Remove `q` and shift the rest of its probe run back one slot.
    pub fn remove_entry<Q>(&mut self, q: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let mut idx = self.find_index(self.make_hash(q), q)?;
        let slots = self.slots_mut();
        let mask = slots.len() - 1;
        let removed = slots[idx].take()?;
        loop {
            let next = (idx + 1) & mask;
            match slots[next] {
                Some(ref b) if b.distance > 0 => {}
                _ => break,
            }
            slots.swap(idx, next);
            if let Some(b) = slots[idx].as_mut() {
                b.distance -= 1;
            }
            idx = next;
        }
        self.len -= 1;
        Some((removed.key, removed.value))
    }
}

/// Empties slots one at a time. Dropping it empties whatever `run` did not
/// reach, including after a destructor panicked mid-run.
struct SlotDrain<'a, K, V> {
    slots: core::slice::IterMut<'a, Slot<K, V>>,
}

impl<K, V> SlotDrain<'_, K, V> {
    fn run(&mut self) {
        for slot in &mut self.slots {
            drop(slot.take());
        }
    }
}

impl<K, V> Drop for SlotDrain<'_, K, V> {
    fn drop(&mut self) {
        self.run();
    }
}

impl<K, V, A: Allocator, S> Drop for RobinHoodMap<K, V, A, S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<K, V, A: Allocator, S: Default> Default for RobinHoodMap<K, V, A, S> {
    fn default() -> Self {
        Self::unbound()
    }
}

impl<K: fmt::Debug, V: fmt::Debug, A: Allocator, S> fmt::Debug for RobinHoodMap<K, V, A, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// Iterator over `(&K, &V)` in table order.
pub struct Iter<'a, K, V> {
    it: core::slice::Iter<'a, Slot<K, V>>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);
    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.it
            .find_map(|slot| slot.as_ref())
            .map(|b| (&b.key, &b.value))
    }
}

/// Iterator over `(&K, &mut V)` in table order.
pub struct IterMut<'a, K, V> {
    it: core::slice::IterMut<'a, Slot<K, V>>,
}

impl<'a, K, V> Iterator for IterMut<'a, K, V> {
    type Item = (&'a K, &'a mut V);
    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.it
            .find_map(|slot| slot.as_mut())
            .map(|b| (&b.key, &mut b.value))
    }
}

/// Iterator over occupied buckets in table order.
pub struct Buckets<'a, K, V> {
    it: core::slice::Iter<'a, Slot<K, V>>,
}

impl<'a, K, V> Iterator for Buckets<'a, K, V> {
    type Item = &'a Bucket<K, V>;
    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.it.find_map(|slot| slot.as_ref())
    }
}

impl<'a, K, V, A: Allocator, S> IntoIterator for &'a RobinHoodMap<K, V, A, S> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
