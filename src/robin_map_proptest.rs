#![cfg(test)]

// Property tests for RobinHoodMap kept inside the crate so they can check
// the slot-level Robin Hood invariants, which are not public API.

use crate::allocator::{Allocator, HeapAllocator};
use crate::robin_map::{MapConfig, RobinHoodMap};
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::hash::{BuildHasher, Hasher};

// Key newtype with Borrow<str> to exercise borrowed lookup.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
struct Key(String);
impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
impl std::borrow::Borrow<str> for Key {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// Pool-indexed operations to improve shrinking: indices shrink to earlier keys,
// pool length shrinks, and op lists shrink in length.
#[derive(Clone, Debug)]
enum OpI {
    Insert(usize, i32),
    Remove(usize),
    Get(usize),
    Contains(String),
    Mutate(usize, i32),
    Iterate,
    Clear,
}

fn key_from(pool: &[String], i: usize) -> Key {
    Key(pool[i].clone())
}

fn arb_scenario() -> impl Strategy<Value = (Vec<String>, Vec<OpI>)> {
    proptest::collection::vec("[a-z]{0,5}", 1..=40).prop_flat_map(|pool| {
        let idxs: Vec<usize> = (0..pool.len()).collect();
        let idx = proptest::sample::select(idxs);
        let contains_pool = proptest::sample::select(pool.clone());
        let op = prop_oneof![
            6 => (idx.clone(), any::<i32>()).prop_map(|(i, v)| OpI::Insert(i, v)),
            3 => idx.clone().prop_map(OpI::Remove),
            2 => idx.clone().prop_map(OpI::Get),
            1 => prop_oneof![
                contains_pool.prop_map(|s: String| s),
                "[a-z]{0,5}".prop_map(|s| s)
            ]
            .prop_map(OpI::Contains),
            1 => (idx.clone(), any::<i32>()).prop_map(|(i, d)| OpI::Mutate(i, d)),
            1 => Just(OpI::Iterate),
            1 => Just(OpI::Clear),
        ];
        proptest::collection::vec(op, 1..120).prop_map(move |ops| (pool.clone(), ops))
    })
}

// Drive `sut` and a std HashMap model through `ops`, checking parity and the
// Robin Hood slot invariants after every step.
fn run_scenario<S: BuildHasher>(
    mut sut: RobinHoodMap<Key, i32, &HeapAllocator, S>,
    pool: &[String],
    ops: Vec<OpI>,
) -> Result<(), TestCaseError> {
    let mut model: HashMap<Key, i32> = HashMap::new();
    for op in ops {
        match op {
            OpI::Insert(i, v) => {
                let k = key_from(pool, i);
                let before = sut.capacity();
                let prev = sut.insert(k.clone(), v).expect("heap allocation");
                let model_prev = model.insert(k, v);
                prop_assert_eq!(prev, model_prev);
                if model_prev.is_some() {
                    prop_assert_eq!(sut.capacity(), before, "overwrite must not resize");
                }
            }
            OpI::Remove(i) => {
                let k = key_from(pool, i);
                let removed = sut.remove_entry(&k);
                let expected = model.remove_entry(&k);
                prop_assert_eq!(removed, expected);
                prop_assert!(sut.get(&k).is_none(), "removed key must be gone");
            }
            OpI::Get(i) => {
                let k = key_from(pool, i);
                prop_assert_eq!(sut.get(&k), model.get(&k));
                if let Some(b) = sut.get_key_value(&k) {
                    prop_assert_eq!(b.key(), &k);
                }
            }
            OpI::Contains(s) => {
                let has = sut.contains_key(s.as_str());
                let has_model = model.keys().any(|k| k.0 == s);
                prop_assert_eq!(has, has_model);
            }
            OpI::Mutate(i, d) => {
                let k = key_from(pool, i);
                match (sut.get_mut(&k), model.get_mut(&k)) {
                    (Some(sv), Some(mv)) => {
                        *sv = sv.saturating_add(d);
                        *mv = mv.saturating_add(d);
                    }
                    (None, None) => {}
                    _ => prop_assert!(false, "presence mismatch for {:?}", k),
                }
            }
            OpI::Iterate => {
                let s_keys: BTreeSet<_> = sut.keys().cloned().collect();
                let m_keys: BTreeSet<_> = model.keys().cloned().collect();
                prop_assert_eq!(s_keys.len(), sut.len(), "iteration yields each key once");
                prop_assert_eq!(s_keys, m_keys);
            }
            OpI::Clear => {
                sut.clear();
                model.clear();
            }
        }

        sut.assert_invariants();
        prop_assert_eq!(sut.len(), model.len());
        prop_assert_eq!(sut.is_empty(), model.is_empty());
    }
    Ok(())
}

fn small_config() -> MapConfig {
    MapConfig::default().with_initial_capacity(8)
}

// Property: State-machine equivalence against std::collections::HashMap.
// Invariants exercised across random operation sequences:
// - Insert returns the previous value exactly when the model has one;
//   overwrites never resize the table.
// - `get`/`contains_key`/`remove_entry` parity with the model.
// - `keys()` yields each live key exactly once.
// - Slot distances, run continuity and the Robin Hood ordering hold after
//   every operation, including across resizes and backward-shift removals.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine((pool, ops) in arb_scenario()) {
        let alloc = HeapAllocator::new();
        let sut: RobinHoodMap<Key, i32, _> =
            RobinHoodMap::with_config_in(&alloc, small_config()).expect("heap allocation");
        run_scenario(sut, &pool, ops)?;
        prop_assert_eq!(alloc.allocation_count(), 0, "table released on drop");
    }
}

// Hasher keeping only the two lowest bits of a real hash, so keys pile up
// on four ideal slots and long displacement chains form.
#[derive(Clone, Default)]
struct NarrowBuildHasher;
struct NarrowHasher(crate::hash::SpanHasher);
impl BuildHasher for NarrowBuildHasher {
    type Hasher = NarrowHasher;
    fn build_hasher(&self) -> Self::Hasher {
        NarrowHasher(crate::hash::SpanHasher::default())
    }
}
impl Hasher for NarrowHasher {
    fn write(&mut self, bytes: &[u8]) {
        self.0.write(bytes);
    }
    fn finish(&self) -> u64 {
        self.0.finish() & 3
    }
}

// Collision variant using a constant hasher to stress equality resolution.
#[derive(Clone, Default)]
struct ConstBuildHasher;
struct ConstHasher;
impl BuildHasher for ConstBuildHasher {
    type Hasher = ConstHasher;
    fn build_hasher(&self) -> Self::Hasher {
        ConstHasher
    }
}
impl Hasher for ConstHasher {
    fn write(&mut self, _bytes: &[u8]) {}
    fn finish(&self) -> u64 {
        0
    }
}

// Property: Same state-machine invariants as above under heavy clustering
// (narrow hasher) and worst-case collisions (constant hasher). This stresses
// displacement, wraparound and backward-shift deletion across long runs.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine_with_clustering((pool, ops) in arb_scenario()) {
        let alloc = HeapAllocator::new();
        let sut: RobinHoodMap<Key, i32, _, NarrowBuildHasher> =
            RobinHoodMap::with_config_in(&alloc, small_config()).expect("heap allocation");
        run_scenario(sut, &pool, ops)?;
    }

    #[test]
    fn prop_state_machine_with_collisions((pool, ops) in arb_scenario()) {
        let alloc = HeapAllocator::new();
        let sut: RobinHoodMap<Key, i32, _, ConstBuildHasher> =
            RobinHoodMap::with_config_in(&alloc, small_config()).expect("heap allocation");
        run_scenario(sut, &pool, ops)?;
    }
}

// Property: probe lengths stay logarithmic for a well-mixed hasher. Random
// u64 keys are inserted up to the load limit; the longest displacement is
// bounded far below the table size.
proptest! {
    #![proptest_config(ProptestConfig { cases: 32, .. ProptestConfig::default() })]
    #[test]
    fn prop_probe_distance_stays_small(keys in proptest::collection::hash_set(any::<u64>(), 1..3000)) {
        let alloc = HeapAllocator::new();
        let mut m: RobinHoodMap<u64, (), _> = RobinHoodMap::new_in(&alloc).expect("heap allocation");
        for &k in &keys {
            m.insert(k, ()).expect("heap allocation");
        }
        m.assert_invariants();
        let stats = m.probe_stats();
        prop_assert_eq!(stats.len, keys.len());
        prop_assert!(stats.load_factor() <= 0.87);
        prop_assert!(stats.max_distance < 64, "max distance {} too long", stats.max_distance);
        for &k in &keys {
            prop_assert!(m.contains_key(&k));
        }
    }
}
