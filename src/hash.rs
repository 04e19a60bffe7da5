//! Seedable 64-bit non-cryptographic hashing.
//!
//! Byte spans are consumed as little-endian 8-byte words plus a
//! length-tagged tail word; integers are mixed as a single word by value.
//! Each word is folded into the state with a 64x64->128 multiply whose
//! halves are xored together, and `finish` runs a 64-bit avalanche so the
//! low bits used for bucket selection depend on every input bit.

use core::hash::{BuildHasher, Hasher};

/// Seed used by `SeededState::default()`.
pub const DEFAULT_SEED: u64 = 0x243f_6a88_85a3_08d3;

const MULTIPLE: u64 = 0x5851_f42d_4c95_7f2d;
const INCREMENT: u64 = 0x1405_7b7e_f767_814f;

#[inline(always)]
fn folded_multiply(a: u64, b: u64) -> u64 {
    let full = (a as u128).wrapping_mul(b as u128);
    (full as u64) ^ ((full >> 64) as u64)
}

#[inline(always)]
fn avalanche(mut h: u64) -> u64 {
    h ^= h >> 33;
    h = h.wrapping_mul(0xff51_afd7_ed55_8ccd);
    h ^= h >> 33;
    h = h.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    h ^ (h >> 33)
}

#[derive(Clone, Debug)]
pub struct SpanHasher {
    state: u64,
}

impl SpanHasher {
    pub const fn with_seed(seed: u64) -> Self {
        Self {
            state: seed ^ MULTIPLE,
        }
    }

    #[inline(always)]
    fn mix(&mut self, word: u64) {
        self.state = folded_multiply(self.state ^ word, MULTIPLE).wrapping_add(INCREMENT);
    }
}

impl Default for SpanHasher {
    fn default() -> Self {
        Self::with_seed(DEFAULT_SEED)
    }
}

impl Hasher for SpanHasher {
    fn write(&mut self, bytes: &[u8]) {
        self.state = self.state.wrapping_add(bytes.len() as u64);
        let mut words = bytes.chunks_exact(8);
        for chunk in &mut words {
            let mut word = [0u8; 8];
            word.copy_from_slice(chunk);
            self.mix(u64::from_le_bytes(word));
        }
        let tail = words.remainder();
        if !tail.is_empty() {
            let mut word = [0u8; 8];
            word[..tail.len()].copy_from_slice(tail);
            self.mix(u64::from_le_bytes(word) ^ ((tail.len() as u64) << 59));
        }
    }

    #[inline]
    fn write_u8(&mut self, n: u8) {
        self.mix(n as u64);
    }

    #[inline]
    fn write_u16(&mut self, n: u16) {
        self.mix(n as u64);
    }

    #[inline]
    fn write_u32(&mut self, n: u32) {
        self.mix(n as u64);
    }

    #[inline]
    fn write_u64(&mut self, n: u64) {
        self.mix(n);
    }

    #[inline]
    fn write_u128(&mut self, n: u128) {
        self.mix(n as u64);
        self.mix((n >> 64) as u64);
    }

    #[inline]
    fn write_usize(&mut self, n: usize) {
        self.mix(n as u64);
    }

    #[inline]
    fn finish(&self) -> u64 {
        avalanche(self.state)
    }
}

/// `BuildHasher` producing `SpanHasher`s that share one seed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SeededState {
    seed: u64,
}

impl SeededState {
    pub const fn with_seed(seed: u64) -> Self {
        Self { seed }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl Default for SeededState {
    fn default() -> Self {
        Self::with_seed(DEFAULT_SEED)
    }
}

impl BuildHasher for SeededState {
    type Hasher = SpanHasher;

    fn build_hasher(&self) -> SpanHasher {
        SpanHasher::with_seed(self.seed)
    }
}

/// Hash one byte span with `seed`.
pub fn hash_bytes(bytes: &[u8], seed: u64) -> u64 {
    let mut h = SpanHasher::with_seed(seed);
    h.write(bytes);
    h.finish()
}
