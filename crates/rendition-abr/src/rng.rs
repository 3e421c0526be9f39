//! Seeded PRNG shared by the random policy and reproducible test drivers.

/// Minimal xorshift64 PRNG.
///
/// Not cryptographic. A given seed always yields the same sequence.
#[derive(Clone, Debug)]
pub struct Xorshift64(u64);

impl Xorshift64 {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        // zero is a fixed point of xorshift
        Self(if seed == 0 { 0x9E37_79B9_7F4A_7C15 } else { seed })
    }

    pub fn next_u64(&mut self) -> u64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        self.0
    }

    /// Returns `u64` in `[min, max)`; `max` must exceed `min`.
    pub fn range_u64(&mut self, min: u64, max: u64) -> u64 {
        min + self.next_u64() % (max - min)
    }

    /// Returns an index in `[0, len)`; `len` must be non-zero.
    pub fn index(&mut self, len: usize) -> usize {
        let len = len as u64;
        #[expect(clippy::cast_possible_truncation)] // result < len, which came from usize
        let v = (self.next_u64() % len) as usize;
        v
    }

    /// Returns `true` with probability `1 / n`.
    pub fn one_in(&mut self, n: u64) -> bool {
        self.next_u64() % n == 0
    }
}
