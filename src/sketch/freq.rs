//! Count-Min frequency sketch with decrement support.
//!
//! Unlike the textbook structure this one is allowed to count *down*: the
//! sliding-window engine retires recency units by decrementing, and a
//! non-positive row minimum after a decrement is exactly its signal that a
//! slot has no surviving recent hits. Counters are therefore signed and may
//! go negative transiently.

use rand::Rng;

use crate::hash::hash_bytes;

/// d rows × w columns of signed counters. Row `i` is addressed through the
/// base hash offset by a per-row bias drawn once at construction, giving d
/// independent-looking hash functions from one primitive.
pub(crate) struct FrequencySketch {
    depth: usize,
    width: usize,
    rows: Vec<i64>,
    row_seeds: Vec<u64>,
}

impl FrequencySketch {
    pub(crate) fn new<R: Rng>(depth: usize, width: usize, base_seed: u64, rng: &mut R) -> Self {
        debug_assert!(depth > 0 && width > 0);
        let row_seeds = (0..depth)
            .map(|_| base_seed.wrapping_add(rng.gen::<u64>()))
            .collect();
        Self {
            depth,
            width,
            rows: vec![0; depth * width],
            row_seeds,
        }
    }

    #[inline]
    fn cell(&self, row: usize, key: &[u8]) -> usize {
        let col = (hash_bytes(key, self.row_seeds[row]) % self.width as u64) as usize;
        row * self.width + col
    }

    /// Count one occurrence of `key`.
    pub(crate) fn update(&mut self, key: &[u8]) {
        for row in 0..self.depth {
            let cell = self.cell(row, key);
            self.rows[cell] += 1;
        }
    }

    /// Subtract one occurrence of `key` from every row and return the
    /// smallest post-decrement counter.
    pub(crate) fn decrement(&mut self, key: &[u8]) -> i64 {
        let mut min = i64::MAX;
        for row in 0..self.depth {
            let cell = self.cell(row, key);
            self.rows[cell] -= 1;
            min = min.min(self.rows[cell]);
        }
        min
    }

    /// Point estimate of `key`'s frequency: the row-wise minimum.
    pub(crate) fn estimate(&self, key: &[u8]) -> i64 {
        let mut min = i64::MAX;
        for row in 0..self.depth {
            min = min.min(self.rows[self.cell(row, key)]);
        }
        min
    }
}
