//! Linear counting under a sliding window, aged by back-propagated eviction.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::SketchError;
use crate::hash::hash_bytes;
use crate::sketch::freq::FrequencySketch;
use crate::sketch::recency::{RecencyList, Slot};

/// Upper bound on random column draws per dummy retirement; past this the
/// dummy is deferred to a later step.
const COLUMN_DRAW_FACTOR: usize = 8;

/// A [linear counting][lc-wiki] table that stays valid as the window slides.
///
/// Three structures cooperate. The bit-table records which of `m` hash slots
/// are occupied; the [`RecencyList`] orders occupied slots least-recently
/// touched first; a [`FrequencySketch`] tracks approximate per-slot hit
/// counts. Every element past the window boundary funds one bounded eviction
/// step: either the oldest slot is probed (and retired once the sketch shows
/// no surviving recent hits), or one previously deferred *dummy* unit is
/// consumed against a random busy column. Re-touches promote their recency
/// slack to the list predecessor, so retiring a slot converts that slack into
/// future dummies — the sketch counters drift toward the true recent-
/// frequency distribution without any per-key state.
///
/// The estimate is the classical `-m · ln((m - k) / m)` with `k` the number
/// of set bits; it saturates as `k → m`, at which point the table must be
/// enlarged.
///
/// [lc-wiki]: https://en.wikipedia.org/wiki/Approximate_counting_algorithm
pub struct SlidingLc {
    table_size: usize,
    window: u64,
    emission_gap: u64,
    slots: Vec<Slot>,
    list: RecencyList,
    freq: FrequencySketch,
    /// Dummy decrements owed to the frequency sketch (the sentinel's slack).
    pending: u64,
    /// Slot hash seed, independent of the frequency-sketch row seeds so
    /// residency never correlates with the eviction signal.
    slot_seed: u64,
    count: u64,
    rng: StdRng,
}

impl SlidingLc {
    /// Create an engine with an `table_size`-bit table over a window of
    /// `window` elements, backed by a `depth` × `width` frequency sketch.
    /// An estimate is emitted from [`SlidingLc::observe`] every
    /// `emission_gap` elements once the window has filled.
    pub fn new(
        table_size: usize,
        window: usize,
        depth: usize,
        width: usize,
        emission_gap: usize,
        seed: u64,
    ) -> Result<Self, SketchError> {
        if table_size == 0 || table_size > u32::MAX as usize {
            return Err(SketchError::InvalidParameters(
                "table size must be in [1, 2^32)".to_owned(),
            ));
        }
        if window == 0 {
            return Err(SketchError::InvalidParameters(
                "window must be nonzero".to_owned(),
            ));
        }
        if depth == 0 || width == 0 {
            return Err(SketchError::InvalidParameters(
                "frequency sketch dimensions must be nonzero".to_owned(),
            ));
        }
        if emission_gap == 0 || emission_gap > window {
            return Err(SketchError::InvalidParameters(format!(
                "emission gap {} outside [1, window]",
                emission_gap
            )));
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let slot_seed = rng.gen::<u64>();
        let freq_seed = rng.gen::<u64>();
        let freq = FrequencySketch::new(depth, width, freq_seed, &mut rng);
        Ok(Self {
            table_size,
            window: window as u64,
            emission_gap: emission_gap as u64,
            slots: (0..table_size).map(|_| Slot::new()).collect(),
            list: RecencyList::new(),
            freq,
            pending: 0,
            slot_seed,
            count: 0,
            rng,
        })
    }

    /// Number of currently set table bits.
    pub fn occupied(&self) -> usize {
        self.list.len()
    }

    /// Total elements observed so far.
    pub fn elements_seen(&self) -> u64 {
        self.count
    }

    /// Window length in elements.
    pub fn window(&self) -> usize {
        self.window as usize
    }

    fn slot_key(index: u32) -> [u8; 8] {
        (index as u64).to_le_bytes()
    }

    /// Observe one element. Returns the current estimate when an emission
    /// boundary is reached: first when the window fills, then every
    /// `emission_gap` elements. A saturated table skips the emission (logged)
    /// rather than interrupting the stream.
    pub fn observe(&mut self, key: &[u8]) -> Option<f64> {
        let index = (hash_bytes(key, self.slot_seed) % self.table_size as u64) as u32;
        self.freq.update(&Self::slot_key(index));

        let slot = index as usize;
        if !self.slots[slot].set {
            self.slots[slot].set = true;
            self.list.push_back(&mut self.slots, index);
        } else {
            // promote this slot's recency slack to its predecessor; at the
            // front the predecessor is the sentinel, i.e. the pending pool
            let carry = self.slots[slot].gap + 1;
            match self.list.prev_of(&self.slots, index) {
                Some(prev) => self.slots[prev as usize].gap += carry,
                None => self.pending += carry,
            }
            self.slots[slot].gap = 0;
            self.list.move_to_back(&mut self.slots, index);
        }

        self.count += 1;
        if self.count > self.window {
            self.evict_once();
        }
        if self.count >= self.window && (self.count - self.window) % self.emission_gap == 0 {
            match self.estimate() {
                Ok(estimate) => return Some(estimate),
                Err(err) => log::warn!("emission skipped: {}", err),
            }
        }
        None
    }

    /// One bounded eviction step: retire the oldest slot if its residual
    /// recency is exhausted, or consume one pending dummy against a random
    /// busy column.
    fn evict_once(&mut self) {
        if self.pending == 0 {
            let lru = match self.list.front() {
                Some(index) => index,
                None => return,
            };
            let post = self.freq.decrement(&Self::slot_key(lru));
            if post <= 0 {
                // no surviving recent hits: clear the bit and convert the
                // slot's absorbed slack into future dummies
                self.pending = self.slots[lru as usize].gap;
                self.slots[lru as usize].gap = 0;
                self.slots[lru as usize].set = false;
                self.list.pop_front(&mut self.slots);
            }
        } else {
            let attempts = COLUMN_DRAW_FACTOR * self.table_size;
            for _ in 0..attempts {
                let column = self.rng.gen_range(0..self.table_size) as u32;
                if self.freq.estimate(&Self::slot_key(column)) > 1 {
                    self.freq.decrement(&Self::slot_key(column));
                    self.pending -= 1;
                    return;
                }
            }
            log::debug!(
                "no busy column after {} draws; dummy retirement deferred",
                attempts
            );
        }
    }

    /// Linear-counting estimate over the current window.
    pub fn estimate(&self) -> Result<f64, SketchError> {
        let m = self.table_size;
        let k = self.list.len();
        if k >= m {
            return Err(SketchError::Saturated);
        }
        Ok(-(m as f64) * (((m - k) as f64) / m as f64).ln())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(table_size: usize, window: usize, gap: usize) -> SlidingLc {
        SlidingLc::new(table_size, window, 4, 2048, gap, 2024).unwrap()
    }

    fn check_invariants(lc: &SlidingLc) {
        let set_bits = lc.slots.iter().filter(|s| s.set).count();
        assert_eq!(lc.list.len(), set_bits);
        let linked: Vec<u32> = lc.list.iter(&lc.slots).collect();
        assert_eq!(linked.len(), set_bits);
        for &index in &linked {
            assert!(lc.slots[index as usize].set);
        }
    }

    #[test]
    fn rejects_bad_parameters() {
        assert!(SlidingLc::new(0, 10, 4, 64, 5, 1).is_err());
        assert!(SlidingLc::new(64, 0, 4, 64, 5, 1).is_err());
        assert!(SlidingLc::new(64, 10, 0, 64, 5, 1).is_err());
        assert!(SlidingLc::new(64, 10, 4, 0, 5, 1).is_err());
        assert!(SlidingLc::new(64, 10, 4, 64, 0, 1).is_err());
        assert!(SlidingLc::new(64, 10, 4, 64, 11, 1).is_err());
    }

    #[test]
    fn bookkeeping_stays_consistent() {
        let mut lc = engine(256, 64, 64);
        for i in 0u64..500 {
            lc.observe(&(i % 100).to_le_bytes());
            check_invariants(&lc);
        }
    }

    #[test]
    fn repeated_single_key_counts_one() {
        let mut lc = engine(256, 64, 64);
        for _ in 0..200 {
            lc.observe(b"a");
            assert_eq!(lc.occupied(), 1);
        }
        let estimate = lc.estimate().unwrap();
        assert!((estimate - 1.0).abs() < 0.05, "estimate {}", estimate);
    }

    #[test]
    fn alternating_pair_counts_two() {
        let mut lc = engine(1024, 50, 50);
        for i in 0..400 {
            lc.observe(if i % 2 == 0 { b"a" } else { b"b" });
        }
        assert_eq!(lc.occupied(), 2);
        let estimate = lc.estimate().unwrap();
        assert!((estimate - 2.0).abs() < 0.05, "estimate {}", estimate);
    }

    #[test]
    fn distinct_stream_is_aged_out() {
        let mut lc = engine(1024, 128, 128);
        for i in 0u64..512 {
            lc.observe(&i.to_le_bytes());
        }
        // the table tracks roughly one window of distinct keys, not the
        // whole history
        let occupied = lc.occupied();
        assert!(
            (64..=192).contains(&occupied),
            "occupied = {} for window 128",
            occupied
        );
    }

    #[test]
    fn saturated_table_reports_error() {
        // window far larger than the stream so no eviction ever runs
        let mut lc = SlidingLc::new(4, 1000, 4, 64, 1000, 7).unwrap();
        for i in 0u64..200 {
            lc.observe(&i.to_le_bytes());
        }
        assert_eq!(lc.occupied(), 4);
        assert!(matches!(lc.estimate(), Err(SketchError::Saturated)));
    }

    #[test]
    fn emissions_follow_the_stride() {
        let mut lc = SlidingLc::new(4096, 16, 4, 256, 4, 5).unwrap();
        let mut emitted_at = Vec::new();
        for i in 0u64..40 {
            if lc.observe(&i.to_le_bytes()).is_some() {
                emitted_at.push(i + 1);
            }
        }
        assert_eq!(emitted_at, vec![16, 20, 24, 28, 32, 36, 40]);
    }

    #[test]
    fn identical_seeds_give_identical_emissions() {
        let run = || {
            let mut lc = SlidingLc::new(1024, 64, 4, 512, 16, 99).unwrap();
            let mut out = Vec::new();
            for i in 0u64..400 {
                if let Some(estimate) = lc.observe(&(i % 150).to_le_bytes()) {
                    out.push(estimate.to_bits());
                }
            }
            out
        };
        assert_eq!(run(), run());
    }
}
