//! Stateful sinks that wire the sketches to a key stream, aimed at
//! servicing the `swcount` command-line tool.

use std::collections::{HashMap, VecDeque};

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::SketchError;
use crate::sketch::{FrequencySketch, QSketch, SlidingLc};
use crate::stream_reducer::KeySink;

/// Drives a [`SlidingLc`] engine and records the estimate series it emits.
pub struct SlidingCounter {
    engine: SlidingLc,
    estimates: Vec<f64>,
}

impl SlidingCounter {
    pub fn new(engine: SlidingLc) -> Self {
        Self {
            engine,
            estimates: Vec::new(),
        }
    }

    /// Estimates emitted so far, one per emission boundary.
    pub fn estimates(&self) -> &[f64] {
        &self.estimates
    }

    pub fn engine(&self) -> &SlidingLc {
        &self.engine
    }
}

impl KeySink for SlidingCounter {
    fn observe_key(&mut self, key: &[u8]) {
        if let Some(estimate) = self.engine.observe(key) {
            self.estimates.push(estimate);
        }
    }
}

/// Evaluates a fresh [`QSketch`] on each hopping window of the stream.
///
/// Keys are buffered until a full window is available; the sketch for window
/// `k` is seeded with `seed + k` so runs are reproducible while windows stay
/// independent. After each estimate the buffer hops forward by the stride.
pub struct HoppingCounter {
    sketch_size: usize,
    register_bits: u32,
    window: usize,
    stride: usize,
    seed: u64,
    windows_done: u64,
    buffer: VecDeque<Vec<u8>>,
    estimates: Vec<f64>,
}

impl HoppingCounter {
    pub fn new(
        sketch_size: usize,
        register_bits: u32,
        window: usize,
        stride: usize,
        seed: u64,
    ) -> Result<Self, SketchError> {
        // validates sketch size, register width and window up front
        QSketch::new(sketch_size, register_bits, window, seed)?;
        if stride == 0 || stride > window {
            return Err(SketchError::InvalidParameters(format!(
                "stride {} outside [1, window]",
                stride
            )));
        }
        Ok(Self {
            sketch_size,
            register_bits,
            window,
            stride,
            seed,
            windows_done: 0,
            buffer: VecDeque::with_capacity(window),
            estimates: Vec::new(),
        })
    }

    /// One estimate per completed window.
    pub fn estimates(&self) -> &[f64] {
        &self.estimates
    }

    /// Keys buffered toward the next window.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

impl KeySink for HoppingCounter {
    fn observe_key(&mut self, key: &[u8]) {
        self.buffer.push_back(key.to_vec());
        if self.buffer.len() < self.window {
            return;
        }
        let mut sketch = QSketch::new(
            self.sketch_size,
            self.register_bits,
            self.window,
            self.seed.wrapping_add(self.windows_done),
        )
        .expect("parameters validated at construction");
        sketch
            .update(self.buffer.iter())
            .expect("buffer holds one full window");
        self.estimates.push(sketch.estimate());
        self.windows_done += 1;
        for _ in 0..self.stride {
            self.buffer.pop_front();
        }
    }
}

/// Approximate top-k most frequent keys over the whole stream.
///
/// A frequency sketch supplies the counts; an exact side table retains the
/// keys whose estimate ever competed for the top ranks, pruned back whenever
/// it outgrows its budget.
pub struct HeavyHitters {
    k: usize,
    freq: FrequencySketch,
    candidates: HashMap<Vec<u8>, i64>,
}

impl HeavyHitters {
    /// Budget multiplier on `k` for the candidate table.
    const CANDIDATE_SLACK: usize = 4;

    pub fn new(k: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let width = (k.max(1) * 64).next_power_of_two().max(1024);
        Self {
            k,
            freq: FrequencySketch::new(4, width, seed, &mut rng),
            candidates: HashMap::new(),
        }
    }

    /// Returns pairs (estimated count, key) in descending count order.
    pub fn top(&self) -> Vec<(u64, &[u8])> {
        let mut rows: Vec<(u64, &[u8])> = self
            .candidates
            .keys()
            .map(|key| (self.freq.estimate(key).max(0) as u64, key.as_slice()))
            .collect();
        rows.sort_unstable_by(|a, b| b.cmp(a));
        rows.truncate(self.k);
        rows
    }

    /// Shrink the candidate table back to the `2k` best-counted keys.
    fn prune(&mut self) {
        let keep = self.k.max(1) * 2;
        let mut rows: Vec<(i64, Vec<u8>)> = self
            .candidates
            .iter()
            .map(|(key, count)| (*count, key.clone()))
            .collect();
        rows.sort_unstable_by(|a, b| b.cmp(a));
        rows.truncate(keep);
        let survivors: std::collections::HashSet<Vec<u8>> =
            rows.into_iter().map(|(_, key)| key).collect();
        self.candidates.retain(|key, _| survivors.contains(key));
    }
}

impl KeySink for HeavyHitters {
    fn observe_key(&mut self, key: &[u8]) {
        self.freq.update(key);
        let estimate = self.freq.estimate(key);
        if let Some(count) = self.candidates.get_mut(key) {
            *count = estimate;
            return;
        }
        self.candidates.insert(key.to_vec(), estimate);
        if self.candidates.len() > self.k.max(1) * Self::CANDIDATE_SLACK {
            self.prune();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sliding_counter_collects_emissions() {
        let engine = SlidingLc::new(4096, 16, 4, 256, 8, 5).unwrap();
        let mut counter = SlidingCounter::new(engine);
        for i in 0u64..32 {
            counter.observe_key(&i.to_le_bytes());
        }
        // boundaries at 16, 24, 32
        assert_eq!(counter.estimates().len(), 3);
    }

    #[test]
    fn hopping_counter_estimates_per_window() {
        let mut counter = HoppingCounter::new(256, 8, 100, 50, 7).unwrap();
        for i in 0u64..300 {
            counter.observe_key(&i.to_le_bytes());
        }
        // windows complete at elements 100, 150, ..., 300
        assert_eq!(counter.estimates().len(), 5);
        assert_eq!(counter.buffered(), 50);
        for estimate in counter.estimates() {
            assert!((50.0..200.0).contains(estimate), "estimate {}", estimate);
        }
    }

    #[test]
    fn hopping_counter_rejects_bad_stride() {
        assert!(HoppingCounter::new(256, 8, 100, 0, 7).is_err());
        assert!(HoppingCounter::new(256, 8, 100, 101, 7).is_err());
    }

    #[test]
    fn heavy_hitters_surface_the_hot_key() {
        let mut hh = HeavyHitters::new(3, 11);
        for i in 0u64..1000 {
            hh.observe_key(&i.to_le_bytes());
            if i % 2 == 0 {
                hh.observe_key(b"hot");
            }
        }
        let top = hh.top();
        assert_eq!(top[0].1, b"hot");
        assert!(top[0].0 >= 500);
    }

    #[test]
    fn pruning_keeps_the_heavy_candidates() {
        let mut hh = HeavyHitters::new(2, 13);
        for round in 0..50 {
            hh.observe_key(b"alpha");
            hh.observe_key(b"beta");
            for i in 0u64..100 {
                hh.observe_key(&(round * 100 + i).to_le_bytes());
            }
        }
        let top = hh.top();
        let keys: Vec<&[u8]> = top.iter().map(|(_, key)| *key).collect();
        assert!(keys.contains(&b"alpha".as_ref()));
        assert!(keys.contains(&b"beta".as_ref()));
    }
}
