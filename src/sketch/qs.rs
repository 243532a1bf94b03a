//! Register sketch with maximum-likelihood cardinality estimation.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::SketchError;
use crate::hash::unit_hash;
use crate::sketch::packed::PackedRegisters;

/// A register sketch in the [Flajolet–Martin][fm-wiki] family: every register
/// holds the maximum of a geometric-like statistic of the hashes observed at
/// that position, and the distinct count is recovered by maximum likelihood.
///
/// Per element, positions receive candidate values through an exponential-
/// spacings construction: the running accumulator after step `i` is the
/// `(i+1)`-th order statistic of `m` unit-exponential draws, and a partial
/// Fisher–Yates shuffle decouples *which* register is the candidate from
/// *which* value was drawn. The accumulator only grows, so the walk stops as
/// soon as its discretization cannot raise the current minimum register —
/// for saturated streams most elements touch a single register.
///
/// Estimation roots the likelihood score with [Newton's method][newton],
/// seeded by a harmonic-mean-style initial guess.
///
/// One sketch covers exactly one window of the stream: [`QSketch::update`]
/// consumes a full window of elements and the estimate describes that window.
///
/// [fm-wiki]: https://en.wikipedia.org/wiki/Flajolet%E2%80%93Martin_algorithm
/// [newton]: https://en.wikipedia.org/wiki/Newton%27s_method
pub struct QSketch {
    registers: PackedRegisters,
    /// Scratch permutation, reset at the start of every element.
    perm: Vec<u32>,
    /// Per-position hash seeds, fixed at construction.
    seeds: Vec<u64>,
    window: usize,
    rng: StdRng,
}

impl QSketch {
    /// Create a sketch of `sketch_size` registers of `register_bits` bits
    /// each, sized for a window of `window` elements. All randomness (the
    /// per-position hash seeds and the shuffle) derives from `seed`.
    pub fn new(
        sketch_size: usize,
        register_bits: u32,
        window: usize,
        seed: u64,
    ) -> Result<Self, SketchError> {
        if sketch_size == 0 {
            return Err(SketchError::InvalidParameters(
                "sketch size must be nonzero".to_owned(),
            ));
        }
        if !(1..=16).contains(&register_bits) {
            return Err(SketchError::InvalidParameters(format!(
                "register bits {} outside [1, 16]",
                register_bits
            )));
        }
        if window == 0 {
            return Err(SketchError::InvalidParameters(
                "window must be nonzero".to_owned(),
            ));
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let seeds = (0..sketch_size).map(|_| rng.gen::<u64>()).collect();
        Ok(Self {
            registers: PackedRegisters::new(sketch_size, register_bits),
            perm: (0..sketch_size as u32).collect(),
            seeds,
            window,
            rng,
        })
    }

    /// Number of registers.
    pub fn sketch_size(&self) -> usize {
        self.registers.len()
    }

    /// Window length this sketch expects to consume.
    pub fn window(&self) -> usize {
        self.window
    }

    /// Current register values, in position order.
    pub fn registers(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.registers.len()).map(move |i| self.registers.get(i))
    }

    /// Observe one element.
    pub fn insert(&mut self, key: &[u8]) {
        let m = self.registers.len();
        let mut acc = 0.0f64;
        let mut j_min = self.registers.argmin();
        let r_max = self.registers.max_value() as i64;
        // the permutation is only materialized once the walk survives the
        // cutoff; on saturated registers most elements never get that far
        let mut perm_ready = false;
        for i in 0..m {
            let u = unit_hash(key, self.seeds[i]);
            acc -= u.ln() / (m - i + 1) as f64;
            let y = (-acc.log2()).floor() as i64;
            // acc only grows, so once y cannot raise the minimum register
            // no later position can be raised either
            if y <= self.registers.get(j_min) as i64 {
                break;
            }
            if !perm_ready {
                for (p_index, p) in self.perm.iter_mut().enumerate() {
                    *p = p_index as u32;
                }
                perm_ready = true;
            }
            let j = self.rng.gen_range(i..m);
            self.perm.swap(i, j);
            let pos = self.perm[i] as usize;
            if y > self.registers.get(pos) as i64 {
                let value = if y >= r_max {
                    r_max as u32
                } else if y > 0 {
                    y as u32
                } else {
                    continue;
                };
                self.registers.set(pos, value);
                if pos == j_min {
                    j_min = self.registers.argmin();
                }
            }
        }
    }

    /// Consume exactly one window of elements from `stream`.
    ///
    /// A shorter stream leaves the registers valid but returns
    /// [`SketchError::InputExhausted`]; an estimate taken afterwards is a
    /// lower bound on the window cardinality.
    pub fn update<I>(&mut self, stream: I) -> Result<(), SketchError>
    where
        I: IntoIterator,
        I::Item: AsRef<[u8]>,
    {
        let mut seen = 0;
        for key in stream.into_iter().take(self.window) {
            self.insert(key.as_ref());
            seen += 1;
        }
        if seen < self.window {
            return Err(SketchError::InputExhausted {
                seen,
                window: self.window,
            });
        }
        Ok(())
    }

    /// Maximum-likelihood estimate of the number of distinct elements seen.
    ///
    /// Never fails: a non-converging or non-finite Newton step falls back to
    /// the last finite iterate and the anomaly is logged.
    pub fn estimate(&self) -> f64 {
        let m = self.registers.len() as f64;
        let sum: f64 = self
            .registers()
            .map(|reg| 2f64.powi(-(reg as i32)))
            .sum();
        let mut guess = (m - 1.0) / sum;
        if !(guess > 0.0 && guess < 1e6) {
            guess = 1.0;
        }
        let (root, converged) = self.newton(guess);
        if !converged {
            log::warn!(
                "cardinality solver stopped before convergence; returning iterate {}",
                root
            );
        }
        let band = 100.0 * m;
        if !root.is_finite() || root < 0.0 || root > band {
            log::warn!(
                "cardinality estimate {} outside sanity band [0, {}]",
                root,
                band
            );
        }
        root
    }

    /// Likelihood score whose root is the cardinality estimate.
    fn score(&self, c: f64) -> f64 {
        let mut res = 0.0;
        for reg in self.registers() {
            let x = 2f64.powi(-(reg as i32) - 1);
            let ex = (c * x).exp();
            res += x * (2.0 - ex) / (ex - 1.0);
        }
        res
    }

    fn score_derivative(&self, c: f64) -> f64 {
        let mut res = 0.0;
        for reg in self.registers() {
            let x = 2f64.powi(-(reg as i32) - 1);
            let exponent = c * x;
            if exponent > 500.0 {
                continue;
            }
            let ex = if exponent < -500.0 { 0.0 } else { exponent.exp() };
            let denominator = (ex - 1.0) * (ex - 1.0);
            let term = if denominator < 1e-20 {
                -x * x * ex / (x * x * c * c + 1e-20)
            } else {
                -x * x * ex / denominator
            };
            res += term;
        }
        res
    }

    /// Newton iteration on the score. Returns the root and whether the
    /// iteration converged; a non-finite step yields the previous iterate.
    fn newton(&self, start: f64) -> (f64, bool) {
        const TOLERANCE: f64 = 1e-5;
        const MAX_ITERATIONS: usize = 100;
        let mut prev = start;
        let mut cur = prev - self.score(prev) / self.score_derivative(prev);
        if !cur.is_finite() {
            return (prev, false);
        }
        let mut iterations = 0;
        while (cur - prev).abs() > TOLERANCE && iterations < MAX_ITERATIONS {
            prev = cur;
            cur = prev - self.score(prev) / self.score_derivative(prev);
            if !cur.is_finite() {
                return (prev, false);
            }
            iterations += 1;
        }
        (cur, (cur - prev).abs() <= TOLERANCE)
    }
}
