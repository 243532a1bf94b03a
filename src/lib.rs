//! `swcount` estimates the number of distinct keys in a data stream under a
//! sliding window, without storing key identities.
//!
//! Two sketch families are provided: [`QSketch`], a register sketch that
//! answers once per window via maximum-likelihood estimation, and
//! [`SlidingLc`], a linear-counting table kept continuously valid by a
//! recency-list/frequency-sketch eviction mechanism. The [`counters`] module
//! wires either sketch to a newline-delimited key stream for the `swcount`
//! command-line tool.

pub mod counters;
mod error;
mod hash;
mod sketch;
pub mod stream_reducer;

pub use error::SketchError;
pub use sketch::QSketch;
pub use sketch::SlidingLc;
