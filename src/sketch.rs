//! The sketch structures: a register sketch estimated by maximum likelihood
//! and a sliding-window linear-counting engine, plus the packed-register,
//! recency-list and frequency-sketch building blocks they share.

mod freq;
mod lc;
mod packed;
mod qs;
mod recency;

pub(crate) use freq::FrequencySketch;

pub use lc::SlidingLc;
pub use qs::QSketch;
