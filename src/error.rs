use std::fmt::{Display, Formatter};

/// Errors surfaced by sketch construction and estimation.
///
/// Per-element ingest never fails: runtime anomalies (negative counters,
/// non-converging Newton iterations) are resolved with documented fallbacks
/// and reported through the `log` facade instead.
#[derive(Debug)]
pub enum SketchError {
    /// A construction parameter is out of its legal range.
    InvalidParameters(String),
    /// The input stream ended before a full window was consumed. The sketch
    /// remains valid; any estimate taken from it is a lower bound.
    InputExhausted { seen: usize, window: usize },
    /// Every bit of the linear-counting table is set, so the estimator has no
    /// information left. The table size must be enlarged.
    Saturated,
}

impl Display for SketchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SketchError::InvalidParameters(what) => {
                f.write_fmt(format_args!("invalid parameters: {}", what))
            }
            SketchError::InputExhausted { seen, window } => f.write_fmt(format_args!(
                "input exhausted: {} of {} window elements seen",
                seen, window
            )),
            SketchError::Saturated => f.write_str("linear-counting table saturated"),
        }
    }
}

impl std::error::Error for SketchError {}
