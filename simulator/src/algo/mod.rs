//! Numeric building blocks shared by the detector models and stages
//!
//! - `misc`: clamping and rounding helpers for counts
//! - `random`: the seeded per-stage random stream
//! - `root`: bracketed inversion of monotonic functions
//! - `stats`: streaming mean/RMS for run summaries

pub mod misc;
pub mod random;
pub mod root;
pub mod stats;

pub use misc::{clamp_non_negative, round_count};
pub use random::RandomSource;
pub use root::{bisect_increasing, RootError};
pub use stats::RunningStats;
