//! Small numeric helpers used across the pipeline

/// Clamp negative values to zero while letting NaN through.
///
/// `f64::max` would silently turn NaN into 0; a broken configuration should
/// stay visible in the output instead.
pub fn clamp_non_negative(value: f64) -> f64 {
    if value < 0.0 {
        0.0
    } else {
        value
    }
}

/// Round to the nearest integer count and clamp at zero
pub fn round_count(value: f64) -> f64 {
    clamp_non_negative(value.round())
}
