//! Root finding for monotonic functions
//!
//! Used to invert the SiPM response curve: given an observed value, find the
//! pre-image on a bracketed, monotonically increasing domain.

use thiserror::Error;

/// Errors that can occur while inverting a monotonic function.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RootError {
    #[error("Target {target} is below the function range starting at {min}")]
    BelowRange { target: f64, min: f64 },
    #[error("Target {target} is above the function range ending at {max}")]
    AboveRange { target: f64, max: f64 },
    #[error("Bisection did not converge after {0} iterations")]
    NoConvergence(usize),
}

/// Default relative tolerance on the abscissa
pub const DEFAULT_TOLERANCE: f64 = 1e-12;

/// Default iteration cap
pub const DEFAULT_MAX_ITERATIONS: usize = 200;

/// Solve `f(x) = target` for a monotonically increasing `f` on `[lo, hi]`.
///
/// The interval is halved until its width drops below
/// `tolerance * max(1, |x|)`. Targets outside `[f(lo), f(hi)]` are rejected
/// rather than extrapolated; a NaN target is reported as below range.
///
/// # Errors
///
/// * `RootError::BelowRange` - target is below `f(lo)` or NaN
/// * `RootError::AboveRange` - target is above `f(hi)`
/// * `RootError::NoConvergence` - tolerance not reached within `max_iterations`
pub fn bisect_increasing<F>(
    f: F,
    target: f64,
    lo: f64,
    hi: f64,
    tolerance: f64,
    max_iterations: usize,
) -> Result<f64, RootError>
where
    F: Fn(f64) -> f64,
{
    let f_lo = f(lo);
    let f_hi = f(hi);

    if target.is_nan() || target < f_lo {
        return Err(RootError::BelowRange { target, min: f_lo });
    }
    if target > f_hi {
        return Err(RootError::AboveRange { target, max: f_hi });
    }
    if target == f_lo {
        return Ok(lo);
    }
    if target == f_hi {
        return Ok(hi);
    }

    let mut lo = lo;
    let mut hi = hi;
    for _ in 0..max_iterations {
        let mid = 0.5 * (lo + hi);
        if hi - lo <= tolerance * mid.abs().max(1.0) {
            return Ok(mid);
        }
        if f(mid) < target {
            lo = mid;
        } else {
            hi = mid;
        }
    }

    Err(RootError::NoConvergence(max_iterations))
}
