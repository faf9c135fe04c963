//! SiPM saturation response curve
//!
//! Maps a true photoelectron count to the mean observed count of a SiPM with
//! a finite number of cells. The curve is linear with slope `1 + ct` for small
//! signals and saturates towards `p1 * (p2 + 1) * p0` for large ones. A
//! companion resolution function gives the standard deviation of the observed
//! count around that mean.

use thiserror::Error;

use crate::algo::root::{bisect_increasing, RootError, DEFAULT_MAX_ITERATIONS, DEFAULT_TOLERANCE};

/// Upper end of the modeled photoelectron domain
pub const DOMAIN_MAX_PE: f64 = 1e9;

/// Cell-count scale of the saturation curve (pe)
pub const SCALE_PE: f64 = 1.47821e5;

/// Fraction of the response that keeps growing linearly past saturation
pub const LINEAR_FRACTION: f64 = 2.81116e-1;

/// Recovery shape factor
pub const RECOVERY: f64 = 1.55157e1;

/// Resolution function `A * sqrt(m + B)`
const SIGMA_SCALE: f64 = 8.90971e-1;
const SIGMA_OFFSET: f64 = 5.47081e-1;

/// Errors from inverting the response curve.
///
/// Inversion never extrapolates: observed values outside
/// `[eval(0), eval(DOMAIN_MAX_PE)]` fail.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResponseCurveError {
    #[error("Observed value {observed} is below the response range (minimum {min})")]
    BelowDomain { observed: f64, min: f64 },
    #[error("Observed value {observed} exceeds the saturated response maximum {max}")]
    AboveDomain { observed: f64, max: f64 },
    #[error("Response inversion did not converge after {0} iterations")]
    NoConvergence(usize),
}

impl From<RootError> for ResponseCurveError {
    fn from(err: RootError) -> Self {
        match err {
            RootError::BelowRange { target, min } => ResponseCurveError::BelowDomain {
                observed: target,
                min,
            },
            RootError::AboveRange { target, max } => ResponseCurveError::AboveDomain {
                observed: target,
                max,
            },
            RootError::NoConvergence(n) => ResponseCurveError::NoConvergence(n),
        }
    }
}

/// Parametric SiPM response with its resolution function.
///
/// The three shape parameters are fixed; only the cross-talk term is updated
/// at runtime, through [`ResponseCurve::set_crosstalk`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResponseCurve {
    scale: f64,
    linear_fraction: f64,
    recovery: f64,
    crosstalk: f64,
}

impl ResponseCurve {
    /// Curve with the calibrated shape and the given cross-talk probability
    pub fn new(crosstalk: f64) -> Self {
        Self::with_shape(SCALE_PE, LINEAR_FRACTION, RECOVERY, crosstalk)
    }

    /// Curve with an explicit shape, mostly useful for studies and tests
    pub fn with_shape(scale: f64, linear_fraction: f64, recovery: f64, crosstalk: f64) -> Self {
        Self {
            scale,
            linear_fraction,
            recovery,
            crosstalk,
        }
    }

    pub fn crosstalk(&self) -> f64 {
        self.crosstalk
    }

    /// Update the cross-talk term of the curve
    pub fn set_crosstalk(&mut self, crosstalk: f64) {
        self.crosstalk = crosstalk;
    }

    /// Mean observed count for `n` true photoelectrons.
    ///
    /// Returns 0 for `n <= 0` (the analytic limit at the origin).
    pub fn eval(&self, n: f64) -> f64 {
        if n <= 0.0 {
            return 0.0;
        }
        let p0 = self.scale;
        // Effective fired cells, -expm1 keeps precision for n << p0
        let fired = -p0 * (-n / p0).exp_m1();
        let body = (1.0 - self.linear_fraction) * fired + self.linear_fraction * n;
        let recovery = (self.recovery + 1.0) / (self.recovery + n / fired);
        let crosstalk = 1.0 + self.crosstalk * (-n / p0).exp();
        body * recovery * crosstalk
    }

    /// Standard deviation of the observed count around `mean`
    pub fn sigma(&self, mean: f64) -> f64 {
        SIGMA_SCALE * (mean + SIGMA_OFFSET).sqrt()
    }

    /// One-sigma upper band of the response at `n`
    pub fn upper_band(&self, n: f64) -> f64 {
        self.eval(n) + self.sigma(n)
    }

    /// One-sigma lower band of the response at `n`
    pub fn lower_band(&self, n: f64) -> f64 {
        self.eval(n) - self.sigma(n)
    }

    /// Saturated response maximum on the modeled domain
    pub fn max_response(&self) -> f64 {
        self.eval(DOMAIN_MAX_PE)
    }

    /// Recover the true photoelectron count from an observed mean.
    ///
    /// # Errors
    ///
    /// * `BelowDomain` - observed value is negative or NaN
    /// * `AboveDomain` - observed value is above [`ResponseCurve::max_response`]
    pub fn invert(&self, observed: f64) -> Result<f64, ResponseCurveError> {
        let n = bisect_increasing(
            |x| self.eval(x),
            observed,
            0.0,
            DOMAIN_MAX_PE,
            DEFAULT_TOLERANCE,
            DEFAULT_MAX_ITERATIONS,
        )?;
        Ok(n)
    }

    /// Inversion with the pipeline's boundary policy.
    ///
    /// Below the range maps to 0, above the range maps to [`DOMAIN_MAX_PE`],
    /// NaN stays NaN so a broken configuration remains visible.
    pub fn invert_clamped(&self, observed: f64) -> f64 {
        if observed.is_nan() {
            return f64::NAN;
        }
        match self.invert(observed) {
            Ok(n) => n,
            Err(ResponseCurveError::BelowDomain { .. }) => 0.0,
            Err(ResponseCurveError::AboveDomain { .. }) => DOMAIN_MAX_PE,
            Err(ResponseCurveError::NoConvergence(_)) => f64::NAN,
        }
    }
}

impl Default for ResponseCurve {
    fn default() -> Self {
        Self::new(0.12)
    }
}
