//! SiPM optical cross-talk cascade law
//!
//! A single primary avalanche (here: a dark pulse) can fire neighbouring
//! cells, which can fire their own neighbours. The total number of fired
//! cells per primary follows a Borel distribution in the cross-talk
//! probability `λ`:
//!
//! ```text
//! P(k) = (λk)^(k-1) · e^(-λk) / k!      k = 1, 2, ...
//! ```

use crate::algo::random::RandomSource;

/// Largest cascade multiplicity the law models
pub const MAX_CASCADE: u32 = 64;

/// Borel cascade multiplicity law with inverse-CDF sampling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrossTalkLaw {
    probability: f64,
}

impl CrossTalkLaw {
    pub fn new(probability: f64) -> Self {
        Self { probability }
    }

    /// Cross-talk probability `λ` of the law
    pub fn probability(&self) -> f64 {
        self.probability
    }

    /// Probability of a cascade of exactly `k` fired cells.
    ///
    /// Zero outside the modeled support `1..=MAX_CASCADE`.
    pub fn pmf(&self, k: u32) -> f64 {
        if k == 0 || k > MAX_CASCADE {
            return 0.0;
        }
        let lambda = self.probability;
        if k == 1 {
            return (-lambda).exp();
        }
        if lambda <= 0.0 {
            return 0.0;
        }
        let kf = k as f64;
        let ln_factorial: f64 = (2..=k).map(|i| (i as f64).ln()).sum();
        ((kf - 1.0) * (lambda * kf).ln() - lambda * kf - ln_factorial).exp()
    }

    /// Cumulative probability of a cascade of at most `k` cells
    pub fn cdf(&self, k: u32) -> f64 {
        (1..=k.min(MAX_CASCADE)).map(|i| self.pmf(i)).sum()
    }

    /// Cascade size for a uniform variate `u` in `[0, 1)`.
    ///
    /// Linear scan from k = 1 accumulating the mass until it reaches `u`.
    /// If the modeled mass never reaches `u` the scan stops at
    /// [`MAX_CASCADE`].
    pub fn quantile(&self, u: f64) -> u32 {
        let mut k = 1;
        let mut cumulative = self.pmf(1);
        while u > cumulative && k < MAX_CASCADE {
            k += 1;
            cumulative += self.pmf(k);
        }
        k
    }

    /// Draw the cascade size seeded by one primary avalanche
    pub fn sample_cascade(&self, rng: &mut RandomSource) -> u32 {
        self.quantile(rng.uniform(0.0, 1.0))
    }

    /// Total fired cells for `seeds` independent primaries
    pub fn sample_total(&self, seeds: u64, rng: &mut RandomSource) -> u64 {
        (0..seeds).map(|_| self.sample_cascade(rng) as u64).sum()
    }

    /// Mean cascade multiplicity over the modeled support, about `1/(1-λ)`
    pub fn mean_multiplicity(&self) -> f64 {
        (1..=MAX_CASCADE).map(|k| k as f64 * self.pmf(k)).sum()
    }
}
