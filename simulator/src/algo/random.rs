//! Seeded random source for the digitization stages
//!
//! Every stage owns exactly one `RandomSource`. All stochastic draws of an
//! event go through it in program order, so a fixed seed and a fixed energy
//! sequence reproduce every trace bit for bit.

use rand::rngs::StdRng;
use rand::{thread_rng, Rng, RngCore, SeedableRng};
use rand_distr::{Binomial, Distribution, Poisson, StandardNormal};

/// Seeded generator exposing the four draws used by the pipeline.
#[derive(Debug, Clone)]
pub struct RandomSource {
    rng: StdRng,
    seed: u64,
}

impl RandomSource {
    /// Create a source from an explicit seed
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            seed,
        }
    }

    /// Create a source from an optional seed, falling back to a fresh entropy seed
    pub fn new(seed: Option<u64>) -> Self {
        Self::from_seed(seed.unwrap_or_else(|| thread_rng().next_u64()))
    }

    /// Seed the stream was last (re)started from
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Restart the stream from a new seed
    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
        self.seed = seed;
    }

    /// Gaussian draw with the given mean and standard deviation.
    ///
    /// Always consumes exactly one standard-normal variate. A zero sigma
    /// returns the mean, and non-finite inputs propagate as NaN.
    pub fn gaus(&mut self, mean: f64, sigma: f64) -> f64 {
        let z: f64 = self.rng.sample(StandardNormal);
        mean + sigma * z
    }

    /// Poisson draw with mean `lambda`.
    ///
    /// Returns 0 for `lambda <= 0` and NaN for a NaN mean.
    pub fn poisson(&mut self, lambda: f64) -> f64 {
        if lambda.is_nan() {
            return f64::NAN;
        }
        if lambda <= 0.0 {
            return 0.0;
        }
        match Poisson::new(lambda) {
            Ok(dist) => dist.sample(&mut self.rng),
            Err(_) => f64::NAN,
        }
    }

    /// Binomial draw of `n` trials with success probability `p`.
    ///
    /// An invalid probability yields NaN.
    pub fn binomial(&mut self, n: u64, p: f64) -> f64 {
        match Binomial::new(n, p) {
            Ok(dist) => dist.sample(&mut self.rng) as f64,
            Err(_) => f64::NAN,
        }
    }

    /// Uniform draw in `[low, high)`
    pub fn uniform(&mut self, low: f64, high: f64) -> f64 {
        low + (high - low) * self.rng.gen::<f64>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_same_seed_same_stream() {
        let mut a = RandomSource::from_seed(42);
        let mut b = RandomSource::from_seed(42);

        for _ in 0..100 {
            assert_eq!(a.gaus(10.0, 2.0), b.gaus(10.0, 2.0));
            assert_eq!(a.poisson(35.0), b.poisson(35.0));
            assert_eq!(a.binomial(50, 0.3), b.binomial(50, 0.3));
            assert_eq!(a.uniform(1.0, 5.0), b.uniform(1.0, 5.0));
        }
    }

    #[test]
    fn test_reseed_restarts_stream() {
        let mut source = RandomSource::from_seed(7);
        let first: Vec<f64> = (0..10).map(|_| source.uniform(0.0, 1.0)).collect();

        source.reseed(7);
        let second: Vec<f64> = (0..10).map(|_| source.uniform(0.0, 1.0)).collect();

        assert_eq!(first, second);
        assert_eq!(source.seed(), 7);
    }

    #[test]
    fn test_degenerate_inputs() {
        let mut source = RandomSource::from_seed(1);

        assert_eq!(source.poisson(0.0), 0.0);
        assert_eq!(source.poisson(-3.0), 0.0);
        assert!(source.poisson(f64::NAN).is_nan());
        assert_eq!(source.gaus(4.5, 0.0), 4.5);
        assert!(source.binomial(10, 1.5).is_nan());
        assert_eq!(source.binomial(0, 0.5), 0.0);
    }

    #[test]
    fn test_draw_means() {
        let mut source = RandomSource::from_seed(2024);
        let n = 20_000;

        let gaus_mean = (0..n).map(|_| source.gaus(3.0, 1.0)).sum::<f64>() / n as f64;
        let poisson_mean = (0..n).map(|_| source.poisson(12.0)).sum::<f64>() / n as f64;
        let binom_mean = (0..n).map(|_| source.binomial(40, 0.25)).sum::<f64>() / n as f64;
        let uniform_mean = (0..n).map(|_| source.uniform(2.0, 4.0)).sum::<f64>() / n as f64;

        assert_relative_eq!(gaus_mean, 3.0, epsilon = 0.05);
        assert_relative_eq!(poisson_mean, 12.0, epsilon = 0.15);
        assert_relative_eq!(binom_mean, 10.0, epsilon = 0.15);
        assert_relative_eq!(uniform_mean, 3.0, epsilon = 0.05);
    }
}
