use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use crate::error::{Error, Result};
use crate::scalar::Scalar;

// Random — Explicit, seedable random source
//
// Weight initializers and test-data generators draw from a Random value that
// is passed to them, never from a hidden global. The graph owns one Random so
// that reseeding it makes every later initialization reproducible.

/// Seed used when none is given.
pub const DEFAULT_SEED: u64 = 1;

/// A seeded pseudo-random number generator.
#[derive(Debug, Clone)]
pub struct Random {
    rng: StdRng,
    seed: u64,
}

impl Default for Random {
    fn default() -> Self {
        Self::new(DEFAULT_SEED)
    }
}

impl Random {
    pub fn new(seed: u64) -> Self {
        Random {
            rng: StdRng::seed_from_u64(seed),
            seed,
        }
    }

    /// Restart the sequence from `seed`.
    pub fn set_seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
        self.seed = seed;
    }

    /// The seed the current sequence was started from.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Uniform sample in [min, max].
    pub fn uniform(&mut self, min: Scalar, max: Scalar) -> Scalar {
        if min >= max {
            return min;
        }
        self.rng.gen_range(min..=max)
    }

    /// Normal sample with the given mean and standard deviation.
    pub fn gaussian(&mut self, mean: Scalar, sigma: Scalar) -> Result<Scalar> {
        Ok(normal(mean, sigma)?.sample(&mut self.rng))
    }

    /// Uniform index in [0, len). `len` must be non-zero.
    pub fn uniform_index(&mut self, len: usize) -> Result<usize> {
        if len == 0 {
            return Err(Error::IndexOutOfRange {
                what: "random",
                index: 0,
                len,
            });
        }
        Ok(self.rng.gen_range(0..len))
    }

    /// True with probability `p`.
    pub fn bernoulli(&mut self, p: Scalar) -> bool {
        self.uniform(0.0, 1.0) <= p
    }

    pub fn fill_uniform(&mut self, buf: &mut [Scalar], min: Scalar, max: Scalar) {
        for v in buf.iter_mut() {
            *v = self.uniform(min, max);
        }
    }

    pub fn fill_gaussian(&mut self, buf: &mut [Scalar], mean: Scalar, sigma: Scalar) -> Result<()> {
        let normal = normal(mean, sigma)?;
        for v in buf.iter_mut() {
            *v = normal.sample(&mut self.rng);
        }
        Ok(())
    }
}

/// N(mean, sigma). `Normal::new` accepts a negative sigma, so it is checked here.
fn normal(mean: Scalar, sigma: Scalar) -> Result<Normal<Scalar>> {
    if !(sigma >= 0.0) {
        return Err(Error::msg(format!(
            "invalid normal distribution: sigma must be non-negative, got {sigma}"
        )));
    }
    Normal::new(mean, sigma).map_err(|e| Error::msg(format!("invalid normal distribution: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_sequence() {
        let mut a = Random::new(42);
        let mut b = Random::new(42);
        for _ in 0..16 {
            assert_eq!(a.uniform(-1.0, 1.0), b.uniform(-1.0, 1.0));
        }
    }

    #[test]
    fn test_set_seed_restarts() {
        let mut r = Random::new(7);
        let first: Vec<Scalar> = (0..4).map(|_| r.uniform(0.0, 1.0)).collect();
        r.set_seed(7);
        let again: Vec<Scalar> = (0..4).map(|_| r.uniform(0.0, 1.0)).collect();
        assert_eq!(first, again);
        assert_eq!(r.seed(), 7);
    }

    #[test]
    fn test_uniform_range() {
        let mut r = Random::default();
        let mut buf = vec![0.0; 1000];
        r.fill_uniform(&mut buf, -2.0, 3.0);
        assert!(buf.iter().all(|&x| (-2.0..=3.0).contains(&x)));
    }

    #[test]
    fn test_degenerate_uniform() {
        let mut r = Random::default();
        assert_eq!(r.uniform(0.5, 0.5), 0.5);
    }

    #[test]
    fn test_gaussian_mean() {
        let mut r = Random::new(3);
        let mut buf = vec![0.0; 10000];
        r.fill_gaussian(&mut buf, 5.0, 0.1).unwrap();
        let mean = buf.iter().sum::<Scalar>() / buf.len() as Scalar;
        assert!((mean - 5.0).abs() < 0.05, "mean {} too far from 5.0", mean);
    }

    #[test]
    fn test_invalid_sigma() {
        let mut r = Random::default();
        assert!(r.gaussian(0.0, -1.0).is_err());
        assert!(r.gaussian(0.0, Scalar::NAN).is_err());
        let mut buf = vec![0.0; 4];
        assert!(r.fill_gaussian(&mut buf, 0.0, -0.5).is_err());
        assert!(buf.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_uniform_index() {
        let mut r = Random::default();
        for _ in 0..100 {
            assert!(r.uniform_index(5).unwrap() < 5);
        }
        assert!(r.uniform_index(0).is_err());
    }
}
