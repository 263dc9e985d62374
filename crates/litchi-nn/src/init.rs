// init — Weight and bias initialization strategies
//
// A layer carries two of these, one for its weight slots and one for its bias
// slots, and calls `fill` on each trainable buffer during `init_weight`. The
// strategies are keyed on fan-in / fan-out, the number of incoming and
// outgoing connections of one unit:
//
//   xavier(scale=6)        — U(-a, a), a = sqrt(scale / (fan_in + fan_out))
//   lecun(scale=1)         — U(-a, a), a = sqrt(scale / fan_in)
//   he(scale=2)            — N(0, sigma), sigma = sqrt(scale / fan_in)
//   gaussian(mean, sigma)  — N(mean, sigma)
//   constant(value)        — every element = value
//
// Randomness always comes from the Random passed in, so a graph reseeded with
// the same value produces the same weights.

use litchi_core::error::{Error, Result};
use litchi_core::random::Random;
use litchi_core::scalar::Scalar;

/// A fill strategy for weight or bias buffers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WeightInit {
    /// Glorot uniform.
    Xavier { scale: Scalar },
    /// LeCun uniform.
    Lecun { scale: Scalar },
    /// He normal, for rectifier networks.
    He { scale: Scalar },
    /// Plain normal distribution.
    Gaussian { mean: Scalar, sigma: Scalar },
    /// A single value everywhere.
    Constant { value: Scalar },
}

impl Default for WeightInit {
    fn default() -> Self {
        Self::xavier()
    }
}

impl WeightInit {
    /// Xavier with the usual scale of 6.
    pub fn xavier() -> Self {
        WeightInit::Xavier { scale: 6.0 }
    }

    pub fn xavier_with_scale(scale: Scalar) -> Self {
        WeightInit::Xavier { scale }
    }

    pub fn lecun() -> Self {
        WeightInit::Lecun { scale: 1.0 }
    }

    pub fn he() -> Self {
        WeightInit::He { scale: 2.0 }
    }

    pub fn gaussian(mean: Scalar, sigma: Scalar) -> Self {
        WeightInit::Gaussian { mean, sigma }
    }

    pub fn constant(value: Scalar) -> Self {
        WeightInit::Constant { value }
    }

    /// Overwrite every element of `buf`.
    pub fn fill(
        &self,
        buf: &mut [Scalar],
        fan_in: usize,
        fan_out: usize,
        rng: &mut Random,
    ) -> Result<()> {
        match *self {
            WeightInit::Xavier { scale } => {
                let a = bound("xavier", scale, fan_in + fan_out)?;
                rng.fill_uniform(buf, -a, a);
            }
            WeightInit::Lecun { scale } => {
                let a = bound("lecun", scale, fan_in)?;
                rng.fill_uniform(buf, -a, a);
            }
            WeightInit::He { scale } => {
                let sigma = bound("he", scale, fan_in)?;
                rng.fill_gaussian(buf, 0.0, sigma)?;
            }
            WeightInit::Gaussian { mean, sigma } => {
                rng.fill_gaussian(buf, mean, sigma)?;
            }
            WeightInit::Constant { value } => {
                buf.iter_mut().for_each(|v| *v = value);
            }
        }
        Ok(())
    }
}

/// sqrt(scale / fan), rejecting a zero fan.
fn bound(name: &str, scale: Scalar, fan: usize) -> Result<Scalar> {
    if fan == 0 {
        return Err(Error::msg(format!("{name} initializer needs a non-zero fan")));
    }
    Ok((scale / fan as Scalar).sqrt())
}
