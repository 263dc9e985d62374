// Gradient check — Compare a layer's backward pass against finite differences
//
// For one (input slot, input position, output slot, output position) trial:
//
//   numeric    = (f(x + h) - f(x - h)) / 2h        h = sqrt(machine epsilon)
//   analytical = d_in[in_pos] after back-propagating a one-hot d_out[out_pos]
//
// where f is the layer's forward pass read at `out_pos` of sample 0. The two
// agree to within `gradient_tolerance()` when the layer's derivative is right.
//
// Both functions take their tensors by value and work on private copies, so
// the caller's data and the layer's graph edges are never touched. Only the
// layer's kernel is used (`forward_propagation` / `back_propagation`).
//
// `check_gradients` runs many random trials over one set of random inputs and
// collects the worst error plus every failing trial.

use log::debug;

use litchi_core::bail;
use litchi_core::error::{Error, Result};
use litchi_core::random::Random;
use litchi_core::scalar::{self, Scalar};
use litchi_core::tensor::{self, Tensor};

use crate::layer::Layer;

/// d out[out_edge][0][out_pos] / d in[in_edge][0][in_pos] by central difference.
pub fn numeric_gradient(
    layer: &Layer,
    mut in_data: Vec<Tensor>,
    in_edge: usize,
    in_pos: usize,
    mut out_data: Vec<Tensor>,
    out_edge: usize,
    out_pos: usize,
) -> Result<Scalar> {
    let h = scalar::finite_difference_step();
    let x = *sample0_mut(&mut in_data, in_edge, in_pos, "checked input")?;

    *sample0_mut(&mut in_data, in_edge, in_pos, "checked input")? = x + h;
    layer.forward_propagation(&in_data, &mut out_data)?;
    let plus = *sample0_mut(&mut out_data, out_edge, out_pos, "checked output")?;

    *sample0_mut(&mut in_data, in_edge, in_pos, "checked input")? = x - h;
    layer.forward_propagation(&in_data, &mut out_data)?;
    let minus = *sample0_mut(&mut out_data, out_edge, out_pos, "checked output")?;

    Ok((plus - minus) / (2.0 * h))
}

/// The same derivative read from the layer's backward pass.
#[allow(clippy::too_many_arguments)]
pub fn analytical_gradient(
    layer: &Layer,
    in_data: Vec<Tensor>,
    in_edge: usize,
    in_pos: usize,
    mut out_data: Vec<Tensor>,
    mut out_grads: Vec<Tensor>,
    out_edge: usize,
    out_pos: usize,
) -> Result<Scalar> {
    layer.forward_propagation(&in_data, &mut out_data)?;

    for g in out_grads.iter_mut() {
        tensor::fill_tensor(g, 0.0);
    }
    *sample0_mut(&mut out_grads, out_edge, out_pos, "checked output gradient")? = 1.0;

    let mut in_grads = in_data.clone();
    for g in in_grads.iter_mut() {
        tensor::fill_tensor(g, 0.0);
    }
    layer.back_propagation(&in_data, &out_data, &out_grads, &mut in_grads)?;

    Ok(*sample0_mut(&mut in_grads, in_edge, in_pos, "checked input gradient")?)
}

/// One tensor per entry of `sizes`, with `nsamples[i]` samples of length
/// `sizes[i]` drawn uniformly from [-1, 1].
pub fn generate_test_data(
    rng: &mut Random,
    nsamples: &[usize],
    sizes: &[usize],
) -> Result<Vec<Tensor>> {
    if nsamples.len() != sizes.len() {
        bail!(
            "generate_test_data: {} sample counts for {} sizes",
            nsamples.len(),
            sizes.len()
        );
    }
    Ok(nsamples
        .iter()
        .zip(sizes)
        .map(|(&n, &dim)| {
            let mut t = tensor::zeros(n, dim);
            for v in t.iter_mut() {
                rng.fill_uniform(v, -1.0, 1.0);
            }
            t
        })
        .collect())
}

fn sample0_mut<'a>(
    tensors: &'a mut [Tensor],
    edge: usize,
    pos: usize,
    what: &'static str,
) -> Result<&'a mut Scalar> {
    let len = tensors.len();
    let t = tensors.get_mut(edge).ok_or(Error::IndexOutOfRange {
        what,
        index: edge,
        len,
    })?;
    let sample = t.first_mut().ok_or(Error::IndexOutOfRange {
        what,
        index: 0,
        len: 0,
    })?;
    let len = sample.len();
    sample.get_mut(pos).ok_or(Error::IndexOutOfRange {
        what,
        index: pos,
        len,
    })
}

/// How many trials to run and how close the two gradients must be.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradCheckConfig {
    pub trials: usize,
    pub tolerance: Scalar,
}

impl Default for GradCheckConfig {
    fn default() -> Self {
        GradCheckConfig {
            trials: 100,
            tolerance: scalar::gradient_tolerance(),
        }
    }
}

impl GradCheckConfig {
    pub fn with_trials(mut self, trials: usize) -> Self {
        self.trials = trials;
        self
    }

    pub fn with_tolerance(mut self, tolerance: Scalar) -> Self {
        self.tolerance = tolerance;
        self
    }
}

/// One trial and both gradients it produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradTrial {
    pub in_edge: usize,
    pub in_pos: usize,
    pub out_edge: usize,
    pub out_pos: usize,
    pub numeric: Scalar,
    pub analytical: Scalar,
}

impl GradTrial {
    pub fn error(&self) -> Scalar {
        (self.numeric - self.analytical).abs()
    }
}

/// Outcome of `check_gradients`.
#[derive(Debug, Clone, Default)]
pub struct GradCheckReport {
    pub trials: usize,
    pub max_error: Scalar,
    pub failures: Vec<GradTrial>,
}

impl GradCheckReport {
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Check `config.trials` random positions of `layer` over random inputs.
///
/// Every input slot (weights included) gets one sample in [-1, 1]; trials
/// pick the slots and positions uniformly.
pub fn check_gradients(
    layer: &Layer,
    rng: &mut Random,
    config: &GradCheckConfig,
) -> Result<GradCheckReport> {
    let in_sizes: Vec<usize> = layer.in_shape().iter().map(|s| s.size()).collect();
    let out_sizes: Vec<usize> = layer.out_shape().iter().map(|s| s.size()).collect();

    let in_data = generate_test_data(rng, &vec![1; in_sizes.len()], &in_sizes)?;
    let out_data: Vec<Tensor> = out_sizes.iter().map(|&d| tensor::zeros(1, d)).collect();

    let mut report = GradCheckReport {
        trials: config.trials,
        ..GradCheckReport::default()
    };
    for _ in 0..config.trials {
        let in_edge = rng.uniform_index(in_sizes.len())?;
        let in_pos = rng.uniform_index(in_sizes[in_edge])?;
        let out_edge = rng.uniform_index(out_sizes.len())?;
        let out_pos = rng.uniform_index(out_sizes[out_edge])?;

        let numeric = numeric_gradient(
            layer,
            in_data.clone(),
            in_edge,
            in_pos,
            out_data.clone(),
            out_edge,
            out_pos,
        )?;
        let analytical = analytical_gradient(
            layer,
            in_data.clone(),
            in_edge,
            in_pos,
            out_data.clone(),
            out_data.clone(),
            out_edge,
            out_pos,
        )?;

        let trial = GradTrial {
            in_edge,
            in_pos,
            out_edge,
            out_pos,
            numeric,
            analytical,
        };
        debug!(
            "trial in[{}][{}] -> out[{}][{}]: numeric {} analytical {}",
            in_edge, in_pos, out_edge, out_pos, numeric, analytical
        );
        report.max_error = report.max_error.max(trial.error());
        if trial.error() >= config.tolerance {
            report.failures.push(trial);
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use litchi_core::backend::Backend;

    #[test]
    fn test_generate_test_data_shapes() {
        let mut rng = Random::new(4);
        let data = generate_test_data(&mut rng, &[2, 1], &[3, 5]).unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data[0].len(), 2);
        assert_eq!(data[0][0].len(), 3);
        assert_eq!(data[1][0].len(), 5);
        assert!(data.iter().flatten().flatten().all(|x| x.abs() <= 1.0));
    }

    #[test]
    fn test_generate_test_data_length_mismatch() {
        let mut rng = Random::default();
        assert!(generate_test_data(&mut rng, &[1], &[1, 2]).is_err());
    }

    #[test]
    fn test_fc_weight_gradient_is_input() {
        // d out[i] / d W[c * out + i] = in[c]
        let layer = Layer::fully_connected(2, 2, false, Backend::Internal).unwrap();
        let in_data = vec![vec![vec![0.25, -0.75]], vec![vec![0.1, 0.2, 0.3, 0.4]]];
        let out = vec![tensor::zeros(1, 2)];
        let a = analytical_gradient(&layer, in_data.clone(), 1, 2, out.clone(), out.clone(), 0, 0)
            .unwrap();
        let n = numeric_gradient(&layer, in_data, 1, 2, out, 0, 0).unwrap();
        assert!((a - (-0.75)).abs() < 1e-6);
        assert!((n - a).abs() < scalar::gradient_tolerance());
    }

    #[test]
    fn test_position_out_of_range() {
        let layer = Layer::tanh(2, 1, 1).unwrap();
        let in_data = vec![vec![vec![0.0, 0.0]]];
        let out = vec![tensor::zeros(1, 2)];
        assert!(matches!(
            numeric_gradient(&layer, in_data, 0, 5, out, 0, 0),
            Err(Error::IndexOutOfRange { index: 5, .. })
        ));
    }

    #[test]
    fn test_config_builder() {
        let c = GradCheckConfig::default().with_trials(7).with_tolerance(0.5);
        assert_eq!(c.trials, 7);
        assert_eq!(c.tolerance, 0.5);
    }
}
