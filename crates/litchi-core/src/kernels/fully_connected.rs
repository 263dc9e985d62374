use std::sync::Arc;

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::kernel::{OpKernel, OpKernelConstruction, OpKernelContext, OpKernelGradContext};
use crate::params::{FullyParams, OpKind, Params};
use crate::scalar::Scalar;
use crate::tensor::{self, Tensor};

// Fully-connected kernel — out = W·in + b, one sample at a time
//
// WEIGHT LAYOUT:
//
//   W is stored flat with in_size rows of out_size entries:
//
//     W[c * out_size + i]  = weight from input unit c to output unit i
//
//   so out[i] = sum_c W[c * out_size + i] * in[c] + bias[i].
//
// Inputs of the kernel context:  0 = data, 1 = weights, 2 = bias (if any).
// Outputs of the kernel context: 0 = data.
//
// The gradient pass writes three input gradients:
//
//   d_in[c]                 = sum_i W[c * out_size + i] * d_out[i]
//   d_W[c * out_size + i]  += in[c] * d_out[i]
//   d_b[i]                 += d_out[i]
//
// Weight and bias gradients are kept per sample (sample s accumulates into
// d_W[s]) so callers can reduce over the batch however they like.

/// Dense layer kernel.
#[derive(Debug)]
pub struct FullyConnectedOp {
    params: Arc<Params>,
}

impl FullyConnectedOp {
    pub fn new(ctx: &OpKernelConstruction) -> Self {
        FullyConnectedOp {
            params: Arc::clone(ctx.params()),
        }
    }
}

impl OpKernel for FullyConnectedOp {
    fn params(&self) -> &Params {
        &self.params
    }

    fn compute(&self, ctx: &mut OpKernelContext<'_>) -> Result<()> {
        let params = self.params.fully()?;

        let in_data = ctx.input(0)?;
        let weights = ctx.input(1)?;
        let bias = if params.has_bias {
            Some(first_sample("fully-connected bias", ctx.input(2)?, params.out_size)?)
        } else {
            None
        };
        let w = first_sample(
            "fully-connected weights",
            weights,
            params.in_size * params.out_size,
        )?;
        tensor::check_sample_len("fully-connected input", in_data, params.in_size)?;

        let backend = ctx.backend();
        let out_data = ctx.output(0)?;
        tensor::check_batch(
            "fully-connected output",
            out_data,
            in_data.len(),
            params.out_size,
        )?;

        match backend {
            Backend::Internal => {
                tensor::fill_tensor(out_data, 0.0);
                fully_connected_forward(in_data, w, bias, out_data, params);
                Ok(())
            }
            other => Err(Error::UnsupportedBackend {
                op: OpKind::FullyConnected,
                backend: other,
            }),
        }
    }

    fn compute_gradient(&self, ctx: &mut OpKernelGradContext<'_>) -> Result<()> {
        let params = self.params.fully()?;

        let in_data = ctx.input(0)?;
        let w = first_sample(
            "fully-connected weights",
            ctx.input(1)?,
            params.in_size * params.out_size,
        )?;
        let curr_delta = ctx.output_grad(0)?;
        let samples = in_data.len();
        tensor::check_sample_len("fully-connected input", in_data, params.in_size)?;
        tensor::check_batch(
            "fully-connected output gradient",
            curr_delta,
            samples,
            params.out_size,
        )?;

        let backend = ctx.backend();
        if backend != Backend::Internal {
            return Err(Error::UnsupportedBackend {
                op: OpKind::FullyConnected,
                backend,
            });
        }

        let grads = ctx.input_grads_mut();
        let expected = if params.has_bias { 3 } else { 2 };
        if grads.len() < expected {
            return Err(Error::IndexOutOfRange {
                what: "fully-connected input gradient",
                index: expected - 1,
                len: grads.len(),
            });
        }
        let (prev_delta, rest) = grads.split_at_mut(1);
        let (dw, db) = rest.split_at_mut(1);
        let prev_delta = &mut prev_delta[0];
        let dw = &mut dw[0];
        let db = if params.has_bias { Some(&mut db[0]) } else { None };

        tensor::check_batch(
            "fully-connected input gradient",
            prev_delta,
            samples,
            params.in_size,
        )?;
        tensor::check_batch(
            "fully-connected weight gradient",
            dw,
            samples,
            params.in_size * params.out_size,
        )?;
        if let Some(db) = db.as_deref() {
            tensor::check_batch("fully-connected bias gradient", db, samples, params.out_size)?;
        }

        fully_connected_backward(in_data, w, curr_delta, prev_delta, dw, db, params);
        Ok(())
    }
}

/// The single weight (or bias) vector of a parameter tensor.
fn first_sample<'a>(what: &'static str, t: &'a Tensor, dim: usize) -> Result<&'a [Scalar]> {
    let first = t.first().ok_or(Error::IndexOutOfRange {
        what,
        index: 0,
        len: 0,
    })?;
    if first.len() != dim {
        return Err(Error::ShapeInconsistency {
            what,
            expected: dim,
            got: first.len(),
        });
    }
    Ok(first)
}

/// Forward pass over every sample of `in_data`.
///
/// Lengths are assumed to have been checked by the caller.
pub fn fully_connected_forward(
    in_data: &Tensor,
    w: &[Scalar],
    bias: Option<&[Scalar]>,
    out_data: &mut Tensor,
    params: &FullyParams,
) {
    for (input, out) in in_data.iter().zip(out_data.iter_mut()) {
        for (i, o) in out.iter_mut().enumerate().take(params.out_size) {
            let mut acc: Scalar = 0.0;
            for (c, &x) in input.iter().enumerate().take(params.in_size) {
                acc += w[c * params.out_size + i] * x;
            }
            if let Some(b) = bias {
                acc += b[i];
            }
            *o = acc;
        }
    }
}

/// Backward pass over every sample of `in_data`.
pub fn fully_connected_backward(
    in_data: &Tensor,
    w: &[Scalar],
    curr_delta: &Tensor,
    prev_delta: &mut Tensor,
    dw: &mut Tensor,
    mut db: Option<&mut Tensor>,
    params: &FullyParams,
) {
    let (in_size, out_size) = (params.in_size, params.out_size);
    for (sample, input) in in_data.iter().enumerate() {
        let delta = &curr_delta[sample];

        let prev = &mut prev_delta[sample];
        for c in 0..in_size {
            let row = &w[c * out_size..(c + 1) * out_size];
            prev[c] = row.iter().zip(delta.iter()).map(|(a, b)| a * b).sum();
        }

        let dw_sample = &mut dw[sample];
        for c in 0..in_size {
            for i in 0..out_size {
                dw_sample[c * out_size + i] += input[c] * delta[i];
            }
        }

        if let Some(db) = db.as_deref_mut() {
            for (b, d) in db[sample].iter_mut().zip(delta.iter()) {
                *b += d;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ActivationParams;
    use crate::kernels::activation::Activation;
    use crate::shape::Shape3D;

    fn op(in_size: usize, out_size: usize, has_bias: bool) -> FullyConnectedOp {
        let params = Arc::new(Params::FullyConnected(FullyParams {
            in_size,
            out_size,
            has_bias,
        }));
        FullyConnectedOp::new(&OpKernelConstruction::new(params))
    }

    #[test]
    fn test_forward_weight_layout() {
        // in_size=2, out_size=3: W[c*3 + i]
        let k = op(2, 3, false);
        let input = vec![vec![vec![1.0, 2.0]], vec![vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]]];
        let mut out = vec![tensor::zeros(1, 3)];
        let mut ctx = OpKernelContext::new(&input, &mut out, Backend::Internal);
        k.compute(&mut ctx).unwrap();
        // out[i] = W[i]*1 + W[3+i]*2
        assert_eq!(out[0][0], vec![9.0, 12.0, 15.0]);
    }

    #[test]
    fn test_forward_with_bias_overwrites_stale_output() {
        let k = op(2, 1, true);
        let input = vec![
            vec![vec![1.0, 1.0], vec![2.0, 0.0]],
            vec![vec![1.0, 1.0]],
            vec![vec![0.5]],
        ];
        let mut out = vec![vec![vec![7.0], vec![7.0]]];
        let mut ctx = OpKernelContext::new(&input, &mut out, Backend::Internal);
        k.compute(&mut ctx).unwrap();
        assert_eq!(out[0], vec![vec![2.5], vec![2.5]]);
    }

    #[test]
    fn test_unsupported_backend() {
        let k = op(1, 1, false);
        let input = vec![vec![vec![1.0]], vec![vec![1.0]]];
        let mut out = vec![tensor::zeros(1, 1)];
        let mut ctx = OpKernelContext::new(&input, &mut out, Backend::Avx);
        assert!(matches!(
            k.compute(&mut ctx),
            Err(Error::UnsupportedBackend {
                backend: Backend::Avx,
                ..
            })
        ));
    }

    #[test]
    fn test_unsupported_backend_leaves_output() {
        let k = op(1, 1, false);
        let input = vec![vec![vec![1.0]], vec![vec![1.0]]];
        let mut out = vec![vec![vec![3.0]]];
        let mut ctx = OpKernelContext::new(&input, &mut out, Backend::Avx);
        assert!(k.compute(&mut ctx).is_err());
        assert_eq!(out[0][0], vec![3.0]);
    }

    #[test]
    fn test_params_type_mismatch() {
        let params = Arc::new(Params::Activation(ActivationParams {
            shape: Shape3D::vector(1),
            function: Activation::Relu,
        }));
        let k = FullyConnectedOp::new(&OpKernelConstruction::new(params));
        let input = vec![vec![vec![1.0]], vec![vec![1.0]]];
        let mut out = vec![tensor::zeros(1, 1)];
        let mut ctx = OpKernelContext::new(&input, &mut out, Backend::Internal);
        assert!(matches!(
            k.compute(&mut ctx),
            Err(Error::ParamsTypeMismatch {
                expected: OpKind::FullyConnected,
                got: OpKind::Activation
            })
        ));
    }

    #[test]
    fn test_input_shape_inconsistency() {
        let k = op(3, 1, false);
        let input = vec![vec![vec![1.0, 2.0]], vec![vec![1.0, 1.0, 1.0]]];
        let mut out = vec![tensor::zeros(1, 1)];
        let mut ctx = OpKernelContext::new(&input, &mut out, Backend::Internal);
        assert!(matches!(
            k.compute(&mut ctx),
            Err(Error::ShapeInconsistency {
                expected: 3,
                got: 2,
                ..
            })
        ));
    }

    #[test]
    fn test_backward() {
        let k = op(2, 2, true);
        // W = [[1, 2], [3, 4]] in W[c*2 + i] layout
        let in_data = vec![
            vec![vec![1.0, -1.0]],
            vec![vec![1.0, 2.0, 3.0, 4.0]],
            vec![vec![0.0, 0.0]],
        ];
        let out_data = vec![tensor::zeros(1, 2)];
        let out_grad = vec![vec![vec![1.0, 0.5]]];
        let mut in_grad = vec![tensor::zeros(1, 2), tensor::zeros(1, 4), tensor::zeros(1, 2)];
        let mut ctx = OpKernelGradContext::new(
            &in_data,
            &out_data,
            &out_grad,
            &mut in_grad,
            Backend::Internal,
        );
        k.compute_gradient(&mut ctx).unwrap();
        // d_in[c] = W[c*2]*1 + W[c*2+1]*0.5
        assert_eq!(in_grad[0][0], vec![2.0, 5.0]);
        // d_W[c*2+i] = in[c] * d_out[i]
        assert_eq!(in_grad[1][0], vec![1.0, 0.5, -1.0, -0.5]);
        assert_eq!(in_grad[2][0], vec![1.0, 0.5]);
    }
}
