use std::fmt;
use std::sync::Arc;

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::kernel::{OpKernel, OpKernelConstruction, OpKernelContext, OpKernelGradContext};
use crate::params::{OpKind, Params};
use crate::scalar::Scalar;
use crate::tensor::{self, Tensor};

// Activation kernel — y = f(x) elementwise, dx = dy * f'(x, y)
//
// All activation layers share this one kernel; the function is a field of
// ActivationParams. The derivative is written in terms of both the input and
// the output because for sigmoid and tanh the output form is the cheap one.

/// Elementwise activation functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Activation {
    /// max(0, x)
    Relu,
    /// 1 / (1 + e^(-x))
    Sigmoid,
    /// tanh(x)
    Tanh,
}

impl Activation {
    pub fn forward(&self, x: Scalar) -> Scalar {
        match self {
            Activation::Relu => x.max(0.0),
            Activation::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            Activation::Tanh => x.tanh(),
        }
    }

    /// dy/dx given the input `x` and the output `y = forward(x)`.
    pub fn derivative(&self, x: Scalar, y: Scalar) -> Scalar {
        match self {
            Activation::Relu => {
                if x > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::Sigmoid => y * (1.0 - y),
            Activation::Tanh => 1.0 - y * y,
        }
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Activation::Relu => "relu",
            Activation::Sigmoid => "sigmoid",
            Activation::Tanh => "tanh",
        };
        write!(f, "{}", s)
    }
}

/// Elementwise activation kernel.
#[derive(Debug)]
pub struct ActivationOp {
    params: Arc<Params>,
}

impl ActivationOp {
    pub fn new(ctx: &OpKernelConstruction) -> Self {
        ActivationOp {
            params: Arc::clone(ctx.params()),
        }
    }
}

impl OpKernel for ActivationOp {
    fn params(&self) -> &Params {
        &self.params
    }

    fn compute(&self, ctx: &mut OpKernelContext<'_>) -> Result<()> {
        let params = self.params.activation()?;
        let dim = params.shape.size();

        let x = ctx.input(0)?;
        tensor::check_sample_len("activation input", x, dim)?;

        let backend = ctx.backend();
        let y = ctx.output(0)?;
        tensor::check_batch("activation output", y, x.len(), dim)?;
        match backend {
            Backend::Internal => {
                tensor::fill_tensor(y, 0.0);
                activation_forward(params.function, x, y);
                Ok(())
            }
            other => Err(Error::UnsupportedBackend {
                op: OpKind::Activation,
                backend: other,
            }),
        }
    }

    fn compute_gradient(&self, ctx: &mut OpKernelGradContext<'_>) -> Result<()> {
        let params = self.params.activation()?;
        let dim = params.shape.size();

        let x = ctx.input(0)?;
        let y = ctx.output(0)?;
        let dy = ctx.output_grad(0)?;
        let samples = x.len();
        tensor::check_sample_len("activation input", x, dim)?;
        tensor::check_batch("activation output", y, samples, dim)?;
        tensor::check_batch("activation output gradient", dy, samples, dim)?;

        let backend = ctx.backend();
        if backend != Backend::Internal {
            return Err(Error::UnsupportedBackend {
                op: OpKind::Activation,
                backend,
            });
        }

        let dx = ctx
            .input_grads_mut()
            .first_mut()
            .ok_or(Error::IndexOutOfRange {
                what: "activation input gradient",
                index: 0,
                len: 0,
            })?;
        tensor::check_batch("activation input gradient", dx, samples, dim)?;

        activation_backward(params.function, x, y, dx, dy);
        Ok(())
    }
}

/// y = f(x) for every sample of `x`.
pub fn activation_forward(f: Activation, x: &Tensor, y: &mut Tensor) {
    for (xs, ys) in x.iter().zip(y.iter_mut()) {
        for (xj, yj) in xs.iter().zip(ys.iter_mut()) {
            *yj = f.forward(*xj);
        }
    }
}

/// dx = dy * f'(x, y) for every sample of `x`.
pub fn activation_backward(f: Activation, x: &Tensor, y: &Tensor, dx: &mut Tensor, dy: &Tensor) {
    for (sample, xs) in x.iter().enumerate() {
        let (ys, dys) = (&y[sample], &dy[sample]);
        for (j, dxj) in dx[sample].iter_mut().enumerate() {
            *dxj = dys[j] * f.derivative(xs[j], ys[j]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{ActivationParams, FullyParams};
    use crate::shape::Shape3D;

    fn op(function: Activation, len: usize) -> ActivationOp {
        let params = Arc::new(Params::Activation(ActivationParams {
            shape: Shape3D::vector(len),
            function,
        }));
        ActivationOp::new(&OpKernelConstruction::new(params))
    }

    #[test]
    fn test_relu_forward() {
        let k = op(Activation::Relu, 6);
        let input = vec![vec![vec![-0.1, -0.2, 0.3, 0.4, 0.2, -0.5]]];
        let mut out = vec![tensor::zeros(1, 6)];
        let mut ctx = OpKernelContext::new(&input, &mut out, Backend::Internal);
        k.compute(&mut ctx).unwrap();
        assert_eq!(out[0][0], vec![0.0, 0.0, 0.3, 0.4, 0.2, 0.0]);
    }

    #[test]
    fn test_sigmoid_values() {
        let f = Activation::Sigmoid;
        assert!((f.forward(0.0) - 0.5).abs() < 1e-6);
        assert!((f.derivative(0.0, 0.5) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_tanh_derivative() {
        let f = Activation::Tanh;
        let y = f.forward(0.3);
        let expected = 1.0 / (0.3 as Scalar).cosh().powi(2);
        assert!((f.derivative(0.3, y) - expected).abs() < 1e-5);
    }

    #[test]
    fn test_relu_backward_masks() {
        let k = op(Activation::Relu, 3);
        let x = vec![vec![vec![-1.0, 0.5, 2.0]]];
        let y = vec![vec![vec![0.0, 0.5, 2.0]]];
        let dy = vec![vec![vec![1.0, 2.0, 3.0]]];
        let mut dx = vec![tensor::zeros(1, 3)];
        let mut ctx = OpKernelGradContext::new(&x, &y, &dy, &mut dx, Backend::Internal);
        k.compute_gradient(&mut ctx).unwrap();
        assert_eq!(dx[0][0], vec![0.0, 2.0, 3.0]);
    }

    #[test]
    fn test_wrong_params() {
        let params = Arc::new(Params::FullyConnected(FullyParams {
            in_size: 1,
            out_size: 1,
            has_bias: false,
        }));
        let k = ActivationOp::new(&OpKernelConstruction::new(params));
        let input = vec![vec![vec![1.0]]];
        let mut out = vec![tensor::zeros(1, 1)];
        let mut ctx = OpKernelContext::new(&input, &mut out, Backend::Internal);
        assert!(matches!(
            k.compute(&mut ctx),
            Err(Error::ParamsTypeMismatch {
                expected: OpKind::Activation,
                got: OpKind::FullyConnected
            })
        ));
    }

    #[test]
    fn test_avx_rejected() {
        let k = op(Activation::Tanh, 1);
        let input = vec![vec![vec![1.0]]];
        let mut out = vec![vec![vec![0.25]]];
        let mut ctx = OpKernelContext::new(&input, &mut out, Backend::Avx);
        assert!(matches!(
            k.compute(&mut ctx),
            Err(Error::UnsupportedBackend { .. })
        ));
        assert_eq!(out[0][0], vec![0.25]);
    }
}
