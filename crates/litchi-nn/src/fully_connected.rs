// Fully-connected — Dense layer: out = W·in + b
//
// Every output unit is connected to every input unit. The layer has three
// input slots and one output slot:
//
//   slot 0  data     in_size x 1 x 1
//   slot 1  weight   in_size x out_size x 1   (flat, W[c * out_size + i])
//   slot 2  bias     out_size x 1 x 1         (only with has_bias)
//
//   output  data     out_size x 1 x 1
//
// INITIALIZATION:
//
// Weights default to xavier with fan_in = in_size, fan_out = out_size, biases
// to the constant 0. Both can be replaced with `weight_init` / `bias_init`.

use litchi_core::backend::Backend;
use litchi_core::error::Result;
use litchi_core::graph::VectorType;
use litchi_core::params::{FullyParams, Params};
use litchi_core::shape::Shape3D;

use crate::layer::Layer;

impl Layer {
    /// A dense layer mapping `in_dim` inputs to `out_dim` outputs.
    ///
    /// # Examples
    /// ```ignore
    /// let mut graph = Graph::new();
    /// let mut fc = Layer::fully_connected(784, 128, true, Backend::Internal)?;
    /// let out = fc.forward_inputs(&mut graph, &[batch])?;
    /// ```
    pub fn fully_connected(
        in_dim: usize,
        out_dim: usize,
        has_bias: bool,
        backend: Backend,
    ) -> Result<Layer> {
        let params = Params::FullyConnected(FullyParams {
            in_size: in_dim,
            out_size: out_dim,
            has_bias,
        });
        let mut in_types = vec![VectorType::Data, VectorType::Weight];
        if has_bias {
            in_types.push(VectorType::Bias);
        }
        Layer::new(params, in_types, vec![VectorType::Data], backend)
    }
}

pub(crate) fn in_shape(p: &FullyParams) -> Vec<Shape3D> {
    let mut shapes = vec![
        Shape3D::vector(p.in_size),
        Shape3D::new(p.in_size, p.out_size, 1),
    ];
    if p.has_bias {
        shapes.push(Shape3D::vector(p.out_size));
    }
    shapes
}

pub(crate) fn out_shape(p: &FullyParams) -> Vec<Shape3D> {
    vec![Shape3D::vector(p.out_size)]
}
