// Activation layers — relu, sigmoid and tanh
//
// One input and one output slot of the same shape (width x height x depth).
// The layer has no weights, so initialization is a no-op apart from marking
// the layer initialized.

use litchi_core::backend::Backend;
use litchi_core::error::Result;
use litchi_core::graph::VectorType;
use litchi_core::kernels::Activation;
use litchi_core::params::{ActivationParams, Params};
use litchi_core::shape::Shape3D;

use crate::layer::Layer;

impl Layer {
    /// An elementwise activation over samples of `width x height x depth`.
    pub fn activation(
        function: Activation,
        width: usize,
        height: usize,
        depth: usize,
        backend: Backend,
    ) -> Result<Layer> {
        let params = Params::Activation(ActivationParams {
            shape: Shape3D::new(width, height, depth),
            function,
        });
        Layer::new(params, vec![VectorType::Data], vec![VectorType::Data], backend)
    }

    pub fn relu(width: usize, height: usize, depth: usize) -> Result<Layer> {
        Layer::activation(Activation::Relu, width, height, depth, Backend::default_engine())
    }

    pub fn sigmoid(width: usize, height: usize, depth: usize) -> Result<Layer> {
        Layer::activation(Activation::Sigmoid, width, height, depth, Backend::default_engine())
    }

    pub fn tanh(width: usize, height: usize, depth: usize) -> Result<Layer> {
        Layer::activation(Activation::Tanh, width, height, depth, Backend::default_engine())
    }
}

pub(crate) fn in_shape(p: &ActivationParams) -> Vec<Shape3D> {
    vec![p.shape]
}

pub(crate) fn out_shape(p: &ActivationParams) -> Vec<Shape3D> {
    vec![p.shape]
}

#[cfg(test)]
mod tests {
    use super::*;
    use litchi_core::graph::Graph;

    #[test]
    fn test_relu_layer_shapes() {
        let l = Layer::relu(3, 3, 10).unwrap();
        assert_eq!(l.in_shape(), vec![Shape3D::new(3, 3, 10)]);
        assert_eq!(l.out_shape(), vec![Shape3D::new(3, 3, 10)]);
        assert_eq!(l.layer_type(), "relu");
        assert_eq!(l.in_channels(), 1);
    }

    #[test]
    fn test_tanh_forward_backward() {
        let mut g = Graph::new();
        let mut l = Layer::tanh(2, 1, 1).unwrap();
        let out = l.forward_inputs(&mut g, &[vec![vec![0.0, 1.0]]]).unwrap();
        assert_eq!(out[0][0][0], 0.0);
        let y = out[0][0][1];
        assert!((y - (1.0 as litchi_core::Scalar).tanh()).abs() < 1e-6);

        let out_edge = l.out_edge(0).unwrap();
        g.edge_mut(out_edge)
            .unwrap()
            .write_gradient(&vec![vec![1.0, 1.0]])
            .unwrap();
        l.backward(&mut g).unwrap();
        let dx = &g.edge(l.in_edge(0).unwrap()).unwrap().gradient()[0];
        assert!((dx[0] - 1.0).abs() < 1e-6);
        assert!((dx[1] - (1.0 - y * y)).abs() < 1e-6);
    }

    #[test]
    fn test_setup_without_weights() {
        let mut g = Graph::new();
        let mut l = Layer::sigmoid(4, 1, 1).unwrap();
        l.setup(&mut g, false).unwrap();
        assert!(l.is_initialized());
        // only the output edge was allocated
        assert_eq!(g.len(), 1);
    }
}
