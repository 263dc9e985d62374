//! # Litchi
//!
//! A small computational-graph engine for feed-forward neural network layers.
//!
//! This is the top-level facade crate that re-exports everything you need.
//!
//! ## Usage
//!
//! ```rust
//! use litchi::prelude::*;
//!
//! # fn main() -> litchi::Result<()> {
//! let mut graph = Graph::new();
//! let mut fc = Layer::fully_connected(4, 2, true, Backend::Internal)?
//!     .weight_init(WeightInit::constant(1.0))
//!     .bias_init(WeightInit::constant(0.5));
//! let out = fc.forward_inputs(&mut graph, &[vec![vec![0.0, 1.0, 2.0, 3.0]]])?;
//! assert_eq!(out[0][0], vec![6.5, 6.5]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! | Crate | Purpose |
//! |-------|----------|
//! | `litchi-core` | Scalar, Shape3D, Tensor, Graph/Node/Edge, Params, Backend, kernels |
//! | `litchi-nn` | Layer lifecycle, fully-connected and activation layers, initializers, gradient check, Sequential |

/// Re-export core types.
pub use litchi_core::{
    Activation, ActivationParams, Backend, Edge, EdgeId, Error, FullyParams, Graph, KernelFactory,
    KernelRegistry, Node, NodeId, OpKernel, OpKernelConstruction, OpKernelContext,
    OpKernelGradContext, OpKind, Params, Precision, Random, Result, Scalar, Shape3D, Tensor,
    Vector, VectorType,
};

/// Re-export the built-in kernels, for registering them under other keys.
pub use litchi_core::kernels;

/// Re-export the raw tensor helpers and scalar constants.
pub mod tensor {
    pub use litchi_core::scalar::{finite_difference_step, gradient_tolerance};
    pub use litchi_core::tensor::*;
}

/// Re-export layers, initializers and the gradient check.
pub mod nn {
    pub use litchi_nn::*;
}

/// Prelude: import this for the most common types.
pub mod prelude {
    pub use crate::nn::{
        analytical_gradient, check_gradients, generate_test_data, numeric_gradient,
        GradCheckConfig, GradCheckReport,
    };
    pub use crate::nn::{Layer, LayerState, Sequential, WeightInit};
    pub use crate::{
        Activation, Backend, Error, Graph, Random, Result, Scalar, Shape3D, Tensor, Vector,
        VectorType,
    };
}
