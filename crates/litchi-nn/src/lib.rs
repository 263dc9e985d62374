//! # litchi-nn
//!
//! Layers and the machinery around them for litchi.
//!
//! 1. **Layer** — the shared lifecycle: wiring, setup, weight init, forward, backward
//! 2. **Fully-connected** — dense layer: `out = W·in + b`
//! 3. **Activations** — relu, sigmoid, tanh
//! 4. **Initializers** — xavier, lecun, he, gaussian, constant
//! 5. **Gradient check** — finite differences against the analytic backward pass
//! 6. **Sequential** — a chain of layers sharing one graph
//!
//! Layers do not own their data. Every buffer lives in an edge of a
//! [`litchi_core::Graph`], which is passed to each lifecycle call.

pub mod activation;
pub mod fully_connected;
pub mod gradcheck;
pub mod init;
pub mod layer;
pub mod sequential;

pub use gradcheck::{
    analytical_gradient, check_gradients, generate_test_data, numeric_gradient, GradCheckConfig,
    GradCheckReport, GradTrial,
};
pub use init::WeightInit;
pub use layer::{connect, Layer, LayerState};
pub use sequential::Sequential;
