//! Built-in operator kernels.
//!
//! Each kernel is a thin [`OpKernel`](crate::kernel::OpKernel) wrapper that
//! checks params, shapes and backend, then hands the numbers to a pure free
//! function.

pub mod activation;
pub mod fully_connected;

pub use activation::{Activation, ActivationOp};
pub use fully_connected::FullyConnectedOp;
