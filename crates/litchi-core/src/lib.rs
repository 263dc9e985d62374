//! # litchi-core
//!
//! Core data model and operator dispatch for litchi.
//!
//! This crate provides:
//! - [`Scalar`], [`Vector`], [`Tensor`] — batched numeric data
//! - [`Shape3D`] — width x height x depth sample layout
//! - [`Graph`], [`Node`], [`Edge`] — the edge arena shared between layers
//! - [`Backend`], [`Params`] — execution engine and operator configuration
//! - [`OpKernel`] / [`KernelRegistry`] — kernel construction and dispatch
//! - [`Random`] — explicit seeded random source
// - Scalar: compile-time precision (f32, or f64 with the "f64" feature)
// - Tensor: Vec<Vec<Scalar>>, one vector per sample, growth-only
// - Graph: edges addressed by EdgeId, lazily created by nodes
// - Kernel: OpKernelConstruction / OpKernelContext / KernelRegistry

pub mod backend;
pub mod error;
pub mod graph;
pub mod kernel;
pub mod kernels;
pub mod params;
pub mod random;
pub mod scalar;
pub mod shape;
pub mod tensor;

pub use backend::Backend;
pub use error::{Error, Result};
pub use graph::{Edge, EdgeId, Graph, Node, NodeId, VectorType};
pub use kernel::{
    KernelFactory, KernelRegistry, OpKernel, OpKernelConstruction, OpKernelContext,
    OpKernelGradContext,
};
pub use kernels::Activation;
pub use params::{ActivationParams, FullyParams, OpKind, Params};
pub use random::Random;
pub use scalar::{Precision, Scalar};
pub use shape::Shape3D;
pub use tensor::{Tensor, Vector};
