use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use log::debug;

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::kernels::activation::ActivationOp;
use crate::kernels::fully_connected::FullyConnectedOp;
use crate::params::{OpKind, Params};
use crate::tensor::Tensor;

// Kernel framework — Separating "which operator" from "which layer" and
// "which backend"
//
// A layer owns one kernel, built once from an OpKernelConstruction that
// carries the layer's Params. For every forward pass the layer wraps its
// input and output tensors in an OpKernelContext together with its backend
// and calls `compute`; the backward pass does the same with an
// OpKernelGradContext and `compute_gradient`.
//
// The contexts only borrow tensors. They never own or resize them; sizing is
// the layer's job before it calls into the kernel.
//
// REGISTRY:
//
//   Kernels are created through a KernelRegistry keyed on (OpKind, Backend).
//   Asking for a pair with no registered factory is an UnsupportedBackend
//   error at layer construction time.

/// What a kernel is built from.
#[derive(Debug, Clone)]
pub struct OpKernelConstruction {
    params: Arc<Params>,
}

impl OpKernelConstruction {
    pub fn new(params: Arc<Params>) -> Self {
        OpKernelConstruction { params }
    }

    pub fn params(&self) -> &Arc<Params> {
        &self.params
    }
}

/// Tensors and backend for one forward compute.
pub struct OpKernelContext<'a> {
    in_data: &'a [Tensor],
    out_data: &'a mut [Tensor],
    backend: Backend,
}

impl<'a> OpKernelContext<'a> {
    pub fn new(in_data: &'a [Tensor], out_data: &'a mut [Tensor], backend: Backend) -> Self {
        OpKernelContext {
            in_data,
            out_data,
            backend,
        }
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn input_count(&self) -> usize {
        self.in_data.len()
    }

    pub fn input(&self, idx: usize) -> Result<&'a Tensor> {
        let in_data: &'a [Tensor] = self.in_data;
        in_data.get(idx).ok_or(Error::IndexOutOfRange {
            what: "kernel input",
            index: idx,
            len: in_data.len(),
        })
    }

    pub fn output(&mut self, idx: usize) -> Result<&mut Tensor> {
        let len = self.out_data.len();
        self.out_data.get_mut(idx).ok_or(Error::IndexOutOfRange {
            what: "kernel output",
            index: idx,
            len,
        })
    }
}

/// Tensors and backend for one backward compute.
pub struct OpKernelGradContext<'a> {
    in_data: &'a [Tensor],
    out_data: &'a [Tensor],
    out_grad: &'a [Tensor],
    in_grad: &'a mut [Tensor],
    backend: Backend,
}

impl<'a> OpKernelGradContext<'a> {
    pub fn new(
        in_data: &'a [Tensor],
        out_data: &'a [Tensor],
        out_grad: &'a [Tensor],
        in_grad: &'a mut [Tensor],
        backend: Backend,
    ) -> Self {
        OpKernelGradContext {
            in_data,
            out_data,
            out_grad,
            in_grad,
            backend,
        }
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn input(&self, idx: usize) -> Result<&'a Tensor> {
        lookup(self.in_data, idx, "kernel input")
    }

    pub fn output(&self, idx: usize) -> Result<&'a Tensor> {
        lookup(self.out_data, idx, "kernel output")
    }

    pub fn output_grad(&self, idx: usize) -> Result<&'a Tensor> {
        lookup(self.out_grad, idx, "kernel output gradient")
    }

    /// All input gradients at once, so a kernel can write several of them.
    pub fn input_grads_mut(&mut self) -> &mut [Tensor] {
        &mut *self.in_grad
    }
}

fn lookup<'a>(tensors: &'a [Tensor], idx: usize, what: &'static str) -> Result<&'a Tensor> {
    tensors.get(idx).ok_or(Error::IndexOutOfRange {
        what,
        index: idx,
        len: tensors.len(),
    })
}

/// An operator implementation bound to one Params value.
pub trait OpKernel: fmt::Debug + Send + Sync {
    /// The params this kernel was built with.
    fn params(&self) -> &Params;

    /// Forward pass: fill the context's outputs from its inputs.
    fn compute(&self, ctx: &mut OpKernelContext<'_>) -> Result<()>;

    /// Backward pass: fill the input gradients from the output gradients.
    fn compute_gradient(&self, ctx: &mut OpKernelGradContext<'_>) -> Result<()>;
}

/// Builds a kernel from its construction record.
pub type KernelFactory = fn(&OpKernelConstruction) -> Box<dyn OpKernel>;

/// Maps (operator, backend) pairs to kernel factories.
#[derive(Default)]
pub struct KernelRegistry {
    factories: HashMap<(OpKind, Backend), KernelFactory>,
}

impl fmt::Debug for KernelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.factories.keys().collect();
        keys.sort_by_key(|(op, be)| (op.to_string(), be.name()));
        f.debug_struct("KernelRegistry").field("kernels", &keys).finish()
    }
}

impl KernelRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every kernel shipped in this crate.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(OpKind::FullyConnected, Backend::Internal, |ctx| -> Box<dyn OpKernel> {
            Box::new(FullyConnectedOp::new(ctx))
        });
        registry.register(OpKind::Activation, Backend::Internal, |ctx| -> Box<dyn OpKernel> {
            Box::new(ActivationOp::new(ctx))
        });
        registry
    }

    /// Shared instance of [`KernelRegistry::with_builtin`].
    pub fn builtin() -> &'static KernelRegistry {
        static BUILTIN: OnceLock<KernelRegistry> = OnceLock::new();
        BUILTIN.get_or_init(KernelRegistry::with_builtin)
    }

    /// Register (or replace) the factory for `op` on `backend`.
    pub fn register(&mut self, op: OpKind, backend: Backend, factory: KernelFactory) {
        self.factories.insert((op, backend), factory);
    }

    pub fn supports(&self, op: OpKind, backend: Backend) -> bool {
        self.factories.contains_key(&(op, backend))
    }

    /// Build the kernel for `ctx`'s params on `backend`.
    pub fn create(&self, ctx: &OpKernelConstruction, backend: Backend) -> Result<Box<dyn OpKernel>> {
        let op = ctx.params().kind();
        let factory = self
            .factories
            .get(&(op, backend))
            .ok_or(Error::UnsupportedBackend { op, backend })?;
        debug!("creating {} kernel on backend {}", op, backend);
        Ok(factory(ctx))
    }
}
