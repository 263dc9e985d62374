use std::fmt;

use crate::error::{Error, Result};
use crate::kernels::activation::Activation;
use crate::shape::Shape3D;

// Params — Per-operator configuration
//
// A kernel is built from a Params value and reads it on every compute. Params
// is a closed sum type over operator kinds, so a kernel that expects
// fully-connected params pattern-matches for them and reports
// `ParamsTypeMismatch` when handed anything else.

/// Operator kinds known to the kernel registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    FullyConnected,
    Activation,
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OpKind::FullyConnected => "fully-connected",
            OpKind::Activation => "activation",
        };
        write!(f, "{}", s)
    }
}

/// Parameters of a fully-connected (dense) operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FullyParams {
    pub in_size: usize,
    pub out_size: usize,
    pub has_bias: bool,
}

/// Parameters of an elementwise activation operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivationParams {
    pub shape: Shape3D,
    pub function: Activation,
}

/// Configuration record for one operator.
#[derive(Debug, Clone, PartialEq)]
pub enum Params {
    FullyConnected(FullyParams),
    Activation(ActivationParams),
}

impl Params {
    pub fn kind(&self) -> OpKind {
        match self {
            Params::FullyConnected(_) => OpKind::FullyConnected,
            Params::Activation(_) => OpKind::Activation,
        }
    }

    /// The fully-connected params, or `ParamsTypeMismatch`.
    pub fn fully(&self) -> Result<&FullyParams> {
        match self {
            Params::FullyConnected(p) => Ok(p),
            other => Err(Error::ParamsTypeMismatch {
                expected: OpKind::FullyConnected,
                got: other.kind(),
            }),
        }
    }

    /// The activation params, or `ParamsTypeMismatch`.
    pub fn activation(&self) -> Result<&ActivationParams> {
        match self {
            Params::Activation(p) => Ok(p),
            other => Err(Error::ParamsTypeMismatch {
                expected: OpKind::Activation,
                got: other.kind(),
            }),
        }
    }
}

impl From<FullyParams> for Params {
    fn from(p: FullyParams) -> Self {
        Params::FullyConnected(p)
    }
}

impl From<ActivationParams> for Params {
    fn from(p: ActivationParams) -> Self {
        Params::Activation(p)
    }
}
