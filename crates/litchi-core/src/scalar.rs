use std::fmt;

// Scalar — The numeric element type
//
// Every value in a litchi tensor has the same floating-point type. Unlike a
// per-tensor dtype, precision is chosen once for the whole build:
//
//   default        — Scalar = f32
//   feature "f64"  — Scalar = f64
//
// Anything that depends on precision (gradient-check tolerances, the finite
// difference step) is derived from this module so tests can be written once
// and run under both builds.

/// The floating-point element type used by every tensor.
#[cfg(not(feature = "f64"))]
pub type Scalar = f32;

/// The floating-point element type used by every tensor.
#[cfg(feature = "f64")]
pub type Scalar = f64;

/// Runtime description of the compiled-in scalar precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Precision {
    F32,
    F64,
}

impl Precision {
    /// The precision this crate was built with.
    pub const fn current() -> Self {
        if cfg!(feature = "f64") {
            Precision::F64
        } else {
            Precision::F32
        }
    }

    /// Size of one scalar in bytes.
    pub fn size_in_bytes(&self) -> usize {
        match self {
            Precision::F32 => 4,
            Precision::F64 => 8,
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Precision::F32 => "f32",
            Precision::F64 => "f64",
        };
        write!(f, "{}", s)
    }
}

/// Absolute tolerance for comparing a numeric gradient against an analytic one.
///
/// Single precision loses roughly four digits to the central difference, so
/// it gets a looser bound than double precision.
pub fn gradient_tolerance() -> Scalar {
    match Precision::current() {
        Precision::F32 => 1e-2,
        Precision::F64 => 1e-4,
    }
}

/// Step used for central differences: sqrt(machine epsilon).
pub fn finite_difference_step() -> Scalar {
    Scalar::EPSILON.sqrt()
}
