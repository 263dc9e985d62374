use std::fmt;
use std::str::FromStr;

use crate::error::Error;

// Backend — Which engine executes an operator kernel
//
// A layer picks its backend once, at construction. The kernel reads it back
// from the context on every compute and branches on it. Only `Internal`
// (plain sequential Rust loops) has kernels today; `Avx` is a recognized
// selector so configuration can name it, but every kernel rejects it with
// `Error::UnsupportedBackend` instead of silently falling back.

/// Execution engine selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Portable scalar loops.
    #[default]
    Internal,
    /// Hand-vectorized kernels (not implemented).
    Avx,
}

impl Backend {
    /// The engine layers use when none is requested.
    pub fn default_engine() -> Self {
        Backend::Internal
    }

    pub fn name(&self) -> &'static str {
        match self {
            Backend::Internal => "internal",
            Backend::Avx => "avx",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Backend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "internal" => Ok(Backend::Internal),
            "avx" => Ok(Backend::Avx),
            other => Err(Error::msg(format!("unknown backend: {other}"))),
        }
    }
}
