use crate::backend::Backend;
use crate::graph::EdgeId;
use crate::params::OpKind;
use crate::shape::Shape3D;

/// All errors that can occur within litchi.
///
/// Every failure is detected close to where it happens and returned to the
/// immediate caller. Nothing is retried: the core is purely computational, so
/// there is no such thing as a transient failure.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A layer's declared shapes disagree with its number of edge slots.
    #[error("connection mismatch: layer declares {declared} {side} shape(s) but has {slots} {side} slot(s)")]
    ConnectionMismatch {
        side: &'static str,
        declared: usize,
        slots: usize,
    },

    /// Two layers were wired together with incompatible shapes.
    #[error("cannot connect output of shape {from} to input of shape {to}")]
    IncompatibleConnection { from: Shape3D, to: Shape3D },

    /// A kernel was asked to run on a backend it does not implement.
    #[error("backend `{backend}` is not supported by the {op} kernel")]
    UnsupportedBackend { op: OpKind, backend: Backend },

    /// A kernel received parameters for a different operator.
    #[error("params type mismatch: kernel expects {expected} params, got {got}")]
    ParamsTypeMismatch { expected: OpKind, got: OpKind },

    /// Per-sample length of a tensor disagrees with the declared shape.
    #[error("shape inconsistency in {what}: expected {expected} elements per sample, got {got}")]
    ShapeInconsistency {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    /// Slot, edge or element index past the end.
    #[error("{what} index {index} out of range (len {len})")]
    IndexOutOfRange {
        what: &'static str,
        index: usize,
        len: usize,
    },

    /// An edge handle that does not belong to this graph.
    #[error("unknown edge {0}")]
    UnknownEdge(EdgeId),

    /// Wrong number of external input tensors for a layer.
    #[error("input count mismatch: expected {expected} data input(s), got {got}")]
    InputCountMismatch { expected: usize, got: usize },

    /// Generic message for cases not covered above.
    #[error("{0}")]
    Msg(String),
}

impl Error {
    /// Create an error from any string message.
    pub fn msg(s: impl Into<String>) -> Self {
        Error::Msg(s.into())
    }
}

/// Convenience Result type used throughout litchi.
pub type Result<T> = std::result::Result<T, Error>;

/// Early return with a formatted error message.
/// Usage: `bail!("unknown backend: {}", name)`
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::Error::Msg(format!($($arg)*)))
    };
}
