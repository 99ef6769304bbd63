use thiserror::Error;

/// Custom error type for the NeuraRust framework.
///
/// Every fallible operation in the tensor and network crates returns this
/// type. None of the variants are recoverable inside the library: they are
/// raised at the point of violation and propagated to the caller.
#[derive(Error, Debug, PartialEq, Clone)]
pub enum NeuraRustError {
    #[error("Shape mismatch: expected {expected:?}, got {actual:?} during operation {operation}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
        operation: String,
    },

    #[error("Tensor creation error: data length {data_len} does not match shape {shape:?}")]
    TensorCreationError { data_len: usize, shape: Vec<usize> },

    #[error("Index out of bounds: index {index:?} for shape {shape:?}")]
    IndexOutOfBounds {
        index: Vec<usize>,
        shape: Vec<usize>,
    },

    /// A structural operation the module's contract forbids.
    #[error("Usage error: {0}")]
    UsageError(String),

    /// A value outside the domain an operation accepts (e.g. a negative class index).
    #[error("Numeric domain error: {0}")]
    NumericDomainError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl NeuraRustError {
    /// Shorthand used by shape checks throughout the workspace.
    pub fn shape_mismatch(expected: &[usize], actual: &[usize], operation: &str) -> Self {
        NeuraRustError::ShapeMismatch {
            expected: expected.to_vec(),
            actual: actual.to_vec(),
            operation: operation.to_string(),
        }
    }
}

impl From<serde_json::Error> for NeuraRustError {
    fn from(err: serde_json::Error) -> Self {
        NeuraRustError::SerializationError(err.to_string())
    }
}
