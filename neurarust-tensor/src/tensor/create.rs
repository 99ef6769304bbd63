use super::Tensor;
use crate::error::NeuraRustError;
use crate::numeric::NeuraNumeric;

impl<T: NeuraNumeric> Tensor<T> {
    /// Creates a tensor of the given shape filled with `value`.
    pub fn full(shape: &[usize], value: T) -> Self {
        let numel: usize = shape.iter().product();
        Tensor {
            data: vec![value; numel],
            shape: shape.to_vec(),
        }
    }

    /// Creates a tensor of the given shape filled with zeros.
    pub fn zeros(shape: &[usize]) -> Self {
        Self::full(shape, T::zero())
    }

    /// Creates a tensor of the given shape filled with ones.
    pub fn ones(shape: &[usize]) -> Self {
        Self::full(shape, T::one())
    }

    /// Creates a zero tensor with the same shape as `other`.
    pub fn zeros_like(other: &Tensor<T>) -> Self {
        Self::zeros(&other.shape)
    }

    /// Creates a rank-1 tensor from a vector.
    pub fn vector(data: Vec<T>) -> Self {
        let len = data.len();
        Tensor {
            data,
            shape: vec![len],
        }
    }

    /// Creates a `[rows, cols]` tensor from row-major data.
    pub fn matrix(rows: usize, cols: usize, data: Vec<T>) -> Result<Self, NeuraRustError> {
        Self::new(data, vec![rows, cols])
    }

    /// Creates a tensor from `f64` literals, converting each to `T`.
    ///
    /// Mostly useful for fixtures and for decoding serialized records.
    pub fn from_f64(data: &[f64], shape: Vec<usize>) -> Result<Self, NeuraRustError> {
        Self::new(data.iter().map(|&v| T::from_f64_lossy(v)).collect(), shape)
    }

    /// Returns the contents widened to `f64`.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        self.data.iter().map(|v| v.to_f64_lossless()).collect()
    }
}

/// Creates a tensor of the given shape filled with zeros.
pub fn zeros<T: NeuraNumeric>(shape: &[usize]) -> Tensor<T> {
    Tensor::zeros(shape)
}

/// Creates a tensor of the given shape filled with ones.
pub fn ones<T: NeuraNumeric>(shape: &[usize]) -> Tensor<T> {
    Tensor::ones(shape)
}

/// Creates a tensor of the given shape filled with `value`.
pub fn full<T: NeuraNumeric>(shape: &[usize], value: T) -> Tensor<T> {
    Tensor::full(shape, value)
}
