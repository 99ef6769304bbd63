// src/tensor/mod.rs

use crate::error::NeuraRustError;
use crate::numeric::NeuraNumeric;
use std::ops::{Index, IndexMut};

pub mod create;
mod debug;
mod elementwise;
mod reduction;
pub mod utils;
mod view_methods;

pub use utils::{flatten, unflatten_into};

/// A dense, row-major, N-dimensional array.
///
/// A `Tensor` exclusively owns its buffer. Cloning performs a deep copy, so
/// two tensors never share storage behind the caller's back. Zero-copy access
/// to a sub-range is done by *borrowing*: [`Tensor::slice0`] and
/// [`Tensor::slice0_mut`] hand out `&[T]` / `&mut [T]` views over one entry of
/// the leading dimension, and writes through a mutable view land directly in
/// the source buffer. Operations that need a non-contiguous region (column
/// ranges, transposes) copy into a fresh tensor instead.
///
/// Invariant: `self.size() == self.shape().iter().product()`.
#[derive(Clone, PartialEq)]
pub struct Tensor<T> {
    pub(crate) data: Vec<T>,
    pub(crate) shape: Vec<usize>,
}

impl<T: NeuraNumeric> Tensor<T> {
    /// Creates a new tensor from row-major data and a shape.
    ///
    /// # Errors
    /// Returns `NeuraRustError::TensorCreationError` if the length of `data`
    /// does not match the number of elements implied by `shape`.
    pub fn new(data: Vec<T>, shape: Vec<usize>) -> Result<Self, NeuraRustError> {
        let numel: usize = shape.iter().product();
        if data.len() != numel {
            return Err(NeuraRustError::TensorCreationError {
                data_len: data.len(),
                shape,
            });
        }
        Ok(Tensor { data, shape })
    }

    /// The empty tensor (shape `[0]`), which is what every module cache holds
    /// before its first forward/backward call.
    pub fn empty() -> Self {
        Tensor {
            data: Vec::new(),
            shape: vec![0],
        }
    }

    /// Returns the shape of the tensor.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Number of dimensions.
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Size of dimension `dim`.
    pub fn dim(&self, dim: usize) -> Result<usize, NeuraRustError> {
        self.shape
            .get(dim)
            .copied()
            .ok_or_else(|| NeuraRustError::IndexOutOfBounds {
                index: vec![dim],
                shape: self.shape.clone(),
            })
    }

    /// Total number of elements.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Row-major contents.
    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Consumes the tensor and returns its buffer.
    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    /// Shape with the leading (batch) dimension removed.
    pub fn feature_shape(&self) -> &[usize] {
        if self.shape.is_empty() {
            &[]
        } else {
            &self.shape[1..]
        }
    }

    /// Number of elements per entry of the leading dimension.
    pub fn stride0(&self) -> usize {
        self.feature_shape().iter().product()
    }

    /// Reads a single element of a rank-2 tensor.
    pub fn at2(&self, row: usize, col: usize) -> Result<T, NeuraRustError> {
        let offset = self.offset2(row, col)?;
        Ok(self.data[offset])
    }

    /// Writes a single element of a rank-2 tensor.
    pub fn set2(&mut self, row: usize, col: usize, value: T) -> Result<(), NeuraRustError> {
        let offset = self.offset2(row, col)?;
        self.data[offset] = value;
        Ok(())
    }

    fn offset2(&self, row: usize, col: usize) -> Result<usize, NeuraRustError> {
        if self.shape.len() != 2 || row >= self.shape[0] || col >= self.shape[1] {
            return Err(NeuraRustError::IndexOutOfBounds {
                index: vec![row, col],
                shape: self.shape.clone(),
            });
        }
        Ok(row * self.shape[1] + col)
    }

    /// Checks that the tensor has exactly the given shape.
    pub fn expect_shape(&self, expected: &[usize], operation: &str) -> Result<(), NeuraRustError> {
        if self.shape != expected {
            return Err(NeuraRustError::shape_mismatch(expected, &self.shape, operation));
        }
        Ok(())
    }

    /// Checks that the tensor is a matrix and returns `(rows, cols)`.
    pub fn expect_matrix(&self, operation: &str) -> Result<(usize, usize), NeuraRustError> {
        match self.shape.as_slice() {
            [rows, cols] => Ok((*rows, *cols)),
            other => Err(NeuraRustError::ShapeMismatch {
                expected: vec![0, 0],
                actual: other.to_vec(),
                operation: format!("{} (expected a rank-2 tensor)", operation),
            }),
        }
    }

    /// Element-wise comparison within an absolute tolerance.
    pub fn all_close(&self, other: &Tensor<T>, tolerance: T) -> bool {
        self.shape == other.shape
            && self
                .data
                .iter()
                .zip(other.data.iter())
                .all(|(a, b)| (*a - *b).abs() <= tolerance)
    }
}

impl<T: NeuraNumeric> Default for Tensor<T> {
    fn default() -> Self {
        Tensor::empty()
    }
}

impl<T> Index<usize> for Tensor<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        &self.data[index]
    }
}

impl<T> IndexMut<usize> for Tensor<T> {
    fn index_mut(&mut self, index: usize) -> &mut T {
        &mut self.data[index]
    }
}

#[cfg(test)]
#[path = "tensor_test.rs"]
mod tests;
