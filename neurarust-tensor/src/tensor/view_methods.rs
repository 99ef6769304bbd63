use super::Tensor;
use crate::error::NeuraRustError;
use crate::numeric::NeuraNumeric;

impl<T: NeuraNumeric> Tensor<T> {
    /// Resizes the tensor in place.
    ///
    /// If the element count is unchanged the data is kept and only the shape
    /// changes. Otherwise the buffer is truncated or zero-extended: existing
    /// leading elements survive, so growing the batch dimension of a
    /// row-major tensor keeps the rows that were already there.
    pub fn resize(&mut self, shape: &[usize]) {
        let numel: usize = shape.iter().product();
        if numel != self.data.len() {
            log::trace!("resizing tensor {:?} -> {:?}", self.shape, shape);
        }
        self.data.resize(numel, T::zero());
        self.shape = shape.to_vec();
    }

    /// Resizes only the leading dimension, keeping the feature shape.
    pub fn resize_dim0(&mut self, rows: usize) {
        let mut shape = self.shape.clone();
        if shape.is_empty() {
            shape.push(rows);
        } else {
            shape[0] = rows;
        }
        self.resize(&shape);
    }

    /// Reinterprets the buffer with a new shape of the same size.
    pub fn reshape(&mut self, shape: &[usize]) -> Result<(), NeuraRustError> {
        let numel: usize = shape.iter().product();
        if numel != self.data.len() {
            return Err(NeuraRustError::TensorCreationError {
                data_len: self.data.len(),
                shape: shape.to_vec(),
            });
        }
        self.shape = shape.to_vec();
        Ok(())
    }

    /// Returns a reshaped copy.
    pub fn reshaped(&self, shape: &[usize]) -> Result<Tensor<T>, NeuraRustError> {
        let mut out = self.clone();
        out.reshape(shape)?;
        Ok(out)
    }

    /// Borrows entry `index` of the leading dimension as a flat slice.
    pub fn slice0(&self, index: usize) -> Result<&[T], NeuraRustError> {
        let (start, end) = self.range0(index)?;
        Ok(&self.data[start..end])
    }

    /// Mutably borrows entry `index` of the leading dimension. Writes are
    /// visible in `self`.
    pub fn slice0_mut(&mut self, index: usize) -> Result<&mut [T], NeuraRustError> {
        let (start, end) = self.range0(index)?;
        Ok(&mut self.data[start..end])
    }

    fn range0(&self, index: usize) -> Result<(usize, usize), NeuraRustError> {
        let rows = self.shape.first().copied().unwrap_or(0);
        if index >= rows {
            return Err(NeuraRustError::IndexOutOfBounds {
                index: vec![index],
                shape: self.shape.clone(),
            });
        }
        let stride = self.stride0();
        Ok((index * stride, (index + 1) * stride))
    }

    /// Copies entry `index` of the leading dimension into a new tensor of
    /// shape `feature_shape()`.
    pub fn select(&self, index: usize) -> Result<Tensor<T>, NeuraRustError> {
        let slice = self.slice0(index)?;
        Ok(Tensor {
            data: slice.to_vec(),
            shape: self.feature_shape().to_vec(),
        })
    }

    /// Overwrites entry `index` of the leading dimension with `src`.
    pub fn set_select(&mut self, index: usize, src: &Tensor<T>) -> Result<(), NeuraRustError> {
        let feature_shape = self.feature_shape().to_vec();
        if src.shape != feature_shape {
            return Err(NeuraRustError::shape_mismatch(&feature_shape, &src.shape, "set_select"));
        }
        self.slice0_mut(index)?.copy_from_slice(&src.data);
        Ok(())
    }

    /// Copies `len` entries of the leading dimension starting at `start`.
    pub fn narrow0(&self, start: usize, len: usize) -> Result<Tensor<T>, NeuraRustError> {
        let rows = self.shape.first().copied().unwrap_or(0);
        if start + len > rows {
            return Err(NeuraRustError::IndexOutOfBounds {
                index: vec![start + len],
                shape: self.shape.clone(),
            });
        }
        let stride = self.stride0();
        let mut shape = self.shape.clone();
        shape[0] = len;
        Ok(Tensor {
            data: self.data[start * stride..(start + len) * stride].to_vec(),
            shape,
        })
    }

    /// Copies the column range `[start, start + len)` of a matrix.
    pub fn narrow_cols(&self, start: usize, len: usize) -> Result<Tensor<T>, NeuraRustError> {
        let (rows, cols) = self.expect_matrix("narrow_cols")?;
        if start + len > cols {
            return Err(NeuraRustError::IndexOutOfBounds {
                index: vec![0, start + len],
                shape: self.shape.clone(),
            });
        }
        let mut data = Vec::with_capacity(rows * len);
        for row in self.data.chunks(cols) {
            data.extend_from_slice(&row[start..start + len]);
        }
        Ok(Tensor {
            data,
            shape: vec![rows, len],
        })
    }

    /// Writes `src` (a `[rows, len]` matrix) into the column range starting at
    /// `start`.
    pub fn set_cols(&mut self, start: usize, src: &Tensor<T>) -> Result<(), NeuraRustError> {
        let (rows, cols) = self.expect_matrix("set_cols")?;
        let (src_rows, len) = src.expect_matrix("set_cols")?;
        if src_rows != rows || start + len > cols {
            return Err(NeuraRustError::shape_mismatch(
                &[rows, cols - start.min(cols)],
                &src.shape,
                "set_cols",
            ));
        }
        for (dst, row) in self.data.chunks_mut(cols).zip(src.data.chunks(len.max(1))) {
            dst[start..start + len].copy_from_slice(&row[..len]);
        }
        Ok(())
    }

    /// Returns the transpose of a matrix.
    pub fn transpose(&self) -> Result<Tensor<T>, NeuraRustError> {
        let (rows, cols) = self.expect_matrix("transpose")?;
        let mut data = vec![T::zero(); rows * cols];
        for r in 0..rows {
            for c in 0..cols {
                data[c * rows + r] = self.data[r * cols + c];
            }
        }
        Ok(Tensor {
            data,
            shape: vec![cols, rows],
        })
    }
}

#[cfg(test)]
#[path = "view_methods_test.rs"]
mod tests;
