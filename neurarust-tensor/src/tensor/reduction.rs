use super::Tensor;
use crate::error::NeuraRustError;
use crate::numeric::NeuraNumeric;

impl<T: NeuraNumeric> Tensor<T> {
    /// Sum of all elements.
    pub fn sum(&self) -> T {
        self.data.iter().copied().sum()
    }

    /// Mean of all elements (zero for an empty tensor).
    pub fn mean(&self) -> T {
        if self.data.is_empty() {
            return T::zero();
        }
        self.sum() / T::from_f64_lossy(self.data.len() as f64)
    }

    /// Population variance of all elements.
    pub fn variance(&self) -> T {
        if self.data.is_empty() {
            return T::zero();
        }
        let mean = self.mean();
        let n = T::from_f64_lossy(self.data.len() as f64);
        self.data.iter().map(|&x| (x - mean) * (x - mean)).sum::<T>() / n
    }

    /// Largest element (negative infinity for an empty tensor).
    pub fn max(&self) -> T {
        self.data.iter().copied().fold(T::neg_infinity(), T::max)
    }

    /// Smallest element (positive infinity for an empty tensor).
    pub fn min(&self) -> T {
        self.data.iter().copied().fold(T::infinity(), T::min)
    }

    /// Sum of squares.
    pub fn square_sum(&self) -> T {
        self.data.iter().map(|&x| x * x).sum()
    }

    /// Column sums of a matrix, returned as a vector of length `cols`.
    pub fn sum_rows(&self) -> Result<Tensor<T>, NeuraRustError> {
        let (_, cols) = self.expect_matrix("sum_rows")?;
        let mut out = vec![T::zero(); cols];
        for row in self.data.chunks(cols.max(1)) {
            out.iter_mut().zip(row.iter()).for_each(|(o, &x)| *o += x);
        }
        Ok(Tensor::vector(out))
    }

    /// Row sums of a matrix, returned as a vector of length `rows`.
    pub fn sum_cols(&self) -> Result<Tensor<T>, NeuraRustError> {
        let (rows, cols) = self.expect_matrix("sum_cols")?;
        if cols == 0 {
            return Ok(Tensor::zeros(&[rows]));
        }
        Ok(Tensor::vector(
            self.data.chunks(cols).map(|row| row.iter().copied().sum()).collect(),
        ))
    }

    /// Index of the largest element of each row of a matrix.
    pub fn argmax_rows(&self) -> Result<Vec<usize>, NeuraRustError> {
        let (_, cols) = self.expect_matrix("argmax_rows")?;
        if cols == 0 {
            return Ok(Vec::new());
        }
        Ok(self
            .data
            .chunks(cols)
            .map(|row| {
                row.iter()
                    .enumerate()
                    .fold((0, T::neg_infinity()), |(best, best_val), (i, &v)| {
                        if v > best_val {
                            (i, v)
                        } else {
                            (best, best_val)
                        }
                    })
                    .0
            })
            .collect())
    }
}

#[cfg(test)]
#[path = "reduction_test.rs"]
mod tests;
