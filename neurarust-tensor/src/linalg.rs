//! BLAS-style kernels over row-major matrices.
//!
//! These are the only primitives the network layers use for products, so an
//! accelerated backend only has to replace this module. The naive loops here
//! accumulate in the tensor's own precision.

use crate::error::NeuraRustError;
use crate::numeric::NeuraNumeric;
use crate::tensor::Tensor;

/// Whether an operand is used as-is or transposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transpose {
    No,
    Yes,
}

fn op_dims(rows: usize, cols: usize, trans: Transpose) -> (usize, usize) {
    match trans {
        Transpose::No => (rows, cols),
        Transpose::Yes => (cols, rows),
    }
}

/// General matrix multiply: `C = alpha * op(A) * op(B) + beta * C`.
///
/// With `beta == 0` the previous contents of `C` are ignored (even NaNs).
///
/// # Errors
/// Returns `ShapeMismatch` if any operand is not a matrix or the inner/outer
/// dimensions disagree.
pub fn gemm<T: NeuraNumeric>(
    alpha: T,
    a: &Tensor<T>,
    trans_a: Transpose,
    b: &Tensor<T>,
    trans_b: Transpose,
    beta: T,
    c: &mut Tensor<T>,
) -> Result<(), NeuraRustError> {
    let (a_rows, a_cols) = a.expect_matrix("gemm lhs")?;
    let (b_rows, b_cols) = b.expect_matrix("gemm rhs")?;
    let (m, k) = op_dims(a_rows, a_cols, trans_a);
    let (k2, n) = op_dims(b_rows, b_cols, trans_b);
    if k != k2 {
        return Err(NeuraRustError::shape_mismatch(&[k, n], &[k2, n], "gemm inner dimension"));
    }
    c.expect_shape(&[m, n], "gemm output")?;

    let a_data = a.data();
    let b_data = b.data();
    let a_at = |i: usize, p: usize| match trans_a {
        Transpose::No => a_data[i * a_cols + p],
        Transpose::Yes => a_data[p * a_cols + i],
    };
    let b_at = |p: usize, j: usize| match trans_b {
        Transpose::No => b_data[p * b_cols + j],
        Transpose::Yes => b_data[j * b_cols + p],
    };

    let c_data = c.data_mut();
    for i in 0..m {
        for j in 0..n {
            let mut acc = T::zero();
            for p in 0..k {
                acc += a_at(i, p) * b_at(p, j);
            }
            let slot = &mut c_data[i * n + j];
            *slot = if beta == T::zero() {
                alpha * acc
            } else {
                alpha * acc + beta * *slot
            };
        }
    }
    Ok(())
}

/// Rank-1 update: `A += alpha * x * y^T`, with `A` shaped `[x.len(), y.len()]`.
pub fn ger<T: NeuraNumeric>(alpha: T, x: &[T], y: &[T], a: &mut Tensor<T>) -> Result<(), NeuraRustError> {
    a.expect_shape(&[x.len(), y.len()], "ger")?;
    let cols = y.len();
    let a_data = a.data_mut();
    for (i, &xi) in x.iter().enumerate() {
        let scaled = alpha * xi;
        for (j, &yj) in y.iter().enumerate() {
            a_data[i * cols + j] += scaled * yj;
        }
    }
    Ok(())
}

/// Matrix-vector multiply: `y = alpha * op(A) * x + beta * y`.
pub fn gemv<T: NeuraNumeric>(
    alpha: T,
    a: &Tensor<T>,
    trans_a: Transpose,
    x: &[T],
    beta: T,
    y: &mut [T],
) -> Result<(), NeuraRustError> {
    let (rows, cols) = a.expect_matrix("gemv")?;
    let (m, n) = op_dims(rows, cols, trans_a);
    if x.len() != n || y.len() != m {
        return Err(NeuraRustError::shape_mismatch(&[m, n], &[y.len(), x.len()], "gemv"));
    }
    let data = a.data();
    for (i, yi) in y.iter_mut().enumerate() {
        let mut acc = T::zero();
        for (j, &xj) in x.iter().enumerate() {
            let aij = match trans_a {
                Transpose::No => data[i * cols + j],
                Transpose::Yes => data[j * cols + i],
            };
            acc += aij * xj;
        }
        *yi = if beta == T::zero() { alpha * acc } else { alpha * acc + beta * *yi };
    }
    Ok(())
}

/// `y += alpha * x`.
pub fn axpy<T: NeuraNumeric>(alpha: T, x: &[T], y: &mut [T]) -> Result<(), NeuraRustError> {
    if x.len() != y.len() {
        return Err(NeuraRustError::shape_mismatch(&[y.len()], &[x.len()], "axpy"));
    }
    y.iter_mut().zip(x.iter()).for_each(|(yi, &xi)| *yi += alpha * xi);
    Ok(())
}

/// `x *= alpha`.
pub fn scal<T: NeuraNumeric>(alpha: T, x: &mut [T]) {
    x.iter_mut().for_each(|xi| *xi *= alpha);
}

/// Inner product of two equally long slices.
pub fn dot<T: NeuraNumeric>(x: &[T], y: &[T]) -> Result<T, NeuraRustError> {
    if x.len() != y.len() {
        return Err(NeuraRustError::shape_mismatch(&[x.len()], &[y.len()], "dot"));
    }
    Ok(x.iter().zip(y.iter()).map(|(&a, &b)| a * b).sum())
}

/// Convenience product `A * B` into a new tensor.
pub fn matmul<T: NeuraNumeric>(a: &Tensor<T>, b: &Tensor<T>) -> Result<Tensor<T>, NeuraRustError> {
    let (m, _) = a.expect_matrix("matmul lhs")?;
    let (_, n) = b.expect_matrix("matmul rhs")?;
    let mut c = Tensor::zeros(&[m, n]);
    gemm(T::one(), a, Transpose::No, b, Transpose::No, T::zero(), &mut c)?;
    Ok(c)
}

#[cfg(test)]
#[path = "linalg_test.rs"]
mod tests;
