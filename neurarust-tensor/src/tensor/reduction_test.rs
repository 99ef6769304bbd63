use crate::error::NeuraRustError;
use crate::tensor::Tensor;
use approx::assert_relative_eq;

#[test]
fn test_scalar_reductions() {
    let t = Tensor::<f64>::vector(vec![1.0, 2.0, 3.0, 6.0]);
    assert_eq!(t.sum(), 12.0);
    assert_eq!(t.mean(), 3.0);
    assert_relative_eq!(t.variance(), 3.5, epsilon = 1e-12);
    assert_eq!(t.max(), 6.0);
    assert_eq!(t.min(), 1.0);
    assert_eq!(t.square_sum(), 50.0);
}

#[test]
fn test_empty_reductions() {
    let t = Tensor::<f32>::empty();
    assert_eq!(t.sum(), 0.0);
    assert_eq!(t.mean(), 0.0);
    assert_eq!(t.max(), f32::NEG_INFINITY);
}

#[test]
fn test_row_and_column_sums() -> Result<(), NeuraRustError> {
    let t = Tensor::<f32>::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], vec![2, 3])?;
    assert_eq!(t.sum_rows()?.data(), &[5.0, 7.0, 9.0]);
    assert_eq!(t.sum_cols()?.data(), &[6.0, 15.0]);
    assert_eq!(t.argmax_rows()?, vec![2, 2]);
    Ok(())
}
