use crate::error::NeuraRustError;
use crate::linalg::{axpy, dot, gemm, gemv, ger, matmul, scal, Transpose};
use crate::tensor::Tensor;

fn a23() -> Tensor<f64> {
    Tensor::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], vec![2, 3]).unwrap()
}

#[test]
fn test_matmul() -> Result<(), NeuraRustError> {
    let b = Tensor::new(vec![1.0, 0.0, 0.0, 1.0, 1.0, 1.0], vec![3, 2])?;
    let c = matmul(&a23(), &b)?;
    assert_eq!(c.shape(), &[2, 2]);
    assert_eq!(c.data(), &[4.0, 5.0, 10.0, 11.0]);
    Ok(())
}

#[test]
fn test_gemm_transposes_and_accumulates() -> Result<(), NeuraRustError> {
    let a = a23();
    // A^T * A is [3, 3]
    let mut c = Tensor::ones(&[3, 3]);
    gemm(1.0, &a, Transpose::Yes, &a, Transpose::No, 1.0, &mut c)?;
    assert_eq!(c.data(), &[18.0, 23.0, 28.0, 23.0, 30.0, 37.0, 28.0, 37.0, 46.0]);

    // A * A^T is [2, 2], beta = 0 ignores previous contents
    let mut d = Tensor::full(&[2, 2], f64::NAN);
    gemm(2.0, &a, Transpose::No, &a, Transpose::Yes, 0.0, &mut d)?;
    assert_eq!(d.data(), &[28.0, 64.0, 64.0, 154.0]);
    Ok(())
}

#[test]
fn test_gemm_rejects_bad_shapes() {
    let a = a23();
    let mut c = Tensor::zeros(&[2, 2]);
    assert!(gemm(1.0, &a, Transpose::No, &a, Transpose::No, 0.0, &mut c).is_err());
    let mut wrong = Tensor::zeros(&[3, 3]);
    assert!(gemm(1.0, &a, Transpose::No, &a, Transpose::Yes, 0.0, &mut wrong).is_err());
}

#[test]
fn test_ger_outer_product() -> Result<(), NeuraRustError> {
    let mut a = Tensor::<f32>::zeros(&[2, 3]);
    ger(1.0, &[1.0, 2.0], &[1.0, 0.5, -1.0], &mut a)?;
    assert_eq!(a.data(), &[1.0, 0.5, -1.0, 2.0, 1.0, -2.0]);
    Ok(())
}

#[test]
fn test_gemv() -> Result<(), NeuraRustError> {
    let mut y = vec![0.0; 3];
    gemv(1.0, &a23(), Transpose::Yes, &[1.0, 1.0], 0.0, &mut y)?;
    assert_eq!(y, vec![5.0, 7.0, 9.0]);
    Ok(())
}

#[test]
fn test_vector_kernels() -> Result<(), NeuraRustError> {
    let mut y = vec![1.0f64, 1.0];
    axpy(2.0, &[1.0, 3.0], &mut y)?;
    assert_eq!(y, vec![3.0, 7.0]);
    scal(0.5, &mut y);
    assert_eq!(y, vec![1.5, 3.5]);
    assert_eq!(dot(&y, &[2.0, 2.0])?, 10.0);
    assert!(dot(&y, &[1.0]).is_err());
    Ok(())
}
