use crate::error::NeuraRustError;
use crate::tensor::{flatten, unflatten_into, Tensor};

#[test]
fn test_flatten_preserves_order() -> Result<(), NeuraRustError> {
    let a = Tensor::<f64>::new(vec![1.0, 2.0, 3.0, 4.0], vec![2, 2])?;
    let b = Tensor::<f64>::vector(vec![5.0, 6.0]);
    let flat = flatten(&[&a, &b]);
    assert_eq!(flat.shape(), &[6]);
    assert_eq!(flat.data(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    Ok(())
}

#[test]
fn test_unflatten_writes_back() -> Result<(), NeuraRustError> {
    let mut a = Tensor::<f32>::zeros(&[2, 2]);
    let mut b = Tensor::<f32>::zeros(&[2]);
    let flat = Tensor::vector(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    unflatten_into(&flat, &mut [&mut a, &mut b])?;
    assert_eq!(a.data(), &[1.0, 2.0, 3.0, 4.0]);
    assert_eq!(b.data(), &[5.0, 6.0]);
    assert_eq!(a.shape(), &[2, 2]);
    Ok(())
}

#[test]
fn test_unflatten_rejects_wrong_size() {
    let mut a = Tensor::<f32>::zeros(&[3]);
    let flat = Tensor::vector(vec![1.0, 2.0]);
    assert!(unflatten_into(&flat, &mut [&mut a]).is_err());
    assert_eq!(a.sum(), 0.0);
}
