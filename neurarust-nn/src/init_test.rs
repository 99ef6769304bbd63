use super::{normal_, ones_, zeros_};
use neurarust_tensor::Tensor;
use rand::rngs::StdRng;
use rand::SeedableRng;

#[test]
fn test_normal_is_reproducible_and_roughly_standard() {
    let mut a = Tensor::<f64>::zeros(&[100, 50]);
    let mut b = Tensor::<f64>::zeros(&[100, 50]);
    normal_(&mut a, &mut StdRng::seed_from_u64(7));
    normal_(&mut b, &mut StdRng::seed_from_u64(7));
    assert_eq!(a, b);
    assert!(a.mean().abs() < 0.1);
    assert!((a.variance() - 1.0).abs() < 0.1);
}

#[test]
fn test_zeros_and_ones() {
    let mut t = Tensor::<f32>::full(&[3], 4.0);
    zeros_(&mut t);
    assert_eq!(t.sum(), 0.0);
    ones_(&mut t);
    assert_eq!(t.sum(), 3.0);
}
