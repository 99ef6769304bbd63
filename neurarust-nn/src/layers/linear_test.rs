use super::Linear;
use crate::module::Module;
use approx::assert_relative_eq;
use neurarust_tensor::{NeuraRustError, Tensor};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn fixture() -> Result<Linear<f64>, NeuraRustError> {
    // 2 inputs, 3 outputs
    let weights = Tensor::new(vec![1.0, 0.0, -1.0, 2.0, 1.0, 0.5], vec![2, 3])?;
    let bias = Tensor::new(vec![0.1, 0.2, 0.3], vec![3])?;
    Linear::from_parts(weights, bias)
}

#[test]
fn test_forward_affine() -> Result<(), NeuraRustError> {
    let mut layer = fixture()?;
    let x = Tensor::new(vec![1.0, 2.0, -1.0, 0.0], vec![2, 2])?;
    let y = layer.forward(&x)?;
    assert_eq!(y.shape(), &[2, 3]);
    let expected = [5.1, 2.2, 0.3, -0.9, 0.2, 1.3];
    for (a, e) in y.data().iter().zip(expected.iter()) {
        assert_relative_eq!(*a, *e, epsilon = 1e-12);
    }
    assert_eq!(layer.batch(), 2);
    Ok(())
}

#[test]
fn test_backward_accumulates_parameter_gradients() -> Result<(), NeuraRustError> {
    let mut layer = fixture()?;
    let x = Tensor::new(vec![1.0, 2.0, -1.0, 0.0], vec![2, 2])?;
    let g = Tensor::new(vec![1.0, 0.0, 1.0, 0.5, 1.0, 0.0], vec![2, 3])?;
    layer.forward(&x)?;
    let in_grad = layer.backward(&x, &g)?.clone();

    // inGrad = g W^T
    assert_eq!(in_grad.shape(), &[2, 2]);
    assert_relative_eq!(in_grad.data()[0], 0.0, epsilon = 1e-12);
    assert_relative_eq!(in_grad.data()[1], 2.5, epsilon = 1e-12);
    assert_relative_eq!(in_grad.data()[2], 0.5, epsilon = 1e-12);
    assert_relative_eq!(in_grad.data()[3], 2.0, epsilon = 1e-12);

    // biasGrad = column sums of g, weightsGrad = x^T g
    assert_eq!(layer.bias_grad().data(), &[1.5, 1.0, 1.0]);
    assert_eq!(layer.weights_grad().data(), &[0.5, -1.0, 1.0, 2.0, 0.0, 2.0]);

    // A second pass accumulates
    layer.backward(&x, &g)?;
    assert_eq!(layer.bias_grad().data(), &[3.0, 2.0, 2.0]);
    layer.zero_grad();
    assert_eq!(layer.grad().sum(), 0.0);
    Ok(())
}

#[test]
fn test_wrong_feature_count_is_rejected() -> Result<(), NeuraRustError> {
    let mut layer = fixture()?;
    let x = Tensor::<f64>::zeros(&[4, 3]);
    assert!(matches!(layer.forward(&x), Err(NeuraRustError::ShapeMismatch { .. })));
    Ok(())
}

#[test]
fn test_batch_resize_keeps_parameters() -> Result<(), NeuraRustError> {
    let mut layer = Linear::<f32>::with_rng(3, 2, &mut StdRng::seed_from_u64(1))?;
    let before = layer.parameters();
    layer.set_batch(7)?;
    assert_eq!(layer.parameters(), before);
    assert_eq!(layer.output().shape(), &[7, 2]);
    layer.forward(&Tensor::zeros(&[5, 3]))?;
    assert_eq!(layer.batch(), 5);
    Ok(())
}

#[test]
fn test_structural_resize_reinitializes() -> Result<(), NeuraRustError> {
    let mut layer = Linear::<f64>::with_rng(3, 2, &mut StdRng::seed_from_u64(1))?;
    layer.set_inputs(&[4])?;
    assert_eq!(layer.weights().shape(), &[4, 2]);
    assert_eq!(layer.weights_grad().shape(), &[4, 2]);
    assert_eq!(layer.parameter_count(), 10);
    assert!(layer.weights().square_sum() > 0.0);
    layer.set_outputs(&[5])?;
    assert_eq!(layer.output_shape(), vec![5]);
    assert!(layer.set_outputs(&[0]).is_err());
    Ok(())
}

#[test]
fn test_zero_sized_layer_is_a_configuration_error() {
    assert!(matches!(
        Linear::<f32>::new(0, 3),
        Err(NeuraRustError::ConfigurationError(_))
    ));
}

#[test]
fn test_set_parameters_round_trip() -> Result<(), NeuraRustError> {
    let mut layer = fixture()?;
    let mut flat = layer.parameters();
    assert_eq!(flat.size(), 9);
    flat.scale_(2.0);
    layer.set_parameters(&flat)?;
    assert_eq!(layer.bias().data(), &[0.2, 0.4, 0.6]);
    assert!(layer.set_parameters(&Tensor::zeros(&[8])).is_err());
    Ok(())
}
