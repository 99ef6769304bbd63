use super::{LogSoftMax, SoftMax};
use crate::module::Module;
use approx::assert_relative_eq;
use neurarust_tensor::{NeuraRustError, Tensor};

#[test]
fn test_log_softmax_rows_exponentiate_to_one() -> Result<(), NeuraRustError> {
    let mut layer = LogSoftMax::<f64>::new();
    let x = Tensor::new(vec![1.0, 2.0, 3.0, -1.0, 0.0, 1.0], vec![2, 3])?;
    let y = layer.forward(&x)?.clone();
    for row in y.data().chunks(3) {
        assert_relative_eq!(row.iter().map(|v| v.exp()).sum::<f64>(), 1.0, epsilon = 1e-12);
    }
    // Shift invariance: both rows differ by a constant
    assert_relative_eq!(y.data()[0], y.data()[3], epsilon = 1e-12);
    assert_relative_eq!(y.data()[2], -(1.0 + (-1.0f64).exp() + (-2.0f64).exp()).ln(), epsilon = 1e-12);
    Ok(())
}

#[test]
fn test_log_softmax_is_stable_for_large_inputs() -> Result<(), NeuraRustError> {
    let mut layer = LogSoftMax::<f32>::new();
    let x = Tensor::new(vec![1000.0, 1000.0], vec![1, 2])?;
    let y = layer.forward(&x)?;
    assert!(y.data().iter().all(|v| v.is_finite()));
    assert_relative_eq!(y.data()[0], -(2.0f32).ln(), epsilon = 1e-6);
    Ok(())
}

#[test]
fn test_log_softmax_backward_of_nll_shape() -> Result<(), NeuraRustError> {
    let mut layer = LogSoftMax::<f64>::new();
    let x = Tensor::new(vec![0.5, -0.5, 2.0], vec![1, 3])?;
    layer.forward(&x)?;
    // Gradient of -y[2]
    let g = Tensor::new(vec![0.0, 0.0, -1.0], vec![1, 3])?;
    let d = layer.backward(&x, &g)?.clone();
    // softmax(x) - onehot
    let p: Vec<f64> = layer.output().data().iter().map(|v| v.exp()).collect();
    assert_relative_eq!(d.data()[0], p[0], epsilon = 1e-12);
    assert_relative_eq!(d.data()[2], p[2] - 1.0, epsilon = 1e-12);
    assert_relative_eq!(d.sum(), 0.0, epsilon = 1e-12);
    Ok(())
}

#[test]
fn test_softmax_forward_backward() -> Result<(), NeuraRustError> {
    let mut layer = SoftMax::<f64>::new();
    let x = Tensor::new(vec![0.0, 0.0, 0.0, 0.0], vec![1, 4])?;
    layer.forward(&x)?;
    assert!(layer.output().data().iter().all(|&v| (v - 0.25).abs() < 1e-12));
    // A constant upstream gradient has no effect through softmax
    layer.backward(&x, &Tensor::full(&[1, 4], 3.0))?;
    assert!(layer.in_grad().data().iter().all(|v| v.abs() < 1e-12));
    assert_eq!(layer.output_shape(), vec![4]);
    Ok(())
}

#[test]
fn test_softmax_requires_matrix() {
    let mut layer = SoftMax::<f64>::new();
    assert!(layer.forward(&Tensor::zeros(&[2, 2, 2])).is_err());
}
