use super::{RmsProp, RmsPropHyperParams};
use crate::layers::Linear;
use crate::losses::Sse;
use crate::module::Module;
use crate::optim::Optimizer;
use approx::assert_relative_eq;
use neurarust_tensor::{NeuraRustError, Tensor};

fn rmsprop(hyper: RmsPropHyperParams) -> Result<RmsProp<f64>, NeuraRustError> {
    let model = Linear::from_parts(Tensor::new(vec![1.0], vec![1, 1])?, Tensor::zeros(&[1]))?;
    RmsProp::new(Box::new(model), Box::new(Sse::new()), hyper)
}

#[test]
fn test_rmsprop_first_step_is_normalized() -> Result<(), NeuraRustError> {
    let mut opt = rmsprop(RmsPropHyperParams {
        lr: 0.1,
        ..Default::default()
    })?;
    let x = Tensor::new(vec![2.0], vec![1, 1])?;
    let t = Tensor::new(vec![3.0], vec![1, 1])?;
    opt.step(&x, &t)?;

    // r = 0.1 g^2, so every parameter moves by lr / sqrt(0.1) against its gradient
    let expected = 0.1 / 0.1f64.sqrt();
    let p = opt.model().parameters();
    assert_relative_eq!(p[0], 1.0 + expected, epsilon = 1e-6);
    assert_relative_eq!(p[1], expected, epsilon = 1e-6);
    assert_relative_eq!(opt.square_avg()[0], 0.4, epsilon = 1e-12);

    opt.reset();
    assert!(opt.square_avg().data().iter().all(|&v| v == 0.0));
    Ok(())
}

#[test]
fn test_rmsprop_hyper_params_validation() {
    assert!(RmsPropHyperParams::default().validate().is_ok());
    for bad in [
        RmsPropHyperParams { lr: -1.0, ..Default::default() },
        RmsPropHyperParams { gamma: 1.5, ..Default::default() },
        RmsPropHyperParams { eps: 0.0, ..Default::default() },
    ] {
        assert!(matches!(bad.validate(), Err(NeuraRustError::ConfigurationError(_))));
    }
}
