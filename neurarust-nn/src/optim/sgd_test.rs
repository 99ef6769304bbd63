use super::{Sgd, SgdHyperParams};
use crate::layers::Linear;
use crate::losses::{Critic, Sse};
use crate::module::Module;
use crate::optim::Optimizer;
use crate::recurrent::Lstm;
use approx::assert_relative_eq;
use neurarust_tensor::{NeuraRustError, Tensor};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// y = 1 * x + 0, fitted towards 3 at x = 2.
fn sgd(hyper: SgdHyperParams) -> Result<Sgd<f64>, NeuraRustError> {
    let model = Linear::from_parts(Tensor::new(vec![1.0], vec![1, 1])?, Tensor::zeros(&[1]))?;
    Sgd::new(Box::new(model), Box::new(Sse::new()), hyper)
}

fn sample() -> Result<(Tensor<f64>, Tensor<f64>), NeuraRustError> {
    Ok((Tensor::new(vec![2.0], vec![1, 1])?, Tensor::new(vec![3.0], vec![1, 1])?))
}

#[test]
fn test_sgd_basic_step() -> Result<(), NeuraRustError> {
    let mut opt = sgd(SgdHyperParams {
        lr: 0.1,
        ..Default::default()
    })?;
    let (x, t) = sample()?;
    let loss = opt.step(&x, &t)?;
    assert_relative_eq!(loss, 0.5);
    // dW = x * (p - t) = -2, db = -1
    let p = opt.model().parameters();
    assert_relative_eq!(p[0], 1.2, epsilon = 1e-12);
    assert_relative_eq!(p[1], 0.1, epsilon = 1e-12);
    Ok(())
}

#[test]
fn test_sgd_momentum_accumulates_velocity() -> Result<(), NeuraRustError> {
    let mut opt = sgd(SgdHyperParams {
        lr: 0.1,
        momentum: 0.5,
        weight_decay: 0.0,
    })?;
    let (x, t) = sample()?;
    opt.step(&x, &t)?;
    opt.step(&x, &t)?;
    // second gradient is [-1, -0.5]; velocity 0.5 * [-2, -1] + [-1, -0.5]
    assert_eq!(opt.velocity().data(), &[-2.0, -1.0]);
    let p = opt.model().parameters();
    assert_relative_eq!(p[0], 1.4, epsilon = 1e-12);
    assert_relative_eq!(p[1], 0.2, epsilon = 1e-12);

    opt.reset();
    assert!(opt.velocity().data().iter().all(|&v| v == 0.0));
    Ok(())
}

#[test]
fn test_sgd_weight_decay() -> Result<(), NeuraRustError> {
    let mut opt = sgd(SgdHyperParams {
        lr: 0.1,
        momentum: 0.0,
        weight_decay: 0.1,
    })?;
    let (x, t) = sample()?;
    opt.step(&x, &t)?;
    let p = opt.model().parameters();
    assert_relative_eq!(p[0], 1.19, epsilon = 1e-12);
    assert_relative_eq!(p[1], 0.1, epsilon = 1e-12);
    Ok(())
}

#[test]
fn test_sgd_hyper_params_validation() -> Result<(), NeuraRustError> {
    assert_eq!(SgdHyperParams::default().lr, 0.01);
    SgdHyperParams::default().validate()?;
    for bad in [
        SgdHyperParams { lr: 0.0, ..Default::default() },
        SgdHyperParams { momentum: 1.0, ..Default::default() },
        SgdHyperParams { weight_decay: -1.0, ..Default::default() },
    ] {
        assert!(matches!(bad.validate(), Err(NeuraRustError::ConfigurationError(_))));
        assert!(sgd(bad).is_err());
    }
    let mut opt = sgd(SgdHyperParams::default())?;
    assert!(opt
        .set_hyper_params(SgdHyperParams { lr: -0.1, ..Default::default() })
        .is_err());
    assert_eq!(opt.hyper_params(), &SgdHyperParams::default());
    Ok(())
}

#[test]
fn test_sgd_propagates_shape_errors() -> Result<(), NeuraRustError> {
    let mut opt = sgd(SgdHyperParams::default())?;
    let (x, _) = sample()?;
    assert!(matches!(
        opt.step(&x, &Tensor::zeros(&[1, 2])),
        Err(NeuraRustError::ShapeMismatch { .. })
    ));
    Ok(())
}

#[test]
fn test_sgd_differentiates_the_step_it_took() -> Result<(), NeuraRustError> {
    let mut lstm = Lstm::<f64>::with_rng(3, 2, &mut StdRng::seed_from_u64(11))?;
    let warm_up = Tensor::new(vec![0.5, -0.3, 0.2], vec![1, 3])?;
    lstm.forward(&warm_up)?;
    let x = Tensor::new(vec![-0.1, 0.4, 0.3], vec![1, 3])?;
    let t = Tensor::new(vec![0.2, -0.6], vec![1, 2])?;

    // forward, rewind, backward by hand
    let mut reference = lstm.clone();
    let mut critic = Sse::new();
    let start = reference.state();
    let prediction = reference.forward(&x)?.clone();
    let advanced = reference.state();
    let blame = critic.backward(&prediction, &t)?.clone();
    reference.set_state(&start)?;
    reference.reset_state_grad();
    reference.zero_grad();
    reference.backward(&x, &blame)?;

    let mut opt = Sgd::new(
        Box::new(lstm),
        Box::new(Sse::new()),
        SgdHyperParams {
            lr: 0.1,
            ..Default::default()
        },
    )?;
    opt.step(&x, &t)?;
    let expected = reference.grad();
    let actual = opt.model().grad();
    assert_eq!(actual.size(), expected.size());
    for i in 0..expected.size() {
        assert_relative_eq!(actual[i], expected[i], epsilon = 1e-12);
    }
    assert_eq!(opt.model().state(), advanced);
    Ok(())
}
