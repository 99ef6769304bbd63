use super::Nadam;
use crate::layers::Linear;
use crate::losses::Sse;
use crate::module::Module;
use crate::optim::{AdamHyperParams, Optimizer};
use approx::assert_relative_eq;
use neurarust_tensor::{NeuraRustError, Tensor};

#[test]
fn test_nadam_first_step_includes_lookahead() -> Result<(), NeuraRustError> {
    let model = Linear::from_parts(Tensor::new(vec![1.0], vec![1, 1])?, Tensor::zeros(&[1]))?;
    let hyper = AdamHyperParams {
        lr: 0.01,
        ..Default::default()
    };
    let mut opt = Nadam::new(Box::new(model), Box::new(Sse::new()), hyper)?;
    let x = Tensor::new(vec![2.0], vec![1, 1])?;
    let t = Tensor::new(vec![3.0], vec![1, 1])?;
    opt.step(&x, &t)?;

    // m_bar = beta1 * g + g after one step, so the move is 1.9 * lr
    let p = opt.model().parameters();
    assert_relative_eq!(p[0], 1.019, epsilon = 1e-8);
    assert_relative_eq!(p[1], 0.019, epsilon = 1e-8);

    let first = opt.first_moment().clone();
    opt.reset();
    assert_eq!(opt.first_moment(), &first);
    Ok(())
}

#[test]
fn test_nadam_rejects_invalid_hyper_params() -> Result<(), NeuraRustError> {
    let model = Linear::<f64>::new(2, 1)?;
    let hyper = AdamHyperParams {
        beta2: 1.0,
        ..Default::default()
    };
    assert!(matches!(
        Nadam::new(Box::new(model), Box::new(Sse::new()), hyper),
        Err(NeuraRustError::ConfigurationError(_))
    ));
    Ok(())
}
