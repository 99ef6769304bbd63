use super::{GradCheck, GradCheckError};
use crate::layers::{BatchNorm, Linear, TanH};
use crate::losses::{CrossEntropy, Mse, Sse};
use crate::module::Module;
use crate::recurrent::Recurrent;
use neurarust_tensor::{NeuraRustError, Tensor};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn input() -> Result<Tensor<f64>, NeuraRustError> {
    Tensor::new(vec![0.5, -1.0, 0.25, 2.0, 0.0, -0.75], vec![2, 3])
}

#[test]
fn test_linear_passes() -> Result<(), GradCheckError> {
    let mut linear = Linear::<f64>::with_rng(3, 2, &mut StdRng::seed_from_u64(1))?;
    let check = GradCheck::default();
    let inputs = check.check_input(&mut linear, &input()?)?;
    assert_eq!(inputs.checked, 6);
    let params = check.check_parameters(&mut linear, &input()?)?;
    assert_eq!(params.checked, 8);
    assert!(params.max_abs_error < 1e-6);
    Ok(())
}

#[test]
fn test_parameters_are_restored() -> Result<(), GradCheckError> {
    let mut linear = Linear::<f64>::with_rng(3, 2, &mut StdRng::seed_from_u64(2))?;
    let before = linear.parameters();
    GradCheck::default().check_parameters(&mut linear, &input()?)?;
    assert_eq!(linear.parameters(), before);
    Ok(())
}

#[test]
fn test_stateful_modules_pass() -> Result<(), GradCheckError> {
    let mut rng = StdRng::seed_from_u64(3);
    let mut rnn = Recurrent::new(
        Box::new(Linear::<f64>::with_rng(3, 2, &mut rng)?),
        Box::new(Linear::with_rng(2, 2, &mut rng)?),
        Box::new(TanH::new()),
    )?;
    let check = GradCheck::default();
    check.check_input(&mut rnn, &input()?)?;
    check.check_parameters(&mut rnn, &input()?)?;

    let mut norm = BatchNorm::<f64>::new(3)?;
    check.check_input(&mut norm, &input()?)?;
    check.check_parameters(&mut norm, &input()?)?;
    Ok(())
}

#[test]
fn test_exact_critics_pass() -> Result<(), GradCheckError> {
    let check = GradCheck::default();
    let p = Tensor::new(vec![0.2, 0.3, 0.5, 0.6, 0.3, 0.1], vec![2, 3])?;
    let t = Tensor::new(vec![0.0, 1.0, 0.0, 1.0, 0.0, 0.0], vec![2, 3])?;
    check.check_critic(&mut Sse::new(), &p, &t)?;
    check.check_critic(&mut CrossEntropy::new(), &p, &t)?;
    Ok(())
}

#[test]
fn test_scaled_mse_gradient_is_reported() -> Result<(), NeuraRustError> {
    // MSE reports p - t, the exact derivative is 2 (p - t) / n
    let p = Tensor::new(vec![1.0, 2.0, 3.0, 4.0], vec![2, 2])?;
    let t = Tensor::zeros(&[2, 2]);
    match GradCheck::default().check_critic(&mut Mse::new(), &p, &t) {
        Err(GradCheckError::GradientMismatch { index, analytic, numeric, .. }) => {
            assert_eq!(index, 0);
            assert_eq!(analytic, 1.0);
            approx::assert_relative_eq!(numeric, 0.5, epsilon = 1e-6);
        }
        other => panic!("expected a mismatch, got {:?}", other),
    }
    Ok(())
}
