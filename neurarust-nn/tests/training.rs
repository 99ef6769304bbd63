mod common;

use common::{init_logger, random_tensor, rng};
use neurarust_nn::layers::Linear;
use neurarust_nn::losses::{CriticSequencer, Mse};
use neurarust_nn::optim::{
    Adam, AdamHyperParams, Nadam, Optimizer, RmsProp, RmsPropHyperParams, Sgd, SgdHyperParams,
};
use neurarust_nn::recurrent::{Lstm, Sequencer};
use neurarust_nn::{Module, NeuraRustError, Tensor};

fn zero_linear() -> Result<Box<dyn Module<f64>>, NeuraRustError> {
    Ok(Box::new(Linear::<f64>::from_parts(Tensor::zeros(&[2, 3]), Tensor::zeros(&[3]))?))
}

fn regression_data() -> (Tensor<f64>, Tensor<f64>) {
    let x = random_tensor(&[8, 2], 31);
    let target = random_tensor(&[8, 3], 32).map(|v| 2.0 * v);
    (x, target)
}

/// Runs `steps` updates and returns the loss seen before each one.
fn train(optimizer: &mut dyn Optimizer<f64>, steps: usize) -> Result<Vec<f64>, NeuraRustError> {
    let (x, target) = regression_data();
    (0..steps).map(|_| optimizer.step(&x, &target)).collect()
}

fn assert_strictly_decreasing(losses: &[f64], name: &str) {
    for (i, pair) in losses.windows(2).enumerate() {
        assert!(pair[1] < pair[0], "{}: loss rose at step {}: {} -> {}", name, i + 1, pair[0], pair[1]);
    }
}

#[test]
fn test_sgd_decreases_loss() -> Result<(), NeuraRustError> {
    init_logger();
    let hyper = SgdHyperParams {
        lr: 0.01,
        ..Default::default()
    };
    let mut sgd = Sgd::new(zero_linear()?, Box::new(Mse::<f64>::new()), hyper)?;
    assert_strictly_decreasing(&train(&mut sgd, 30)?, "SGD");
    Ok(())
}

#[test]
fn test_sgd_with_momentum_makes_progress() -> Result<(), NeuraRustError> {
    let hyper = SgdHyperParams {
        lr: 0.005,
        momentum: 0.9,
        weight_decay: 1e-4,
    };
    let mut sgd = Sgd::new(zero_linear()?, Box::new(Mse::<f64>::new()), hyper)?;
    let losses = train(&mut sgd, 60)?;
    assert!(losses[59] < 0.5 * losses[0], "{:?}", losses);
    Ok(())
}

#[test]
fn test_rmsprop_decreases_loss() -> Result<(), NeuraRustError> {
    let hyper = RmsPropHyperParams {
        lr: 0.005,
        ..Default::default()
    };
    let mut rmsprop = RmsProp::new(zero_linear()?, Box::new(Mse::<f64>::new()), hyper)?;
    assert_strictly_decreasing(&train(&mut rmsprop, 20)?, "RMSProp");
    Ok(())
}

#[test]
fn test_adam_decreases_loss() -> Result<(), NeuraRustError> {
    let hyper = AdamHyperParams {
        lr: 0.005,
        ..Default::default()
    };
    let mut adam = Adam::new(zero_linear()?, Box::new(Mse::<f64>::new()), hyper)?;
    assert_strictly_decreasing(&train(&mut adam, 20)?, "Adam");
    Ok(())
}

#[test]
fn test_nadam_decreases_loss() -> Result<(), NeuraRustError> {
    let hyper = AdamHyperParams {
        lr: 0.005,
        ..Default::default()
    };
    let mut nadam = Nadam::new(zero_linear()?, Box::new(Mse::<f64>::new()), hyper)?;
    assert_strictly_decreasing(&train(&mut nadam, 20)?, "Nadam");
    Ok(())
}

#[test]
fn test_lstm_learns_a_sequence() -> Result<(), NeuraRustError> {
    init_logger();
    let model = Sequencer::new(Box::new(Lstm::<f64>::with_rng(3, 2, &mut rng(33))?));
    let critic = CriticSequencer::new(Box::new(Mse::<f64>::new()));
    let hyper = AdamHyperParams {
        lr: 0.01,
        ..Default::default()
    };
    let mut adam = Adam::new(Box::new(model), Box::new(critic), hyper)?;

    let x = random_tensor(&[5, 2, 3], 34);
    let target = random_tensor(&[5, 2, 2], 35).map(|v| 0.4 * v.tanh());
    let mut losses = Vec::new();
    for _ in 0..100 {
        // every sequence starts from a zero state
        adam.model_mut().reset_state();
        losses.push(adam.step(&x, &target)?);
    }
    assert!(losses.iter().all(|l| l.is_finite()));
    assert!(losses[99] < losses[0], "initial {} final {}", losses[0], losses[99]);
    Ok(())
}
