mod common;

use common::{init_logger, random_tensor, rng};
use neurarust_nn::containers::{Concat, Sequential};
use neurarust_nn::grad_check::{GradCheck, GradCheckError};
use neurarust_nn::layers::{
    BatchNorm, Convolution, ConvolutionConfig, DropConnect, Flatten, Linear, LogSoftMax, Logistic, ReLU, SoftMax,
    TanH,
};
use neurarust_nn::losses::{CriticSequencer, CrossEntropy, Nll, Sse};
use neurarust_nn::recurrent::{Lstm, Recurrent, Sequencer};
use neurarust_nn::{Module, Tensor};

fn check_module<M: Module<f64> + ?Sized>(module: &mut M, input: &Tensor<f64>) -> Result<(), GradCheckError> {
    let check = GradCheck::default();
    let inputs = check.check_input(module, input)?;
    assert_eq!(inputs.checked, input.size());
    let params = check.check_parameters(module, input)?;
    assert_eq!(params.checked, module.parameter_count());
    Ok(())
}

#[test]
fn test_linear() -> Result<(), GradCheckError> {
    init_logger();
    let mut linear = Linear::<f64>::with_rng(4, 3, &mut rng(1))?;
    check_module(&mut linear, &random_tensor(&[5, 4], 2))
}

#[test]
fn test_batchnorm_training_and_inference() -> Result<(), GradCheckError> {
    let mut norm = BatchNorm::<f64>::new(3)?;
    let x = random_tensor(&[6, 3], 3);
    check_module(&mut norm, &x)?;
    norm.set_training(false);
    check_module(&mut norm, &x)
}

#[test]
fn test_convolution_with_stride_and_padding() -> Result<(), GradCheckError> {
    let config = ConvolutionConfig::new(2, 5, 4, 3, 3, 2).with_stride(2).with_padding(1);
    let mut conv = Convolution::<f64>::with_rng(config, &mut rng(4))?;
    check_module(&mut conv, &random_tensor(&[2, 2, 5, 4], 5))
}

#[test]
fn test_activations_and_normalizers() -> Result<(), GradCheckError> {
    // inputs away from zero keep the ReLU kink out of the difference
    let x = random_tensor(&[3, 4], 6).map(|v| if v.abs() < 0.1 { v + 0.5 } else { v });
    check_module(&mut Logistic::<f64>::new(), &x)?;
    check_module(&mut TanH::<f64>::new(), &x)?;
    check_module(&mut ReLU::<f64>::leaky(0.1)?, &x)?;
    check_module(&mut SoftMax::<f64>::new(), &x)?;
    check_module(&mut LogSoftMax::<f64>::new(), &x)
}

#[test]
fn test_convolutional_pipeline() -> Result<(), GradCheckError> {
    let mut r = rng(7);
    let config = ConvolutionConfig::new(1, 4, 4, 2, 2, 2);
    let mut net = Sequential::new()
        .with(Convolution::<f64>::with_rng(config, &mut r)?)?
        .with(Flatten::new())?
        .with(Linear::<f64>::with_rng(18, 3, &mut r)?)?
        .with(LogSoftMax::<f64>::new())?;
    check_module(&mut net, &random_tensor(&[2, 1, 4, 4], 8))
}

#[test]
fn test_concat() -> Result<(), GradCheckError> {
    let mut r = rng(9);
    let mut concat = Concat::new()
        .with(Linear::<f64>::with_rng(3, 2, &mut r)?)?
        .with(Sequential::new().with(Linear::<f64>::with_rng(3, 4, &mut r)?)?.with(TanH::<f64>::new())?)?;
    check_module(&mut concat, &random_tensor(&[4, 3], 10))
}

#[test]
fn test_dropconnect_in_inference_mode() -> Result<(), GradCheckError> {
    let mut dc = DropConnect::with_seed(Box::new(Linear::<f64>::with_rng(3, 2, &mut rng(11))?), 0.3, 5)?;
    dc.set_training(false);
    check_module(&mut dc, &random_tensor(&[2, 3], 12))
}

#[test]
fn test_recurrent_modules() -> Result<(), GradCheckError> {
    let mut r = rng(13);
    let mut rnn = Recurrent::new(
        Box::new(Linear::<f64>::with_rng(3, 4, &mut r)?),
        Box::new(Linear::<f64>::with_rng(4, 4, &mut r)?),
        Box::new(Logistic::<f64>::new()),
    )?;
    check_module(&mut rnn, &random_tensor(&[2, 3], 14))?;

    let mut lstm = Lstm::<f64>::with_rng(3, 2, &mut r)?;
    check_module(&mut lstm, &random_tensor(&[2, 3], 15))
}

#[test]
fn test_sequencer_unrolls_gradients() -> Result<(), GradCheckError> {
    let mut r = rng(16);
    let mut seq = Sequencer::new(Box::new(Lstm::<f64>::with_rng(3, 2, &mut r)?));
    check_module(&mut seq, &random_tensor(&[4, 2, 3], 17))?;

    let rnn = Recurrent::new(
        Box::new(Linear::<f64>::with_rng(3, 2, &mut r)?),
        Box::new(Linear::<f64>::with_rng(2, 2, &mut r)?),
        Box::new(TanH::<f64>::new()),
    )?;
    let mut stacked = Sequencer::new(Box::new(
        Sequential::new().with(rnn)?.with(Linear::<f64>::with_rng(2, 1, &mut r)?)?,
    ));
    check_module(&mut stacked, &random_tensor(&[3, 2, 3], 18))
}

#[test]
fn test_layer_after_lstm_sees_the_current_step() -> Result<(), GradCheckError> {
    let mut r = rng(26);
    let mut plain = Sequential::new()
        .with(Lstm::<f64>::with_rng(3, 2, &mut r)?)?
        .with(Linear::<f64>::with_rng(2, 1, &mut r)?)?;
    check_module(&mut plain, &random_tensor(&[2, 3], 27))?;

    let mut unrolled = Sequencer::new(Box::new(
        Sequential::new()
            .with(Lstm::<f64>::with_rng(3, 2, &mut r)?)?
            .with(Linear::<f64>::with_rng(2, 1, &mut r)?)?,
    ));
    check_module(&mut unrolled, &random_tensor(&[3, 2, 3], 28))
}

#[test]
fn test_critics() -> Result<(), GradCheckError> {
    let check = GradCheck::default();
    let p = random_tensor(&[4, 3], 19);
    let t = random_tensor(&[4, 3], 20);
    check.check_critic(&mut Sse::<f64>::new(), &p, &t)?;

    let probabilities = p.map(|v| 0.1 + v.abs());
    let one_hot = Tensor::new(
        vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0],
        vec![4, 3],
    )?;
    check.check_critic(&mut CrossEntropy::<f64>::new(), &probabilities, &one_hot)?;

    let classes = Tensor::new(vec![2.0, 0.0, 1.0, 1.0], vec![4, 1])?;
    check.check_critic(&mut Nll::<f64>::new(), &p, &classes)?;

    let seq_p = random_tensor(&[2, 3, 2], 21);
    let seq_t = random_tensor(&[2, 3, 2], 22);
    check.check_critic(&mut CriticSequencer::new(Box::new(Sse::<f64>::new())), &seq_p, &seq_t)?;
    Ok(())
}
