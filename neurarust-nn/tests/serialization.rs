mod common;

use common::{init_logger, random_tensor, rng};
use neurarust_nn::containers::{Concat, Sequential};
use neurarust_nn::layers::{
    BatchNorm, Convolution, ConvolutionConfig, DropConnect, Dropout, Flatten, Identity, Linear, LogSoftMax,
    Logistic, ReLU, SoftMax, TanH,
};
use neurarust_nn::recurrent::{Lstm, Recurrent, Sequencer};
use neurarust_nn::serialize::{from_json, to_json, ModuleRegistry};
use neurarust_nn::{Module, NeuraRustError, Tensor};

/// Saves `module`, loads it back and checks that both copies agree.
fn assert_round_trip(mut module: Box<dyn Module<f64>>, input: &Tensor<f64>) -> Result<(), NeuraRustError> {
    let registry = ModuleRegistry::with_builtins();
    let json = to_json(module.as_ref())?;
    let mut loaded = from_json(&json, &registry)?;

    let kind = module.type_name();
    assert_eq!(loaded.type_name(), kind);
    assert_eq!(loaded.parameters(), module.parameters(), "{}", kind);
    assert_eq!(loaded.state(), module.state(), "{}", kind);
    // the mode is not part of the document
    assert!(loaded.is_training());
    loaded.set_training(module.is_training());

    let expected = module.forward(input)?.clone();
    assert_eq!(loaded.forward(input)?, &expected, "{}", kind);

    // saving the loaded copy reproduces the document
    assert_eq!(to_json(loaded.as_ref())?, json, "{}", kind);
    Ok(())
}

#[test]
fn test_every_builtin_round_trips() -> Result<(), NeuraRustError> {
    init_logger();
    let mut r = rng(21);
    let x = random_tensor(&[3, 4], 22);
    let cases: Vec<Box<dyn Module<f64>>> = vec![
        Box::new(Linear::<f64>::with_rng(4, 2, &mut r)?),
        Box::new(Identity::<f64>::new()),
        Box::new(Logistic::<f64>::new()),
        Box::new(TanH::<f64>::new()),
        Box::new(ReLU::<f64>::leaky(0.05)?),
        Box::new(LogSoftMax::<f64>::new()),
        Box::new(SoftMax::<f64>::new()),
        Box::new(BatchNorm::<f64>::new(4)?.with_momentum(0.2)?),
        Box::new(Dropout::<f64>::with_seed(0.4, 17)?),
        Box::new(DropConnect::with_seed(Box::new(Linear::<f64>::with_rng(4, 3, &mut r)?), 0.3, 9)?),
        Box::new(Flatten::<f64>::new()),
        Box::new(
            Sequential::new()
                .with(Linear::<f64>::with_rng(4, 3, &mut r)?)?
                .with(TanH::<f64>::new())?
                .with(Linear::<f64>::with_rng(3, 2, &mut r)?)?,
        ),
        Box::new(
            Concat::new()
                .with(Linear::<f64>::with_rng(4, 1, &mut r)?)?
                .with(Linear::<f64>::with_rng(4, 2, &mut r)?)?,
        ),
        Box::new(Recurrent::new(
            Box::new(Linear::<f64>::with_rng(4, 3, &mut r)?),
            Box::new(Linear::<f64>::with_rng(3, 3, &mut r)?),
            Box::new(Logistic::<f64>::new()),
        )?),
        Box::new(Lstm::<f64>::with_rng(4, 2, &mut r)?),
    ];
    for module in cases {
        assert_round_trip(module, &x)?;
    }
    Ok(())
}

#[test]
fn test_convolution_round_trips() -> Result<(), NeuraRustError> {
    let config = ConvolutionConfig::new(2, 5, 5, 3, 3, 3).with_stride(2).with_padding(1);
    let conv = Convolution::<f64>::with_rng(config, &mut rng(23))?;
    assert_round_trip(Box::new(conv), &random_tensor(&[2, 2, 5, 5], 24))
}

#[test]
fn test_sequencer_round_trips() -> Result<(), NeuraRustError> {
    let mut lstm = Lstm::<f64>::with_rng(3, 2, &mut rng(25))?;
    lstm.set_clip(Some(5.0))?;
    assert_round_trip(Box::new(Sequencer::new(Box::new(lstm))), &random_tensor(&[4, 2, 3], 26))
}

#[test]
fn test_trained_batchnorm_keeps_running_statistics() -> Result<(), NeuraRustError> {
    let mut norm = BatchNorm::<f64>::new(3)?;
    norm.forward(&random_tensor(&[8, 3], 27))?;
    norm.set_training(false);
    assert_round_trip(Box::new(norm), &random_tensor(&[2, 3], 28))
}

#[test]
fn test_unknown_kind_is_rejected() {
    let registry = ModuleRegistry::<f64>::with_builtins();
    let err = from_json(r#"{"kind":"Bilinear"}"#, &registry).unwrap_err();
    assert!(matches!(err, NeuraRustError::SerializationError(_)));
}
