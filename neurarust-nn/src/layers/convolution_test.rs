use super::{Convolution, ConvolutionConfig};
use crate::module::Module;
use neurarust_tensor::{NeuraRustError, Tensor};

fn box_filter(config: ConvolutionConfig) -> Result<Convolution<f64>, NeuraRustError> {
    let patch = config.channels * config.kernel_rows * config.kernel_cols;
    Convolution::from_parts(
        config,
        Tensor::ones(&[config.filters, patch]),
        Tensor::zeros(&[config.filters]),
    )
}

fn image() -> Tensor<f64> {
    // 1 image, 1 channel, 3x3: 1..9
    Tensor::new((1..=9).map(|v| v as f64).collect(), vec![1, 1, 3, 3]).unwrap()
}

#[test]
fn test_window_sums() -> Result<(), NeuraRustError> {
    let mut layer = box_filter(ConvolutionConfig::new(1, 3, 3, 1, 2, 2))?;
    let y = layer.forward(&image())?;
    assert_eq!(y.shape(), &[1, 1, 2, 2]);
    assert_eq!(y.data(), &[12.0, 16.0, 24.0, 28.0]);
    Ok(())
}

#[test]
fn test_stride_and_padding_geometry() -> Result<(), NeuraRustError> {
    let config = ConvolutionConfig::new(1, 3, 3, 2, 2, 2).with_stride(2).with_padding(1);
    assert_eq!((config.output_rows(), config.output_cols()), (2, 2));
    let mut layer = box_filter(config)?;
    let y = layer.forward(&image())?;
    assert_eq!(y.shape(), &[1, 2, 2, 2]);
    // Top-left window only sees the corner element
    assert_eq!(&y.data()[..4], &[1.0, 5.0, 11.0, 28.0]);
    Ok(())
}

#[test]
fn test_backward_counts_window_coverage() -> Result<(), NeuraRustError> {
    let mut layer = box_filter(ConvolutionConfig::new(1, 3, 3, 1, 2, 2))?;
    let x = image();
    layer.forward(&x)?;
    let d = layer.backward(&x, &Tensor::ones(&[1, 1, 2, 2]))?;
    // Each input element receives one unit per window covering it
    assert_eq!(d.data(), &[1.0, 2.0, 1.0, 2.0, 4.0, 2.0, 1.0, 2.0, 1.0]);
    let grad = layer.grad();
    // dW[k] = sum of the elements seen at offset k, then the bias gradient
    assert_eq!(grad.data(), &[12.0, 16.0, 24.0, 28.0, 4.0]);
    Ok(())
}

#[test]
fn test_multi_channel_batch() -> Result<(), NeuraRustError> {
    let mut layer = box_filter(ConvolutionConfig::new(2, 2, 2, 1, 2, 2))?;
    let x = Tensor::new((0..16).map(|v| v as f64).collect(), vec![2, 2, 2, 2])?;
    let y = layer.forward(&x)?;
    assert_eq!(y.shape(), &[2, 1, 1, 1]);
    assert_eq!(y.data(), &[28.0, 92.0]);
    Ok(())
}

#[test]
fn test_invalid_geometry() {
    assert!(ConvolutionConfig::new(1, 2, 2, 1, 3, 3).validate().is_err());
    assert!(ConvolutionConfig::new(1, 2, 2, 1, 3, 3).with_padding(1).validate().is_ok());
    assert!(ConvolutionConfig::new(1, 4, 4, 1, 2, 2).with_stride(0).validate().is_err());
    assert!(Convolution::<f32>::new(ConvolutionConfig::new(0, 4, 4, 1, 2, 2)).is_err());
}

#[test]
fn test_wrong_input_shape() -> Result<(), NeuraRustError> {
    let mut layer = box_filter(ConvolutionConfig::new(1, 3, 3, 1, 2, 2))?;
    assert!(layer.forward(&Tensor::zeros(&[1, 2, 3, 3])).is_err());
    Ok(())
}
