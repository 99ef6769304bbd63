pub mod batchnorm;
pub mod convolution;
pub mod dropconnect;
pub mod dropout;
pub mod flatten;
pub mod linear;
pub mod map;
pub mod softmax;

pub use batchnorm::BatchNorm;
pub use convolution::{Convolution, ConvolutionConfig};
pub use dropconnect::DropConnect;
pub use dropout::Dropout;
pub use flatten::Flatten;
pub use linear::Linear;
pub use map::{Activation, Identity, Logistic, Map, ReLU, TanH};
pub use softmax::{LogSoftMax, SoftMax};
