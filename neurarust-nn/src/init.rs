//! Parameter initialization helpers.

use neurarust_tensor::{NeuraNumeric, Tensor};
use rand::Rng;
use rand_distr::StandardNormal;

/// Fills `tensor` with independent draws from the standard normal distribution.
///
/// Draws are made in `f64` and converted, so `f32` and `f64` tensors see the
/// same sequence for the same RNG.
pub fn normal_<T: NeuraNumeric, R: Rng + ?Sized>(tensor: &mut Tensor<T>, rng: &mut R) {
    for x in tensor.data_mut() {
        let v: f64 = rng.sample(StandardNormal);
        *x = T::from_f64_lossy(v);
    }
}

/// Fills the input `Tensor` with the scalar value 0.
pub fn zeros_<T: NeuraNumeric>(tensor: &mut Tensor<T>) {
    tensor.fill_(T::zero());
}

/// Fills the input `Tensor` with the scalar value 1.
pub fn ones_<T: NeuraNumeric>(tensor: &mut Tensor<T>) {
    tensor.fill_(T::one());
}

#[cfg(test)]
#[path = "init_test.rs"]
mod tests;
