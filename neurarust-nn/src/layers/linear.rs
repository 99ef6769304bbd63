use crate::init::normal_;
use crate::module::{check_input, Module};
use crate::serialize::{ModuleNode, ModuleRegistry};
use neurarust_tensor::linalg::{gemm, gemv, ger, Transpose};
use neurarust_tensor::{NeuraNumeric, NeuraRustError, Tensor};
use rand::Rng;

/// Applies an affine transformation to the incoming data: `y = x W + b`.
///
/// `W` is stored as `[inputs, outputs]` and `b` as `[outputs]`. The bias is
/// broadcast over the batch with a rank-1 update against a cached column of
/// ones, so forward and backward are pure BLAS-style calls.
#[derive(Debug, Clone)]
pub struct Linear<T> {
    weights: Tensor<T>,
    bias: Tensor<T>,
    weights_grad: Tensor<T>,
    bias_grad: Tensor<T>,
    ones: Tensor<T>,
    output: Tensor<T>,
    in_grad: Tensor<T>,
}

impl<T: NeuraNumeric> Linear<T> {
    /// Creates a new Linear layer with standard-normal weights and bias.
    ///
    /// # Errors
    /// Returns `ConfigurationError` if either size is zero.
    pub fn new(inputs: usize, outputs: usize) -> Result<Self, NeuraRustError> {
        Self::with_rng(inputs, outputs, &mut rand::thread_rng())
    }

    /// Same as [`Linear::new`], drawing the initial parameters from `rng`.
    pub fn with_rng<R: Rng + ?Sized>(inputs: usize, outputs: usize, rng: &mut R) -> Result<Self, NeuraRustError> {
        if inputs == 0 || outputs == 0 {
            return Err(NeuraRustError::ConfigurationError(format!(
                "Linear layer sizes must be positive, got {}x{}",
                inputs, outputs
            )));
        }
        let mut layer = Self::zeroed(inputs, outputs);
        layer.randomize(rng);
        Ok(layer)
    }

    /// Builds a layer from explicit parameters.
    ///
    /// # Errors
    /// Returns `ShapeMismatch` unless `weights` is `[inputs, outputs]` and
    /// `bias` is `[outputs]`.
    pub fn from_parts(weights: Tensor<T>, bias: Tensor<T>) -> Result<Self, NeuraRustError> {
        let (inputs, outputs) = weights.expect_matrix("Linear weights")?;
        bias.expect_shape(&[outputs], "Linear bias")?;
        let mut layer = Self::zeroed(inputs, outputs);
        layer.weights = weights;
        layer.bias = bias;
        Ok(layer)
    }

    fn zeroed(inputs: usize, outputs: usize) -> Self {
        Linear {
            weights: Tensor::zeros(&[inputs, outputs]),
            bias: Tensor::zeros(&[outputs]),
            weights_grad: Tensor::zeros(&[inputs, outputs]),
            bias_grad: Tensor::zeros(&[outputs]),
            ones: Tensor::empty(),
            output: Tensor::empty(),
            in_grad: Tensor::empty(),
        }
    }

    /// Redraws weights and bias from the standard normal distribution.
    pub fn randomize<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        normal_(&mut self.weights, rng);
        normal_(&mut self.bias, rng);
    }

    pub fn weights(&self) -> &Tensor<T> {
        &self.weights
    }

    pub fn bias(&self) -> &Tensor<T> {
        &self.bias
    }

    pub fn weights_grad(&self) -> &Tensor<T> {
        &self.weights_grad
    }

    pub fn bias_grad(&self) -> &Tensor<T> {
        &self.bias_grad
    }

    pub fn inputs(&self) -> usize {
        self.weights.shape()[0]
    }

    pub fn outputs(&self) -> usize {
        self.weights.shape()[1]
    }

    fn resize_parameters(&mut self, inputs: usize, outputs: usize) -> Result<(), NeuraRustError> {
        if inputs == 0 || outputs == 0 {
            return Err(NeuraRustError::ConfigurationError(format!(
                "Linear layer sizes must be positive, got {}x{}",
                inputs, outputs
            )));
        }
        if inputs == self.inputs() && outputs == self.outputs() {
            return Ok(());
        }
        log::debug!(
            "Linear resized from {}x{} to {}x{}, re-randomizing parameters",
            self.inputs(),
            self.outputs(),
            inputs,
            outputs
        );
        let batch = self.batch();
        *self = Self::zeroed(inputs, outputs);
        self.randomize(&mut rand::thread_rng());
        self.set_batch(batch)
    }

    fn ensure_ones(&mut self, batch: usize) {
        if self.ones.size() != batch {
            self.ones = Tensor::ones(&[batch]);
        }
    }

    pub fn load(node: &ModuleNode, _registry: &ModuleRegistry<T>) -> Result<Self, NeuraRustError> {
        node.expect_kind("Linear")?;
        Self::from_parts(node.tensor("weights")?, node.tensor("bias")?)
    }
}

impl<T: NeuraNumeric> Module<T> for Linear<T> {
    fn type_name(&self) -> &'static str {
        "Linear"
    }

    fn forward(&mut self, input: &Tensor<T>) -> Result<&Tensor<T>, NeuraRustError> {
        let batch = check_input(input, &[self.inputs()], "Linear forward")?;
        self.ensure_ones(batch);
        self.output.resize(&[batch, self.outputs()]);
        gemm(T::one(), input, Transpose::No, &self.weights, Transpose::No, T::zero(), &mut self.output)?;
        ger(T::one(), self.ones.data(), self.bias.data(), &mut self.output)?;
        Ok(&self.output)
    }

    fn backward(&mut self, input: &Tensor<T>, out_grad: &Tensor<T>) -> Result<&Tensor<T>, NeuraRustError> {
        let batch = check_input(input, &[self.inputs()], "Linear backward")?;
        out_grad.expect_shape(&[batch, self.outputs()], "Linear backward")?;
        self.ensure_ones(batch);

        gemv(T::one(), out_grad, Transpose::Yes, self.ones.data(), T::one(), self.bias_grad.data_mut())?;
        gemm(T::one(), input, Transpose::Yes, out_grad, Transpose::No, T::one(), &mut self.weights_grad)?;

        self.in_grad.resize(&[batch, self.inputs()]);
        gemm(T::one(), out_grad, Transpose::No, &self.weights, Transpose::Yes, T::zero(), &mut self.in_grad)?;
        Ok(&self.in_grad)
    }

    fn output(&self) -> &Tensor<T> {
        &self.output
    }

    fn in_grad(&self) -> &Tensor<T> {
        &self.in_grad
    }

    fn input_shape(&self) -> Vec<usize> {
        vec![self.inputs()]
    }

    fn output_shape(&self) -> Vec<usize> {
        vec![self.outputs()]
    }

    fn batch(&self) -> usize {
        self.ones.size()
    }

    fn set_inputs(&mut self, shape: &[usize]) -> Result<(), NeuraRustError> {
        match shape {
            [inputs] => self.resize_parameters(*inputs, self.outputs()),
            _ => Err(NeuraRustError::shape_mismatch(&[self.inputs()], shape, "Linear set_inputs")),
        }
    }

    fn set_outputs(&mut self, shape: &[usize]) -> Result<(), NeuraRustError> {
        match shape {
            [outputs] => self.resize_parameters(self.inputs(), *outputs),
            _ => Err(NeuraRustError::shape_mismatch(&[self.outputs()], shape, "Linear set_outputs")),
        }
    }

    fn set_batch(&mut self, batch: usize) -> Result<(), NeuraRustError> {
        self.ensure_ones(batch);
        self.output.resize(&[batch, self.outputs()]);
        self.in_grad.resize(&[batch, self.inputs()]);
        Ok(())
    }

    fn params(&self) -> Vec<&Tensor<T>> {
        vec![&self.weights, &self.bias]
    }

    fn params_mut(&mut self) -> Vec<&mut Tensor<T>> {
        vec![&mut self.weights, &mut self.bias]
    }

    fn grads(&self) -> Vec<&Tensor<T>> {
        vec![&self.weights_grad, &self.bias_grad]
    }

    fn grads_mut(&mut self) -> Vec<&mut Tensor<T>> {
        vec![&mut self.weights_grad, &mut self.bias_grad]
    }

    fn clone_module(&self) -> Box<dyn Module<T>> {
        Box::new(self.clone())
    }

    fn save(&self) -> Result<ModuleNode, NeuraRustError> {
        Ok(ModuleNode::new("Linear")
            .with_tensor("weights", &self.weights)
            .with_tensor("bias", &self.bias))
    }
}

#[cfg(test)]
#[path = "linear_test.rs"]
mod tests;
