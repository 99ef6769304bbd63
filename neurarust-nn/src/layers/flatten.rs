use crate::module::{batched, Module};
use crate::serialize::{ModuleNode, ModuleRegistry};
use neurarust_tensor::{NeuraNumeric, NeuraRustError, Tensor};

/// Reshapes `[batch, d1, d2, ...]` into `[batch, d1 * d2 * ...]`.
#[derive(Debug, Clone)]
pub struct Flatten<T> {
    shape: Vec<usize>,
    output: Tensor<T>,
    in_grad: Tensor<T>,
}

impl<T: NeuraNumeric> Flatten<T> {
    pub fn new() -> Self {
        Flatten {
            shape: Vec::new(),
            output: Tensor::empty(),
            in_grad: Tensor::empty(),
        }
    }

    pub fn load(node: &ModuleNode, _registry: &ModuleRegistry<T>) -> Result<Self, NeuraRustError> {
        node.expect_kind("Flatten")?;
        Ok(Self::new())
    }

    fn features(&self) -> usize {
        self.shape.iter().product()
    }
}

impl<T: NeuraNumeric> Default for Flatten<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: NeuraNumeric> Module<T> for Flatten<T> {
    fn type_name(&self) -> &'static str {
        "Flatten"
    }

    fn forward(&mut self, input: &Tensor<T>) -> Result<&Tensor<T>, NeuraRustError> {
        if input.rank() < 2 {
            return Err(NeuraRustError::shape_mismatch(&[0, 0], input.shape(), "Flatten forward"));
        }
        self.shape = input.feature_shape().to_vec();
        self.output.copy_from_(input);
        self.output.reshape(&[input.shape()[0], self.features()])?;
        Ok(&self.output)
    }

    fn backward(&mut self, input: &Tensor<T>, out_grad: &Tensor<T>) -> Result<&Tensor<T>, NeuraRustError> {
        let batch = out_grad.shape().first().copied().unwrap_or(0);
        input.expect_shape(&batched(batch, &self.shape), "Flatten backward")?;
        out_grad.expect_shape(self.output.shape(), "Flatten backward")?;
        self.in_grad.copy_from_(out_grad);
        self.in_grad.reshape(input.shape())?;
        Ok(&self.in_grad)
    }

    fn output(&self) -> &Tensor<T> {
        &self.output
    }

    fn in_grad(&self) -> &Tensor<T> {
        &self.in_grad
    }

    fn input_shape(&self) -> Vec<usize> {
        self.shape.clone()
    }

    fn output_shape(&self) -> Vec<usize> {
        if self.shape.is_empty() {
            Vec::new()
        } else {
            vec![self.features()]
        }
    }

    fn batch(&self) -> usize {
        self.output.shape().first().copied().unwrap_or(0)
    }

    fn set_inputs(&mut self, shape: &[usize]) -> Result<(), NeuraRustError> {
        self.shape = shape.to_vec();
        let batch = self.batch();
        self.set_batch(batch)
    }

    /// Only the flattened size matching the current input is accepted.
    fn set_outputs(&mut self, shape: &[usize]) -> Result<(), NeuraRustError> {
        if shape != self.output_shape().as_slice() {
            return Err(NeuraRustError::shape_mismatch(&self.output_shape(), shape, "Flatten set_outputs"));
        }
        Ok(())
    }

    fn set_batch(&mut self, batch: usize) -> Result<(), NeuraRustError> {
        self.output.resize(&batched(batch, &self.output_shape()));
        self.in_grad.resize(&batched(batch, &self.shape));
        Ok(())
    }

    fn clone_module(&self) -> Box<dyn Module<T>> {
        Box::new(self.clone())
    }

    fn save(&self) -> Result<ModuleNode, NeuraRustError> {
        Ok(ModuleNode::new("Flatten"))
    }
}

#[cfg(test)]
#[path = "flatten_test.rs"]
mod tests;
