use crate::serialize::ModuleNode;
use neurarust_tensor::tensor::{flatten, unflatten_into};
use neurarust_tensor::{NeuraNumeric, NeuraRustError, Tensor};
use std::fmt::Debug;

/// The base trait for all neural network modules (layers, containers, etc.).
///
/// A module caches the result of its last `forward` in an internally owned
/// output buffer and the result of its last `backward` in an input-gradient
/// buffer; both are handed out by reference and invalidated by the next call.
///
/// Shapes reported by [`Module::input_shape`] and [`Module::output_shape`]
/// exclude the leading batch dimension. An empty shape means "not yet
/// known" (shape-agnostic modules learn it from their first input).
///
/// Parameter gradients accumulate across `backward` calls until
/// [`Module::zero_grad`] is called.
pub trait Module<T: NeuraNumeric>: Debug + Send {
    /// Stable type name used as the serialization tag.
    fn type_name(&self) -> &'static str;

    /// Computes and caches the output for a `[batch, ...input_shape]` input.
    ///
    /// # Errors
    /// Returns `ShapeMismatch` if the feature dimensions differ from what the
    /// module expects.
    fn forward(&mut self, input: &Tensor<T>) -> Result<&Tensor<T>, NeuraRustError>;

    /// Computes the input gradient and accumulates parameter gradients.
    ///
    /// `input` must be the tensor passed to the matching `forward` call and
    /// `out_grad` must have the shape of [`Module::output`].
    fn backward(&mut self, input: &Tensor<T>, out_grad: &Tensor<T>) -> Result<&Tensor<T>, NeuraRustError>;

    /// The most recent output (empty before the first `forward`).
    fn output(&self) -> &Tensor<T>;

    /// The most recent input gradient (empty before the first `backward`).
    fn in_grad(&self) -> &Tensor<T>;

    fn input_shape(&self) -> Vec<usize>;

    fn output_shape(&self) -> Vec<usize>;

    /// Leading dimension of the cached buffers.
    fn batch(&self) -> usize;

    /// Changes the expected input feature shape. Layers whose parameters
    /// depend on it re-initialize them.
    fn set_inputs(&mut self, shape: &[usize]) -> Result<(), NeuraRustError>;

    /// Changes the produced output feature shape.
    fn set_outputs(&mut self, shape: &[usize]) -> Result<(), NeuraRustError>;

    /// Resizes only the batch dimension of the cached buffers (and of any
    /// per-batch state). Parameters are never touched.
    fn set_batch(&mut self, batch: usize) -> Result<(), NeuraRustError>;

    /// Learnable tensors, in canonical order.
    fn params(&self) -> Vec<&Tensor<T>> {
        Vec::new()
    }

    fn params_mut(&mut self) -> Vec<&mut Tensor<T>> {
        Vec::new()
    }

    /// Parameter gradients, parallel to [`Module::params`].
    fn grads(&self) -> Vec<&Tensor<T>> {
        Vec::new()
    }

    fn grads_mut(&mut self) -> Vec<&mut Tensor<T>> {
        Vec::new()
    }

    /// Persistent non-learnable tensors (running statistics, hidden state).
    fn states(&self) -> Vec<&Tensor<T>> {
        Vec::new()
    }

    fn states_mut(&mut self) -> Vec<&mut Tensor<T>> {
        Vec::new()
    }

    /// Switches between training and inference behavior.
    fn set_training(&mut self, _training: bool) {}

    fn is_training(&self) -> bool {
        true
    }

    /// Zeroes any hidden state carried between time steps.
    fn reset_state(&mut self) {}

    /// Marks the next `backward` as the first of a new reverse sweep, so
    /// gradients carried across time steps start from zero.
    fn reset_state_grad(&mut self) {}

    /// Deep copy that shares no storage with `self`.
    fn clone_module(&self) -> Box<dyn Module<T>>;

    /// Serializes shape, options and parameters (children recursively).
    fn save(&self) -> Result<ModuleNode, NeuraRustError>;

    /// All parameters gathered into one rank-1 tensor.
    ///
    /// This is a copy: write it back with [`Module::set_parameters`].
    fn parameters(&self) -> Tensor<T> {
        flatten(&self.params())
    }

    fn set_parameters(&mut self, flat: &Tensor<T>) -> Result<(), NeuraRustError> {
        unflatten_into(flat, &mut self.params_mut())
    }

    /// All parameter gradients gathered into one rank-1 tensor.
    fn grad(&self) -> Tensor<T> {
        flatten(&self.grads())
    }

    fn set_grad(&mut self, flat: &Tensor<T>) -> Result<(), NeuraRustError> {
        unflatten_into(flat, &mut self.grads_mut())
    }

    fn zero_grad(&mut self) {
        for g in self.grads_mut() {
            g.fill_(T::zero());
        }
    }

    /// All state tensors gathered into one rank-1 tensor.
    fn state(&self) -> Tensor<T> {
        flatten(&self.states())
    }

    fn set_state(&mut self, flat: &Tensor<T>) -> Result<(), NeuraRustError> {
        unflatten_into(flat, &mut self.states_mut())
    }

    fn parameter_count(&self) -> usize {
        self.params().iter().map(|p| p.size()).sum()
    }
}

impl<T: NeuraNumeric> Clone for Box<dyn Module<T>> {
    fn clone(&self) -> Self {
        self.clone_module()
    }
}

/// A module that owns an ordered list of child modules.
///
/// Wrappers with a fixed structure (DropConnect, Recurrent, LSTM) implement
/// this to expose their children but reject structural mutation with
/// `UsageError`.
pub trait Container<T: NeuraNumeric>: Module<T> {
    fn add(&mut self, module: Box<dyn Module<T>>) -> Result<(), NeuraRustError>;

    fn remove(&mut self, index: usize) -> Result<Box<dyn Module<T>>, NeuraRustError>;

    fn clear(&mut self) -> Result<(), NeuraRustError>;

    fn components(&self) -> Vec<&dyn Module<T>>;

    fn len(&self) -> usize {
        self.components().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// `true` once every dimension of `shape` is known and non-zero.
pub fn shape_is_set(shape: &[usize]) -> bool {
    !shape.is_empty() && shape.iter().all(|&d| d > 0)
}

/// Checks that `input` is `[batch, ...features]` and returns `batch`.
pub fn check_input<T: NeuraNumeric>(
    input: &Tensor<T>,
    features: &[usize],
    operation: &str,
) -> Result<usize, NeuraRustError> {
    if input.rank() != features.len() + 1 || input.feature_shape() != features {
        let batch = input.shape().first().copied().unwrap_or(0);
        return Err(NeuraRustError::shape_mismatch(
            &batched(batch, features),
            input.shape(),
            operation,
        ));
    }
    Ok(input.shape()[0])
}

/// `[batch, ...features]`.
pub fn batched(batch: usize, features: &[usize]) -> Vec<usize> {
    let mut shape = Vec::with_capacity(features.len() + 1);
    shape.push(batch);
    shape.extend_from_slice(features);
    shape
}

pub(crate) fn usage_error(message: impl Into<String>) -> NeuraRustError {
    NeuraRustError::UsageError(message.into())
}

#[cfg(test)]
#[path = "module_test.rs"]
mod tests;
