//! Loss functions ("critics"): a scalar comparing a prediction to a target,
//! and its gradient with respect to the prediction.

pub mod critic_sequencer;
pub mod cross_entropy;
pub mod mse;
pub mod nll;
pub mod sse;

pub use critic_sequencer::CriticSequencer;
pub use cross_entropy::CrossEntropy;
pub use mse::Mse;
pub use nll::Nll;
pub use sse::Sse;

use crate::serialize::ModuleNode;
use neurarust_tensor::{NeuraNumeric, NeuraRustError, Tensor};
use std::fmt::Debug;

/// A loss function over `[batch, ...]` predictions.
///
/// Like a [`crate::module::Module`], a critic owns the buffer its last
/// gradient lives in and hands it out by reference.
pub trait Critic<T: NeuraNumeric>: Debug + Send {
    /// Stable type name used as the serialization tag.
    fn type_name(&self) -> &'static str;

    /// The loss of `prediction` against `target`.
    fn forward(&mut self, prediction: &Tensor<T>, target: &Tensor<T>) -> Result<T, NeuraRustError>;

    /// The gradient of the loss with respect to `prediction`.
    fn backward(&mut self, prediction: &Tensor<T>, target: &Tensor<T>) -> Result<&Tensor<T>, NeuraRustError>;

    /// The most recent gradient (empty before the first `backward`).
    fn in_grad(&self) -> &Tensor<T>;

    fn clone_critic(&self) -> Box<dyn Critic<T>>;

    fn save(&self) -> Result<ModuleNode, NeuraRustError> {
        Ok(ModuleNode::new(self.type_name()))
    }
}

impl<T: NeuraNumeric> Clone for Box<dyn Critic<T>> {
    fn clone(&self) -> Self {
        self.clone_critic()
    }
}

/// Rebuilds a critic saved with [`Critic::save`].
///
/// # Errors
/// Returns `SerializationError` for an unknown type tag.
pub fn load_critic<T: NeuraNumeric>(node: &ModuleNode) -> Result<Box<dyn Critic<T>>, NeuraRustError> {
    let critic: Box<dyn Critic<T>> = match node.kind.as_str() {
        "MSE" => Box::new(Mse::new()),
        "SSE" => Box::new(Sse::new()),
        "NLL" => Box::new(Nll::new()),
        "CrossEntropy" => Box::new(CrossEntropy::new()),
        "CriticSequencer" => Box::new(CriticSequencer::new(load_critic(node.child(0)?)?)),
        other => {
            return Err(NeuraRustError::SerializationError(format!(
                "unknown critic type '{}'",
                other
            )))
        }
    };
    Ok(critic)
}

fn check_same_shape<T: NeuraNumeric>(
    prediction: &Tensor<T>,
    target: &Tensor<T>,
    operation: &str,
) -> Result<(), NeuraRustError> {
    prediction.expect_shape(target.shape(), operation)
}

#[cfg(test)]
#[path = "losses_test.rs"]
mod tests;
