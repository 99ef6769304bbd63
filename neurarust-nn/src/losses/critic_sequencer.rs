use super::Critic;
use crate::serialize::ModuleNode;
use neurarust_tensor::{NeuraNumeric, NeuraRustError, Tensor};

/// Applies a matrix critic to `[sequence, batch, ...features]` tensors by
/// folding the sequence into the batch dimension.
#[derive(Debug, Clone)]
pub struct CriticSequencer<T: NeuraNumeric> {
    critic: Box<dyn Critic<T>>,
    in_grad: Tensor<T>,
}

impl<T: NeuraNumeric> CriticSequencer<T> {
    pub fn new(critic: Box<dyn Critic<T>>) -> Self {
        CriticSequencer {
            critic,
            in_grad: Tensor::empty(),
        }
    }

    pub fn critic(&self) -> &dyn Critic<T> {
        self.critic.as_ref()
    }

    /// `[s, b, f...]` -> `[s * b, f...]`.
    fn fold(tensor: &Tensor<T>, operation: &str) -> Result<Tensor<T>, NeuraRustError> {
        match tensor.shape() {
            [sequence, batch, features @ ..] => {
                let mut shape = vec![sequence * batch];
                shape.extend_from_slice(features);
                tensor.reshaped(&shape)
            }
            shape => Err(NeuraRustError::shape_mismatch(&[0, 0], shape, operation)),
        }
    }
}

impl<T: NeuraNumeric> Critic<T> for CriticSequencer<T> {
    fn type_name(&self) -> &'static str {
        "CriticSequencer"
    }

    fn forward(&mut self, prediction: &Tensor<T>, target: &Tensor<T>) -> Result<T, NeuraRustError> {
        let p = Self::fold(prediction, "CriticSequencer forward")?;
        let t = Self::fold(target, "CriticSequencer forward")?;
        self.critic.forward(&p, &t)
    }

    fn backward(&mut self, prediction: &Tensor<T>, target: &Tensor<T>) -> Result<&Tensor<T>, NeuraRustError> {
        let p = Self::fold(prediction, "CriticSequencer backward")?;
        let t = Self::fold(target, "CriticSequencer backward")?;
        self.in_grad = self.critic.backward(&p, &t)?.reshaped(prediction.shape())?;
        Ok(&self.in_grad)
    }

    fn in_grad(&self) -> &Tensor<T> {
        &self.in_grad
    }

    fn clone_critic(&self) -> Box<dyn Critic<T>> {
        Box::new(self.clone())
    }

    fn save(&self) -> Result<ModuleNode, NeuraRustError> {
        Ok(ModuleNode::new("CriticSequencer").with_child(self.critic.save()?))
    }
}
