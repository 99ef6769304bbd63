use super::optimizer_trait::{ensure_accumulator, forward_backward, positive, unit_interval, Optimizer};
use crate::losses::Critic;
use crate::module::Module;
use neurarust_tensor::{NeuraNumeric, NeuraRustError, Tensor};

#[derive(Clone, Debug, PartialEq)]
pub struct SgdHyperParams {
    pub lr: f64,
    pub momentum: f64,
    pub weight_decay: f64,
}

impl Default for SgdHyperParams {
    fn default() -> Self {
        SgdHyperParams {
            lr: 0.01,
            momentum: 0.0,
            weight_decay: 0.0,
        }
    }
}

impl SgdHyperParams {
    pub fn validate(&self) -> Result<(), NeuraRustError> {
        positive("learning rate", self.lr)?;
        unit_interval("momentum", self.momentum)?;
        if self.weight_decay.is_nan() || self.weight_decay < 0.0 {
            return Err(NeuraRustError::ConfigurationError(format!(
                "weight decay must be non-negative, got {}",
                self.weight_decay
            )));
        }
        Ok(())
    }
}

/// Stochastic gradient descent with optional momentum and L2 weight decay:
///
/// ```text
/// v = momentum * v + (g + weight_decay * p)
/// p = p - lr * v
/// ```
#[derive(Debug)]
pub struct Sgd<T: NeuraNumeric> {
    model: Box<dyn Module<T>>,
    critic: Box<dyn Critic<T>>,
    hyper: SgdHyperParams,
    velocity: Tensor<T>,
}

impl<T: NeuraNumeric> Sgd<T> {
    pub fn new(
        model: Box<dyn Module<T>>,
        critic: Box<dyn Critic<T>>,
        hyper: SgdHyperParams,
    ) -> Result<Self, NeuraRustError> {
        hyper.validate()?;
        Ok(Sgd {
            model,
            critic,
            hyper,
            velocity: Tensor::empty(),
        })
    }

    pub fn hyper_params(&self) -> &SgdHyperParams {
        &self.hyper
    }

    pub fn set_hyper_params(&mut self, hyper: SgdHyperParams) -> Result<(), NeuraRustError> {
        hyper.validate()?;
        self.hyper = hyper;
        Ok(())
    }

    pub fn velocity(&self) -> &Tensor<T> {
        &self.velocity
    }

    /// Gives the model back.
    pub fn into_model(self) -> Box<dyn Module<T>> {
        self.model
    }
}

impl<T: NeuraNumeric> Optimizer<T> for Sgd<T> {
    fn step(&mut self, input: &Tensor<T>, target: &Tensor<T>) -> Result<T, NeuraRustError> {
        let loss = forward_backward(self.model.as_mut(), self.critic.as_mut(), input, target)?;
        let grad = self.model.grad();
        let mut params = self.model.parameters();
        ensure_accumulator(&mut self.velocity, params.size(), "SGD velocity");

        let lr = T::from_f64_lossy(self.hyper.lr);
        let momentum = T::from_f64_lossy(self.hyper.momentum);
        let decay = T::from_f64_lossy(self.hyper.weight_decay);
        for ((p, v), &g) in params
            .data_mut()
            .iter_mut()
            .zip(self.velocity.data_mut().iter_mut())
            .zip(grad.data())
        {
            *v = momentum * *v + g + decay * *p;
            *p -= lr * *v;
        }
        self.model.set_parameters(&params)?;
        log::trace!("SGD step loss {}", loss);
        Ok(loss)
    }

    /// Zeroes the velocity.
    fn reset(&mut self) {
        self.velocity.fill_(T::zero());
    }

    fn model(&self) -> &dyn Module<T> {
        self.model.as_ref()
    }

    fn model_mut(&mut self) -> &mut dyn Module<T> {
        self.model.as_mut()
    }

    fn critic(&self) -> &dyn Critic<T> {
        self.critic.as_ref()
    }
}

#[cfg(test)]
#[path = "sgd_test.rs"]
mod tests;
