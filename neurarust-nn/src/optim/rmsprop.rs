use super::optimizer_trait::{ensure_accumulator, forward_backward, positive, unit_interval, Optimizer};
use crate::losses::Critic;
use crate::module::Module;
use neurarust_tensor::{NeuraNumeric, NeuraRustError, Tensor};

#[derive(Clone, Debug, PartialEq)]
pub struct RmsPropHyperParams {
    pub lr: f64,
    /// Decay of the squared-gradient average.
    pub gamma: f64,
    pub eps: f64,
}

impl Default for RmsPropHyperParams {
    fn default() -> Self {
        RmsPropHyperParams {
            lr: 0.001,
            gamma: 0.9,
            eps: 1e-8,
        }
    }
}

impl RmsPropHyperParams {
    pub fn validate(&self) -> Result<(), NeuraRustError> {
        positive("learning rate", self.lr)?;
        unit_interval("gamma", self.gamma)?;
        positive("epsilon", self.eps)
    }
}

/// RMSProp:
///
/// ```text
/// r = gamma * r + (1 - gamma) * g^2
/// p = p - lr * g / (sqrt(r) + eps)
/// ```
#[derive(Debug)]
pub struct RmsProp<T: NeuraNumeric> {
    model: Box<dyn Module<T>>,
    critic: Box<dyn Critic<T>>,
    hyper: RmsPropHyperParams,
    square_avg: Tensor<T>,
}

impl<T: NeuraNumeric> RmsProp<T> {
    pub fn new(
        model: Box<dyn Module<T>>,
        critic: Box<dyn Critic<T>>,
        hyper: RmsPropHyperParams,
    ) -> Result<Self, NeuraRustError> {
        hyper.validate()?;
        Ok(RmsProp {
            model,
            critic,
            hyper,
            square_avg: Tensor::empty(),
        })
    }

    pub fn hyper_params(&self) -> &RmsPropHyperParams {
        &self.hyper
    }

    pub fn square_avg(&self) -> &Tensor<T> {
        &self.square_avg
    }

    pub fn into_model(self) -> Box<dyn Module<T>> {
        self.model
    }
}

impl<T: NeuraNumeric> Optimizer<T> for RmsProp<T> {
    fn step(&mut self, input: &Tensor<T>, target: &Tensor<T>) -> Result<T, NeuraRustError> {
        let loss = forward_backward(self.model.as_mut(), self.critic.as_mut(), input, target)?;
        let grad = self.model.grad();
        let mut params = self.model.parameters();
        ensure_accumulator(&mut self.square_avg, params.size(), "RMSProp square average");

        let lr = T::from_f64_lossy(self.hyper.lr);
        let gamma = T::from_f64_lossy(self.hyper.gamma);
        let eps = T::from_f64_lossy(self.hyper.eps);
        for ((p, r), &g) in params
            .data_mut()
            .iter_mut()
            .zip(self.square_avg.data_mut().iter_mut())
            .zip(grad.data())
        {
            *r = gamma * *r + (T::one() - gamma) * g * g;
            *p -= lr * g / (r.sqrt() + eps);
        }
        self.model.set_parameters(&params)?;
        log::trace!("RMSProp step loss {}", loss);
        Ok(loss)
    }

    /// Zeroes the squared-gradient average.
    fn reset(&mut self) {
        self.square_avg.fill_(T::zero());
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
#[path = "rmsprop_test.rs"]
mod tests;
