use super::optimizer_trait::{ensure_accumulator, forward_backward, positive, unit_interval, Optimizer};
use crate::losses::Critic;
use crate::module::Module;
use neurarust_tensor::{NeuraNumeric, NeuraRustError, Tensor};

/// Hyper-parameters shared by [`Adam`] and [`crate::optim::Nadam`].
#[derive(Clone, Debug, PartialEq)]
pub struct AdamHyperParams {
    pub lr: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub eps: f64,
}

impl Default for AdamHyperParams {
    fn default() -> Self {
        AdamHyperParams {
            lr: 0.001,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
        }
    }
}

impl AdamHyperParams {
    pub fn validate(&self) -> Result<(), NeuraRustError> {
        positive("learning rate", self.lr)?;
        unit_interval("beta1", self.beta1)?;
        unit_interval("beta2", self.beta2)?;
        positive("epsilon", self.eps)
    }
}

/// First and second moment estimates with their bias-correction
/// normalizers `beta^t`.
#[derive(Debug, Clone)]
pub(crate) struct Moments<T> {
    pub(crate) first: Tensor<T>,
    pub(crate) second: Tensor<T>,
    beta1_power: f64,
    beta2_power: f64,
}

impl<T: NeuraNumeric> Moments<T> {
    pub(crate) fn new() -> Self {
        Moments {
            first: Tensor::empty(),
            second: Tensor::empty(),
            beta1_power: 1.0,
            beta2_power: 1.0,
        }
    }

    /// Folds `grad` into both moments and advances the normalizers by one
    /// step. Returns the bias corrections `(1 - beta1^t, 1 - beta2^t)`.
    pub(crate) fn accumulate(&mut self, grad: &Tensor<T>, hyper: &AdamHyperParams) -> (T, T) {
        ensure_accumulator(&mut self.first, grad.size(), "first moment");
        ensure_accumulator(&mut self.second, grad.size(), "second moment");
        let beta1 = T::from_f64_lossy(hyper.beta1);
        let beta2 = T::from_f64_lossy(hyper.beta2);
        for ((m, v), &g) in self
            .first
            .data_mut()
            .iter_mut()
            .zip(self.second.data_mut().iter_mut())
            .zip(grad.data())
        {
            *m = beta1 * *m + (T::one() - beta1) * g;
            *v = beta2 * *v + (T::one() - beta2) * g * g;
        }
        self.beta1_power *= hyper.beta1;
        self.beta2_power *= hyper.beta2;
        (
            T::from_f64_lossy(1.0 - self.beta1_power),
            T::from_f64_lossy(1.0 - self.beta2_power),
        )
    }

    /// Restarts the bias correction; the moment estimates are kept.
    pub(crate) fn reset_normalizers(&mut self) {
        self.beta1_power = 1.0;
        self.beta2_power = 1.0;
    }
}

/// Adam:
///
/// ```text
/// m = beta1 * m + (1 - beta1) * g
/// v = beta2 * v + (1 - beta2) * g^2
/// p = p - lr * (m / (1 - beta1^t)) / (sqrt(v / (1 - beta2^t)) + eps)
/// ```
#[derive(Debug)]
pub struct Adam<T: NeuraNumeric> {
    model: Box<dyn Module<T>>,
    critic: Box<dyn Critic<T>>,
    hyper: AdamHyperParams,
    moments: Moments<T>,
}

impl<T: NeuraNumeric> Adam<T> {
    pub fn new(
        model: Box<dyn Module<T>>,
        critic: Box<dyn Critic<T>>,
        hyper: AdamHyperParams,
    ) -> Result<Self, NeuraRustError> {
        hyper.validate()?;
        Ok(Adam {
            model,
            critic,
            hyper,
            moments: Moments::new(),
        })
    }

    pub fn hyper_params(&self) -> &AdamHyperParams {
        &self.hyper
    }

    pub fn first_moment(&self) -> &Tensor<T> {
        &self.moments.first
    }

    pub fn second_moment(&self) -> &Tensor<T> {
        &self.moments.second
    }

    pub fn into_model(self) -> Box<dyn Module<T>> {
        self.model
    }
}

impl<T: NeuraNumeric> Optimizer<T> for Adam<T> {
    fn step(&mut self, input: &Tensor<T>, target: &Tensor<T>) -> Result<T, NeuraRustError> {
        let loss = forward_backward(self.model.as_mut(), self.critic.as_mut(), input, target)?;
        let grad = self.model.grad();
        let mut params = self.model.parameters();
        let (correction1, correction2) = self.moments.accumulate(&grad, &self.hyper);

        let lr = T::from_f64_lossy(self.hyper.lr);
        let eps = T::from_f64_lossy(self.hyper.eps);
        for ((p, &m), &v) in params
            .data_mut()
            .iter_mut()
            .zip(self.moments.first.data())
            .zip(self.moments.second.data())
        {
            let m_hat = m / correction1;
            let v_hat = v / correction2;
            *p -= lr * m_hat / (v_hat.sqrt() + eps);
        }
        self.model.set_parameters(&params)?;
        log::trace!("Adam step loss {}", loss);
        Ok(loss)
    }

    /// Resets the bias-correction normalizers only; the moment estimates
    /// carry over.
    fn reset(&mut self) {
        self.moments.reset_normalizers();
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
#[path = "adam_test.rs"]
mod tests;
