use super::adam::{AdamHyperParams, Moments};
use super::optimizer_trait::{forward_backward, Optimizer};
use crate::losses::Critic;
use crate::module::Module;
use neurarust_tensor::{NeuraNumeric, NeuraRustError, Tensor};

/// Adam with a Nesterov look-ahead on the first moment:
///
/// ```text
/// m_bar = beta1 * m / (1 - beta1^t) + (1 - beta1) * g / (1 - beta1^t)
/// p     = p - lr * m_bar / (sqrt(v / (1 - beta2^t)) + eps)
/// ```
#[derive(Debug)]
pub struct Nadam<T: NeuraNumeric> {
    model: Box<dyn Module<T>>,
    critic: Box<dyn Critic<T>>,
    hyper: AdamHyperParams,
    moments: Moments<T>,
}

impl<T: NeuraNumeric> Nadam<T> {
    pub fn new(
        model: Box<dyn Module<T>>,
        critic: Box<dyn Critic<T>>,
        hyper: AdamHyperParams,
    ) -> Result<Self, NeuraRustError> {
        hyper.validate()?;
        Ok(Nadam {
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

    pub fn into_model(self) -> Box<dyn Module<T>> {
        self.model
    }
}

impl<T: NeuraNumeric> Optimizer<T> for Nadam<T> {
    fn step(&mut self, input: &Tensor<T>, target: &Tensor<T>) -> Result<T, NeuraRustError> {
        let loss = forward_backward(self.model.as_mut(), self.critic.as_mut(), input, target)?;
        let grad = self.model.grad();
        let mut params = self.model.parameters();
        let (correction1, correction2) = self.moments.accumulate(&grad, &self.hyper);

        let lr = T::from_f64_lossy(self.hyper.lr);
        let eps = T::from_f64_lossy(self.hyper.eps);
        let beta1 = T::from_f64_lossy(self.hyper.beta1);
        for (((p, &m), &v), &g) in params
            .data_mut()
            .iter_mut()
            .zip(self.moments.first.data())
            .zip(self.moments.second.data())
            .zip(grad.data())
        {
            let m_bar = beta1 * m / correction1 + (T::one() - beta1) * g / correction1;
            let v_hat = v / correction2;
            *p -= lr * m_bar / (v_hat.sqrt() + eps);
        }
        self.model.set_parameters(&params)?;
        log::trace!("Nadam step loss {}", loss);
        Ok(loss)
    }

    /// Resets the bias-correction normalizers only, as [`crate::optim::Adam`]
    /// does.
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
#[path = "nadam_test.rs"]
mod tests;
