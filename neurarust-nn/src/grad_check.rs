//! Finite-difference checks of analytic gradients.
//!
//! Modules are checked through the scalar objective `sum(output ⊙ R)`,
//! where `R` is a fixed random projection, so `backward(x, R)` yields the
//! exact derivative of the objective. Every perturbed evaluation starts from
//! the same module state, which makes recurrent modules and BatchNorm
//! checkable. Stochastic layers must be in inference mode (or otherwise
//! deterministic) for the check to be meaningful.

use crate::init::normal_;
use crate::losses::Critic;
use crate::module::Module;
use approx::relative_eq;
use neurarust_tensor::linalg::dot;
use neurarust_tensor::{NeuraNumeric, NeuraRustError, Tensor};
use rand::rngs::StdRng;
use rand::SeedableRng;
use thiserror::Error;

/// Error type specifically for gradient checking failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GradCheckError {
    #[error("Gradient mismatch for {target} at element {index}: analytic {analytic} != numeric {numeric}")]
    GradientMismatch {
        target: &'static str,
        index: usize,
        analytic: f64,
        numeric: f64,
    },

    #[error("Numeric gradient for {target} at element {index} is not finite: {value}")]
    NonFinite {
        target: &'static str,
        index: usize,
        value: f64,
    },

    #[error("Error during gradient check: {0}")]
    Tensor(#[from] NeuraRustError),
}

/// Tolerances and step size of a check.
#[derive(Debug, Clone, PartialEq)]
pub struct GradCheck {
    /// Half-width of the central difference.
    pub epsilon: f64,
    /// Absolute and relative tolerance.
    pub tolerance: f64,
    /// Seed of the random projection.
    pub seed: u64,
}

impl Default for GradCheck {
    fn default() -> Self {
        GradCheck {
            epsilon: 1e-6,
            tolerance: 1e-4,
            seed: 0,
        }
    }
}

/// Outcome of a passing check.
#[derive(Debug, Clone, PartialEq)]
pub struct GradCheckSummary {
    pub checked: usize,
    pub max_abs_error: f64,
}

/// Runs the objective from `state`, returning `sum(output ⊙ projection)`.
fn objective<T: NeuraNumeric, M: Module<T> + ?Sized>(
    module: &mut M,
    state: &Tensor<T>,
    input: &Tensor<T>,
    projection: &Tensor<T>,
) -> Result<f64, NeuraRustError> {
    module.set_state(state)?;
    let output = module.forward(input)?;
    Ok(dot(output.data(), projection.data())?.to_f64_lossless())
}

impl GradCheck {
    pub fn new(epsilon: f64, tolerance: f64) -> Self {
        GradCheck {
            epsilon,
            tolerance,
            ..Default::default()
        }
    }

    fn compare(
        &self,
        target: &'static str,
        analytic: &[f64],
        mut numeric: impl FnMut(usize) -> Result<f64, NeuraRustError>,
    ) -> Result<GradCheckSummary, GradCheckError> {
        let mut max_abs_error = 0.0f64;
        for (index, &a) in analytic.iter().enumerate() {
            let n = numeric(index)?;
            if !n.is_finite() {
                return Err(GradCheckError::NonFinite { target, index, value: n });
            }
            if !relative_eq!(a, n, epsilon = self.tolerance, max_relative = self.tolerance) {
                return Err(GradCheckError::GradientMismatch {
                    target,
                    index,
                    analytic: a,
                    numeric: n,
                });
            }
            max_abs_error = max_abs_error.max((a - n).abs());
        }
        log::debug!(
            "{} gradient check passed on {} elements, max error {:e}",
            target,
            analytic.len(),
            max_abs_error
        );
        Ok(GradCheckSummary {
            checked: analytic.len(),
            max_abs_error,
        })
    }

    /// Warms the module up, snapshots its state, and computes the analytic
    /// gradients of the objective. Returns `(state, projection, in_grad)`.
    fn prepare<T: NeuraNumeric, M: Module<T> + ?Sized>(
        &self,
        module: &mut M,
        input: &Tensor<T>,
    ) -> Result<(Tensor<T>, Tensor<T>, Tensor<T>), NeuraRustError> {
        // the first forward sizes any hidden state
        let mut projection = Tensor::zeros(module.forward(input)?.shape());
        normal_(&mut projection, &mut StdRng::seed_from_u64(self.seed));
        let state = module.state();

        module.forward(input)?;
        module.set_state(&state)?;
        module.reset_state_grad();
        module.zero_grad();
        let in_grad = module.backward(input, &projection)?.clone();
        module.set_state(&state)?;
        Ok((state, projection, in_grad))
    }

    /// Checks `module.backward`'s input gradient at `input`.
    pub fn check_input<T: NeuraNumeric, M: Module<T> + ?Sized>(
        &self,
        module: &mut M,
        input: &Tensor<T>,
    ) -> Result<GradCheckSummary, GradCheckError> {
        let (state, projection, in_grad) = self.prepare(module, input)?;
        let eps = T::from_f64_lossy(self.epsilon);
        let mut perturbed = input.clone();
        let summary = self.compare("input", &in_grad.to_f64_vec(), |i| {
            let original = perturbed[i];
            perturbed[i] = original + eps;
            let up = objective(module, &state, &perturbed, &projection)?;
            perturbed[i] = original - eps;
            let down = objective(module, &state, &perturbed, &projection)?;
            perturbed[i] = original;
            Ok((up - down) / (2.0 * self.epsilon))
        });
        module.set_state(&state)?;
        summary
    }

    /// Checks the parameter gradient `backward` accumulates at `input`.
    ///
    /// The module's parameters are restored afterwards; its gradient holds
    /// the analytic values.
    pub fn check_parameters<T: NeuraNumeric, M: Module<T> + ?Sized>(
        &self,
        module: &mut M,
        input: &Tensor<T>,
    ) -> Result<GradCheckSummary, GradCheckError> {
        let (state, projection, _) = self.prepare(module, input)?;
        let analytic = module.grad().to_f64_vec();
        let params = module.parameters();
        let eps = T::from_f64_lossy(self.epsilon);
        let mut perturbed = params.clone();
        let summary = self.compare("parameters", &analytic, |i| {
            let original = perturbed[i];
            perturbed[i] = original + eps;
            module.set_parameters(&perturbed)?;
            let up = objective(module, &state, input, &projection)?;
            perturbed[i] = original - eps;
            module.set_parameters(&perturbed)?;
            let down = objective(module, &state, input, &projection)?;
            perturbed[i] = original;
            Ok((up - down) / (2.0 * self.epsilon))
        });
        module.set_parameters(&params)?;
        module.set_state(&state)?;
        summary
    }

    /// Checks `critic.backward` against the derivative of `critic.forward`
    /// with respect to the prediction.
    pub fn check_critic<T: NeuraNumeric, C: Critic<T> + ?Sized>(
        &self,
        critic: &mut C,
        prediction: &Tensor<T>,
        target: &Tensor<T>,
    ) -> Result<GradCheckSummary, GradCheckError> {
        let analytic = critic.backward(prediction, target)?.to_f64_vec();
        let eps = T::from_f64_lossy(self.epsilon);
        let mut perturbed = prediction.clone();
        self.compare("critic", &analytic, |i| {
            let original = perturbed[i];
            perturbed[i] = original + eps;
            let up = critic.forward(&perturbed, target)?.to_f64_lossless();
            perturbed[i] = original - eps;
            let down = critic.forward(&perturbed, target)?.to_f64_lossless();
            perturbed[i] = original;
            Ok((up - down) / (2.0 * self.epsilon))
        })
    }
}

#[cfg(test)]
#[path = "grad_check_test.rs"]
mod tests;
