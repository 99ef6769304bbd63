use crate::losses::Critic;
use crate::module::Module;
use neurarust_tensor::{NeuraNumeric, NeuraRustError, Tensor};

/// Trait defining the common interface for all optimizers.
///
/// An optimizer owns the model it trains and the critic that scores it.
pub trait Optimizer<T: NeuraNumeric> {
    /// Runs one forward/backward pass on `(input, target)` and updates the
    /// model's parameters from the resulting gradient.
    ///
    /// # Returns
    ///
    /// The loss measured *before* the update.
    fn step(&mut self, input: &Tensor<T>, target: &Tensor<T>) -> Result<T, NeuraRustError>;

    /// Restarts the optimizer's schedule. What is cleared is documented per
    /// optimizer.
    fn reset(&mut self);

    fn model(&self) -> &dyn Module<T>;

    fn model_mut(&mut self) -> &mut dyn Module<T>;

    fn critic(&self) -> &dyn Critic<T>;
}

/// Zeroes the model's gradient, then fills it from one pass:
/// `model.backward(input, critic.backward(model.forward(input), target))`.
///
/// Recurrent modules differentiate the step taken from their current state,
/// so the pre-forward state is put back for `backward` and the post-forward
/// state afterwards. A state first allocated by this forward is rewound to
/// zeros.
///
/// Returns the loss of the forward pass.
pub(crate) fn forward_backward<T: NeuraNumeric>(
    model: &mut dyn Module<T>,
    critic: &mut dyn Critic<T>,
    input: &Tensor<T>,
    target: &Tensor<T>,
) -> Result<T, NeuraRustError> {
    model.zero_grad();
    let before = model.state();
    let prediction = model.forward(input)?.clone();
    let after = model.state();
    let loss = critic.forward(&prediction, target)?;
    let blame = critic.backward(&prediction, target)?;

    if before.size() == after.size() {
        model.set_state(&before)?;
    } else {
        log::debug!("state allocated by forward, rewinding to zeros");
        model.reset_state();
    }
    model.reset_state_grad();
    model.backward(input, blame)?;
    model.set_state(&after)?;
    Ok(loss)
}

/// Resizes a per-parameter accumulator to `len` zeros if it does not match.
pub(crate) fn ensure_accumulator<T: NeuraNumeric>(accumulator: &mut Tensor<T>, len: usize, name: &str) {
    if accumulator.size() != len || accumulator.rank() != 1 {
        log::debug!("allocating {} accumulator for {} parameters", name, len);
        *accumulator = Tensor::zeros(&[len]);
    }
}

pub(crate) fn positive(name: &str, value: f64) -> Result<(), NeuraRustError> {
    if value.is_nan() || value <= 0.0 {
        return Err(NeuraRustError::ConfigurationError(format!(
            "{} must be positive, got {}",
            name, value
        )));
    }
    Ok(())
}

pub(crate) fn unit_interval(name: &str, value: f64) -> Result<(), NeuraRustError> {
    if !(0.0..1.0).contains(&value) {
        return Err(NeuraRustError::ConfigurationError(format!(
            "{} must be in [0, 1), got {}",
            name, value
        )));
    }
    Ok(())
}
