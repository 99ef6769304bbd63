use super::dropout::{draw_mask, entropy_seed, keep_distribution};
use crate::module::{usage_error, Container, Module};
use crate::serialize::{ModuleNode, ModuleRegistry};
use neurarust_tensor::{NeuraNumeric, NeuraRustError, Tensor};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::Bernoulli;

/// Drops individual *parameters* of a wrapped module.
///
/// In training mode each `forward` draws a 0/1 mask over the wrapped
/// module's flattened parameters, runs the module with the masked
/// parameters, then restores the originals. `backward` reuses that mask and
/// only lets gradient reach the kept parameters. In inference mode the
/// parameters are scaled by `1 - p` for the duration of the call instead,
/// and so is their gradient.
///
/// The wrapped module is fixed: `add`, `remove` and `clear` fail with
/// `UsageError`.
#[derive(Debug, Clone)]
pub struct DropConnect<T: NeuraNumeric> {
    inner: Box<dyn Module<T>>,
    drop_probability: f64,
    keep: Bernoulli,
    seed: u64,
    rng: StdRng,
    mask: Tensor<T>,
    training: bool,
}

impl<T: NeuraNumeric> DropConnect<T> {
    pub fn new(inner: Box<dyn Module<T>>, drop_probability: f64) -> Result<Self, NeuraRustError> {
        Self::with_seed(inner, drop_probability, entropy_seed())
    }

    pub fn with_seed(inner: Box<dyn Module<T>>, drop_probability: f64, seed: u64) -> Result<Self, NeuraRustError> {
        Ok(DropConnect {
            inner,
            drop_probability,
            keep: keep_distribution(drop_probability)?,
            seed,
            rng: StdRng::seed_from_u64(seed),
            mask: Tensor::empty(),
            training: true,
        })
    }

    pub fn reseed(&mut self, seed: u64) {
        self.seed = seed;
        self.rng = StdRng::seed_from_u64(seed);
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn drop_probability(&self) -> f64 {
        self.drop_probability
    }

    pub fn inner(&self) -> &dyn Module<T> {
        self.inner.as_ref()
    }

    /// The parameter mask drawn by the last training-mode forward.
    pub fn mask(&self) -> &Tensor<T> {
        &self.mask
    }

    /// Parameters as the wrapped module should see them for this call.
    fn effective_parameters(&self, original: &Tensor<T>) -> Result<Tensor<T>, NeuraRustError> {
        if self.training {
            original.mul(&self.mask)
        } else {
            let mut scaled = original.clone();
            scaled.scale_(T::from_f64_lossy(1.0 - self.drop_probability));
            Ok(scaled)
        }
    }

    pub fn load(node: &ModuleNode, registry: &ModuleRegistry<T>) -> Result<Self, NeuraRustError> {
        node.expect_kind("DropConnect")?;
        node.expect_children(1)?;
        Self::with_seed(
            registry.load(node.child(0)?)?,
            node.attr("probability")?,
            node.attr_usize("seed")? as u64,
        )
    }
}

impl<T: NeuraNumeric> Module<T> for DropConnect<T> {
    fn type_name(&self) -> &'static str {
        "DropConnect"
    }

    fn forward(&mut self, input: &Tensor<T>) -> Result<&Tensor<T>, NeuraRustError> {
        let backup = self.inner.parameters();
        if self.training {
            self.mask.resize(backup.shape());
            draw_mask(&mut self.mask, &self.keep, &mut self.rng);
        }
        let effective = self.effective_parameters(&backup)?;
        self.inner.set_parameters(&effective)?;
        let result = self.inner.forward(input).map(|_| ());
        self.inner.set_parameters(&backup)?;
        result?;
        Ok(self.inner.output())
    }

    fn backward(&mut self, input: &Tensor<T>, out_grad: &Tensor<T>) -> Result<&Tensor<T>, NeuraRustError> {
        let backup = self.inner.parameters();
        if self.training && self.mask.shape() != backup.shape() {
            return Err(usage_error("DropConnect backward called before a training forward"));
        }
        let before = self.inner.grad();
        let effective = self.effective_parameters(&backup)?;
        self.inner.set_parameters(&effective)?;
        let result = self.inner.backward(input, out_grad).map(|_| ());
        self.inner.set_parameters(&backup)?;
        result?;

        // This call's contribution is with respect to the effective
        // parameters; chain it back to the stored ones.
        let mut grad = self.inner.grad();
        grad.sub_(&before)?;
        if self.training {
            grad.mul_(&self.mask)?;
        } else {
            grad.scale_(T::from_f64_lossy(1.0 - self.drop_probability));
        }
        grad.add_(&before)?;
        self.inner.set_grad(&grad)?;
        Ok(self.inner.in_grad())
    }

    fn output(&self) -> &Tensor<T> {
        self.inner.output()
    }

    fn in_grad(&self) -> &Tensor<T> {
        self.inner.in_grad()
    }

    fn input_shape(&self) -> Vec<usize> {
        self.inner.input_shape()
    }

    fn output_shape(&self) -> Vec<usize> {
        self.inner.output_shape()
    }

    fn batch(&self) -> usize {
        self.inner.batch()
    }

    fn set_inputs(&mut self, shape: &[usize]) -> Result<(), NeuraRustError> {
        self.inner.set_inputs(shape)
    }

    fn set_outputs(&mut self, shape: &[usize]) -> Result<(), NeuraRustError> {
        self.inner.set_outputs(shape)
    }

    fn set_batch(&mut self, batch: usize) -> Result<(), NeuraRustError> {
        self.inner.set_batch(batch)
    }

    fn params(&self) -> Vec<&Tensor<T>> {
        self.inner.params()
    }

    fn params_mut(&mut self) -> Vec<&mut Tensor<T>> {
        self.inner.params_mut()
    }

    fn grads(&self) -> Vec<&Tensor<T>> {
        self.inner.grads()
    }

    fn grads_mut(&mut self) -> Vec<&mut Tensor<T>> {
        self.inner.grads_mut()
    }

    fn states(&self) -> Vec<&Tensor<T>> {
        self.inner.states()
    }

    fn states_mut(&mut self) -> Vec<&mut Tensor<T>> {
        self.inner.states_mut()
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
        self.inner.set_training(training);
    }

    fn is_training(&self) -> bool {
        self.training
    }

    fn reset_state(&mut self) {
        self.inner.reset_state();
    }

    fn reset_state_grad(&mut self) {
        self.inner.reset_state_grad();
    }

    fn clone_module(&self) -> Box<dyn Module<T>> {
        Box::new(self.clone())
    }

    fn save(&self) -> Result<ModuleNode, NeuraRustError> {
        Ok(ModuleNode::new("DropConnect")
            .with_attr("probability", self.drop_probability)
            .with_attr("seed", self.seed as f64)
            .with_child(self.inner.save()?))
    }
}

impl<T: NeuraNumeric> Container<T> for DropConnect<T> {
    fn add(&mut self, _module: Box<dyn Module<T>>) -> Result<(), NeuraRustError> {
        Err(usage_error("cannot add components to DropConnect"))
    }

    fn remove(&mut self, _index: usize) -> Result<Box<dyn Module<T>>, NeuraRustError> {
        Err(usage_error("cannot remove the component of DropConnect"))
    }

    fn clear(&mut self) -> Result<(), NeuraRustError> {
        Err(usage_error("cannot clear DropConnect"))
    }

    fn components(&self) -> Vec<&dyn Module<T>> {
        vec![self.inner.as_ref()]
    }
}

#[cfg(test)]
#[path = "dropconnect_test.rs"]
mod tests;
