use crate::module::{batched, Module};
use crate::serialize::{ModuleNode, ModuleRegistry};
use neurarust_tensor::{NeuraNumeric, NeuraRustError, Tensor};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::Bernoulli;

/// Validates a drop probability and builds the keep distribution.
pub(crate) fn keep_distribution(drop_probability: f64) -> Result<Bernoulli, NeuraRustError> {
    if !(0.0..1.0).contains(&drop_probability) {
        return Err(NeuraRustError::ConfigurationError(format!(
            "drop probability must be in [0, 1), got {}",
            drop_probability
        )));
    }
    Bernoulli::new(1.0 - drop_probability).map_err(|e| NeuraRustError::ConfigurationError(e.to_string()))
}

/// A seed drawn from entropy. Kept within 32 bits so it survives the `f64`
/// attribute it is serialized in.
pub(crate) fn entropy_seed() -> u64 {
    u64::from(rand::random::<u32>())
}

/// Fills `mask` with independent 0/1 draws.
pub(crate) fn draw_mask<T: NeuraNumeric>(mask: &mut Tensor<T>, keep: &Bernoulli, rng: &mut StdRng) {
    for m in mask.data_mut() {
        *m = if rng.sample(keep) { T::one() } else { T::zero() };
    }
}

/// Zeroes each activation with probability `p` during training.
///
/// Kept activations are not rescaled; instead inference multiplies every
/// activation by `1 - p`, which matches the training-time expectation.
#[derive(Debug, Clone)]
pub struct Dropout<T> {
    drop_probability: f64,
    keep: Bernoulli,
    seed: u64,
    rng: StdRng,
    shape: Vec<usize>,
    mask: Tensor<T>,
    output: Tensor<T>,
    in_grad: Tensor<T>,
    training: bool,
}

impl<T: NeuraNumeric> Dropout<T> {
    pub fn new(drop_probability: f64) -> Result<Self, NeuraRustError> {
        Self::with_seed(drop_probability, entropy_seed())
    }

    /// A dropout layer whose masks are reproducible from `seed`.
    pub fn with_seed(drop_probability: f64, seed: u64) -> Result<Self, NeuraRustError> {
        Ok(Dropout {
            drop_probability,
            keep: keep_distribution(drop_probability)?,
            seed,
            rng: StdRng::seed_from_u64(seed),
            shape: Vec::new(),
            mask: Tensor::empty(),
            output: Tensor::empty(),
            in_grad: Tensor::empty(),
            training: true,
        })
    }

    /// Restarts the mask sequence from `seed`.
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

    /// The mask drawn by the last training-mode forward.
    pub fn mask(&self) -> &Tensor<T> {
        &self.mask
    }

    pub fn load(node: &ModuleNode, _registry: &ModuleRegistry<T>) -> Result<Self, NeuraRustError> {
        node.expect_kind("Dropout")?;
        Self::with_seed(node.attr("probability")?, node.attr_usize("seed")? as u64)
    }
}

impl<T: NeuraNumeric> Module<T> for Dropout<T> {
    fn type_name(&self) -> &'static str {
        "Dropout"
    }

    fn forward(&mut self, input: &Tensor<T>) -> Result<&Tensor<T>, NeuraRustError> {
        if input.rank() == 0 {
            return Err(NeuraRustError::shape_mismatch(&[0], input.shape(), "Dropout forward"));
        }
        self.shape = input.feature_shape().to_vec();
        self.output.copy_from_(input);
        if self.training {
            self.mask.resize(input.shape());
            draw_mask(&mut self.mask, &self.keep, &mut self.rng);
            self.output.mul_(&self.mask)?;
        } else {
            self.output.scale_(T::from_f64_lossy(1.0 - self.drop_probability));
        }
        Ok(&self.output)
    }

    fn backward(&mut self, input: &Tensor<T>, out_grad: &Tensor<T>) -> Result<&Tensor<T>, NeuraRustError> {
        out_grad.expect_shape(input.shape(), "Dropout backward")?;
        self.in_grad.copy_from_(out_grad);
        if self.training {
            self.in_grad.mul_(&self.mask)?;
        } else {
            self.in_grad.scale_(T::from_f64_lossy(1.0 - self.drop_probability));
        }
        Ok(&self.in_grad)
    }

    fn output(&self) -> &Tensor<T> {
        &self.output
    }

    fn in_grad(&self) -> &Tensor<T> {
        &self.in_grad
    }

    fn input_shape(&self) -> Vec<usize> {
        self.shape.clone()
    }

    fn output_shape(&self) -> Vec<usize> {
        self.shape.clone()
    }

    fn batch(&self) -> usize {
        self.output.shape().first().copied().unwrap_or(0)
    }

    fn set_inputs(&mut self, shape: &[usize]) -> Result<(), NeuraRustError> {
        self.shape = shape.to_vec();
        let batch = self.batch();
        self.set_batch(batch)
    }

    fn set_outputs(&mut self, shape: &[usize]) -> Result<(), NeuraRustError> {
        self.set_inputs(shape)
    }

    fn set_batch(&mut self, batch: usize) -> Result<(), NeuraRustError> {
        let shape = batched(batch, &self.shape);
        self.mask.resize(&shape);
        self.output.resize(&shape);
        self.in_grad.resize(&shape);
        Ok(())
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    fn is_training(&self) -> bool {
        self.training
    }

    fn clone_module(&self) -> Box<dyn Module<T>> {
        Box::new(self.clone())
    }

    fn save(&self) -> Result<ModuleNode, NeuraRustError> {
        Ok(ModuleNode::new("Dropout")
            .with_attr("probability", self.drop_probability)
            .with_attr("seed", self.seed as f64))
    }
}

#[cfg(test)]
#[path = "dropout_test.rs"]
mod tests;
