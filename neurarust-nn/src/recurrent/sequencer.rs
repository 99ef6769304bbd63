use crate::module::{batched, shape_is_set, usage_error, Module};
use crate::serialize::{ModuleNode, ModuleRegistry};
use neurarust_tensor::{NeuraNumeric, NeuraRustError, Tensor};

/// Drives a stateful module over a leading sequence dimension.
///
/// Inputs are `[sequence, batch, ...features]`; the wrapped module sees one
/// `[batch, ...features]` slice per time step. `forward` snapshots the
/// module's flattened state before every step (and once after the last), so
/// `backward` can walk the sequence in reverse, restoring each step's
/// starting state before differentiating it.
///
/// The wrapped state is never reset automatically: consecutive sequences
/// continue from where the last one ended until [`Module::reset_state`] is
/// called. After `backward` the state is the one left by the last `forward`.
/// Stochastic components (Dropout) redraw their masks when a step is
/// replayed.
///
/// `input_shape`, `output_shape` and `batch` are those of the wrapped module.
#[derive(Debug, Clone)]
pub struct Sequencer<T: NeuraNumeric> {
    module: Box<dyn Module<T>>,
    snapshots: Vec<Tensor<T>>,
    output: Tensor<T>,
    in_grad: Tensor<T>,
}

impl<T: NeuraNumeric> Sequencer<T> {
    pub fn new(module: Box<dyn Module<T>>) -> Self {
        Sequencer {
            module,
            snapshots: Vec::new(),
            output: Tensor::empty(),
            in_grad: Tensor::empty(),
        }
    }

    pub fn module(&self) -> &dyn Module<T> {
        self.module.as_ref()
    }

    pub fn module_mut(&mut self) -> &mut dyn Module<T> {
        self.module.as_mut()
    }

    /// Flattened states captured by the last `forward`: one per step plus
    /// the final state.
    pub fn snapshots(&self) -> &[Tensor<T>] {
        &self.snapshots
    }

    /// Returns `(sequence, batch)`.
    fn check_sequence(&self, input: &Tensor<T>, operation: &str) -> Result<(usize, usize), NeuraRustError> {
        if input.rank() < 2 {
            return Err(NeuraRustError::shape_mismatch(&[0, 0], input.shape(), operation));
        }
        let features = self.module.input_shape();
        if shape_is_set(&features) && input.shape()[2..] != features[..] {
            let mut expected = input.shape()[..2].to_vec();
            expected.extend_from_slice(&features);
            return Err(NeuraRustError::shape_mismatch(&expected, input.shape(), operation));
        }
        Ok((input.shape()[0], input.shape()[1]))
    }

    pub fn load(node: &ModuleNode, registry: &ModuleRegistry<T>) -> Result<Self, NeuraRustError> {
        node.expect_kind("Sequencer")?;
        node.expect_children(1)?;
        Ok(Self::new(registry.load(node.child(0)?)?))
    }
}

impl<T: NeuraNumeric> Module<T> for Sequencer<T> {
    fn type_name(&self) -> &'static str {
        "Sequencer"
    }

    fn forward(&mut self, input: &Tensor<T>) -> Result<&Tensor<T>, NeuraRustError> {
        let (sequence, batch) = self.check_sequence(input, "Sequencer forward")?;
        self.module.set_batch(batch)?;
        self.snapshots.clear();
        for t in 0..sequence {
            self.snapshots.push(self.module.state());
            let x = input.select(t)?;
            let y = self.module.forward(&x)?;
            if t == 0 {
                self.output.resize(&batched(sequence, y.shape()));
            }
            self.output.set_select(t, y)?;
        }
        self.snapshots.push(self.module.state());
        if sequence == 0 {
            self.output.resize(&[0]);
        }
        Ok(&self.output)
    }

    fn backward(&mut self, input: &Tensor<T>, out_grad: &Tensor<T>) -> Result<&Tensor<T>, NeuraRustError> {
        let (sequence, _) = self.check_sequence(input, "Sequencer backward")?;
        if self.snapshots.len() != sequence + 1 {
            return Err(usage_error(format!(
                "Sequencer backward over {} steps needs a matching forward, found {} snapshots",
                sequence,
                self.snapshots.len()
            )));
        }
        out_grad.expect_shape(self.output.shape(), "Sequencer backward")?;

        self.module.reset_state_grad();
        self.in_grad.resize(input.shape());
        for t in (0..sequence).rev() {
            log::trace!("Sequencer replaying step {}", t);
            let x = input.select(t)?;
            // refresh every cached activation of step t, then rewind again
            self.module.set_state(&self.snapshots[t])?;
            self.module.forward(&x)?;
            self.module.set_state(&self.snapshots[t])?;
            let dx = self.module.backward(&x, &out_grad.select(t)?)?;
            self.in_grad.set_select(t, dx)?;
        }
        self.module.set_state(&self.snapshots[sequence])?;
        Ok(&self.in_grad)
    }

    fn output(&self) -> &Tensor<T> {
        &self.output
    }

    fn in_grad(&self) -> &Tensor<T> {
        &self.in_grad
    }

    fn input_shape(&self) -> Vec<usize> {
        self.module.input_shape()
    }

    fn output_shape(&self) -> Vec<usize> {
        self.module.output_shape()
    }

    fn batch(&self) -> usize {
        self.module.batch()
    }

    fn set_inputs(&mut self, shape: &[usize]) -> Result<(), NeuraRustError> {
        self.snapshots.clear();
        self.module.set_inputs(shape)
    }

    fn set_outputs(&mut self, shape: &[usize]) -> Result<(), NeuraRustError> {
        self.snapshots.clear();
        self.module.set_outputs(shape)
    }

    fn set_batch(&mut self, batch: usize) -> Result<(), NeuraRustError> {
        self.snapshots.clear();
        self.module.set_batch(batch)
    }

    fn params(&self) -> Vec<&Tensor<T>> {
        self.module.params()
    }

    fn params_mut(&mut self) -> Vec<&mut Tensor<T>> {
        self.module.params_mut()
    }

    fn grads(&self) -> Vec<&Tensor<T>> {
        self.module.grads()
    }

    fn grads_mut(&mut self) -> Vec<&mut Tensor<T>> {
        self.module.grads_mut()
    }

    fn states(&self) -> Vec<&Tensor<T>> {
        self.module.states()
    }

    fn states_mut(&mut self) -> Vec<&mut Tensor<T>> {
        self.module.states_mut()
    }

    fn set_training(&mut self, training: bool) {
        self.module.set_training(training);
    }

    fn is_training(&self) -> bool {
        self.module.is_training()
    }

    fn reset_state(&mut self) {
        self.module.reset_state();
    }

    fn reset_state_grad(&mut self) {
        self.module.reset_state_grad();
    }

    fn clone_module(&self) -> Box<dyn Module<T>> {
        Box::new(self.clone())
    }

    fn save(&self) -> Result<ModuleNode, NeuraRustError> {
        Ok(ModuleNode::new("Sequencer").with_child(self.module.save()?))
    }
}

#[cfg(test)]
#[path = "sequencer_test.rs"]
mod tests;
