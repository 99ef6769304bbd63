use crate::module::{batched, check_input, shape_is_set, usage_error, Container, Module};
use crate::serialize::{ModuleNode, ModuleRegistry};
use neurarust_tensor::{NeuraNumeric, NeuraRustError, Tensor};

/// An Elman-style recurrent cell built from three modules:
///
/// ```text
/// state  = input(x) + feedback(previous state)
/// output = output_module(state)
/// ```
///
/// Each `forward` advances the hidden state by one time step. `backward`
/// must be called with the state restored to what it was *before* the step
/// being differentiated (a [`crate::recurrent::Sequencer`] does this); the
/// step is replayed from that state so every component sees its own input,
/// and the state is left unchanged afterwards. Gradient flowing into the
/// previous state is carried to the next `backward` call until
/// [`Module::reset_state_grad`] starts a new reverse sweep.
#[derive(Debug, Clone)]
pub struct Recurrent<T: NeuraNumeric> {
    input: Box<dyn Module<T>>,
    feedback: Box<dyn Module<T>>,
    output: Box<dyn Module<T>>,
    state: Tensor<T>,
    state_grad: Tensor<T>,
    reset_grad: bool,
}

impl<T: NeuraNumeric> Recurrent<T> {
    /// # Errors
    /// Returns `ShapeMismatch` if the feedback module does not map the
    /// hidden shape (the input module's output shape) onto itself.
    pub fn new(
        input: Box<dyn Module<T>>,
        feedback: Box<dyn Module<T>>,
        mut output: Box<dyn Module<T>>,
    ) -> Result<Self, NeuraRustError> {
        let hidden = input.output_shape();
        for shape in [feedback.input_shape(), feedback.output_shape()] {
            if !shape.is_empty() && shape != hidden {
                return Err(NeuraRustError::shape_mismatch(&hidden, &shape, "Recurrent feedback"));
            }
        }
        if output.input_shape().is_empty() && !hidden.is_empty() {
            output.set_inputs(&hidden)?;
        }
        Ok(Recurrent {
            input,
            feedback,
            output,
            state: Tensor::empty(),
            state_grad: Tensor::empty(),
            reset_grad: true,
        })
    }

    fn hidden_shape(&self) -> Vec<usize> {
        self.input.output_shape()
    }

    /// The current hidden state, `[batch, ...hidden]`.
    pub fn hidden_state(&self) -> &Tensor<T> {
        &self.state
    }

    /// Zeroes the state when the batch changes; keeps it otherwise.
    fn ensure_state(&mut self, batch: usize) {
        let shape = batched(batch, &self.hidden_shape());
        if self.state.shape() != shape.as_slice() {
            log::debug!("Recurrent state reset to {:?}", shape);
            self.state = Tensor::zeros(&shape);
        }
    }

    /// One step from the current state. Returns the previous state.
    fn step(&mut self, x: &Tensor<T>) -> Result<Tensor<T>, NeuraRustError> {
        let features = self.input.input_shape();
        let batch = if shape_is_set(&features) {
            check_input(x, &features, "Recurrent forward")?
        } else {
            x.shape().first().copied().unwrap_or(0)
        };
        self.ensure_state(batch);
        let mut next = self.input.forward(x)?.clone();
        next.add_(self.feedback.forward(&self.state)?)?;
        let previous = std::mem::replace(&mut self.state, next);
        self.output.forward(&self.state)?;
        Ok(previous)
    }

    pub fn load(node: &ModuleNode, registry: &ModuleRegistry<T>) -> Result<Self, NeuraRustError> {
        node.expect_kind("Recurrent")?;
        node.expect_children(3)?;
        Self::new(
            registry.load(node.child(0)?)?,
            registry.load(node.child(1)?)?,
            registry.load(node.child(2)?)?,
        )
    }
}

impl<T: NeuraNumeric> Module<T> for Recurrent<T> {
    fn type_name(&self) -> &'static str {
        "Recurrent"
    }

    fn forward(&mut self, input: &Tensor<T>) -> Result<&Tensor<T>, NeuraRustError> {
        self.step(input)?;
        Ok(self.output.output())
    }

    fn backward(&mut self, input: &Tensor<T>, out_grad: &Tensor<T>) -> Result<&Tensor<T>, NeuraRustError> {
        let previous = self.step(input)?;

        let mut state_grad = self.output.backward(&self.state, out_grad)?.clone();
        if !self.reset_grad {
            state_grad.add_(&self.state_grad)?;
        }
        self.reset_grad = false;

        self.input.backward(input, &state_grad)?;
        self.feedback.backward(&previous, &state_grad)?;
        self.state_grad.copy_from_(self.feedback.in_grad());
        self.state = previous;
        Ok(self.input.in_grad())
    }

    fn output(&self) -> &Tensor<T> {
        self.output.output()
    }

    fn in_grad(&self) -> &Tensor<T> {
        self.input.in_grad()
    }

    fn input_shape(&self) -> Vec<usize> {
        self.input.input_shape()
    }

    fn output_shape(&self) -> Vec<usize> {
        self.output.output_shape()
    }

    fn batch(&self) -> usize {
        self.input.batch()
    }

    fn set_inputs(&mut self, shape: &[usize]) -> Result<(), NeuraRustError> {
        self.input.set_inputs(shape)
    }

    /// Resizes the hidden layer: the input module's outputs, the feedback
    /// module on both sides, and the output module's inputs.
    fn set_outputs(&mut self, shape: &[usize]) -> Result<(), NeuraRustError> {
        self.input.set_outputs(shape)?;
        self.feedback.set_inputs(shape)?;
        self.feedback.set_outputs(shape)?;
        self.output.set_inputs(shape)?;
        self.state = Tensor::empty();
        Ok(())
    }

    fn set_batch(&mut self, batch: usize) -> Result<(), NeuraRustError> {
        self.input.set_batch(batch)?;
        self.feedback.set_batch(batch)?;
        self.output.set_batch(batch)?;
        self.ensure_state(batch);
        Ok(())
    }

    fn params(&self) -> Vec<&Tensor<T>> {
        let mut p = self.input.params();
        p.extend(self.feedback.params());
        p.extend(self.output.params());
        p
    }

    fn params_mut(&mut self) -> Vec<&mut Tensor<T>> {
        let mut p = self.input.params_mut();
        p.extend(self.feedback.params_mut());
        p.extend(self.output.params_mut());
        p
    }

    fn grads(&self) -> Vec<&Tensor<T>> {
        let mut g = self.input.grads();
        g.extend(self.feedback.grads());
        g.extend(self.output.grads());
        g
    }

    fn grads_mut(&mut self) -> Vec<&mut Tensor<T>> {
        let mut g = self.input.grads_mut();
        g.extend(self.feedback.grads_mut());
        g.extend(self.output.grads_mut());
        g
    }

    /// The hidden state, followed by any state of the components.
    fn states(&self) -> Vec<&Tensor<T>> {
        let mut s = vec![&self.state];
        s.extend(self.input.states());
        s.extend(self.feedback.states());
        s.extend(self.output.states());
        s
    }

    fn states_mut(&mut self) -> Vec<&mut Tensor<T>> {
        let mut s = vec![&mut self.state];
        s.extend(self.input.states_mut());
        s.extend(self.feedback.states_mut());
        s.extend(self.output.states_mut());
        s
    }

    fn set_training(&mut self, training: bool) {
        self.input.set_training(training);
        self.feedback.set_training(training);
        self.output.set_training(training);
    }

    fn is_training(&self) -> bool {
        self.input.is_training()
    }

    fn reset_state(&mut self) {
        self.state.fill_(T::zero());
    }

    fn reset_state_grad(&mut self) {
        self.reset_grad = true;
    }

    fn clone_module(&self) -> Box<dyn Module<T>> {
        Box::new(self.clone())
    }

    fn save(&self) -> Result<ModuleNode, NeuraRustError> {
        Ok(ModuleNode::new("Recurrent")
            .with_child(self.input.save()?)
            .with_child(self.feedback.save()?)
            .with_child(self.output.save()?))
    }
}

impl<T: NeuraNumeric> Container<T> for Recurrent<T> {
    fn add(&mut self, _module: Box<dyn Module<T>>) -> Result<(), NeuraRustError> {
        Err(usage_error("cannot add components to Recurrent"))
    }

    fn remove(&mut self, _index: usize) -> Result<Box<dyn Module<T>>, NeuraRustError> {
        Err(usage_error("cannot remove components of Recurrent"))
    }

    fn clear(&mut self) -> Result<(), NeuraRustError> {
        Err(usage_error("cannot clear Recurrent"))
    }

    fn components(&self) -> Vec<&dyn Module<T>> {
        vec![self.input.as_ref(), self.feedback.as_ref(), self.output.as_ref()]
    }
}

#[cfg(test)]
#[path = "recurrent_test.rs"]
mod tests;
