use crate::module::{batched, check_input, shape_is_set, usage_error, Container, Module};
use crate::serialize::{ModuleNode, ModuleRegistry};
use neurarust_tensor::{NeuraNumeric, NeuraRustError, Tensor};

/// Runs every component on the same input and concatenates their outputs
/// along the feature dimension, in component order.
///
/// Components must produce `[batch, n]` outputs. Backward hands each
/// component its column range of the incoming gradient and sums the
/// resulting input gradients, since every component saw the whole input.
///
/// The output width is the sum of the components' widths, so `set_outputs`
/// is rejected with `UsageError`.
#[derive(Debug, Clone, Default)]
pub struct Concat<T: NeuraNumeric> {
    components: Vec<Box<dyn Module<T>>>,
    output: Tensor<T>,
    in_grad: Tensor<T>,
}

impl<T: NeuraNumeric> Concat<T> {
    pub fn new() -> Self {
        Concat {
            components: Vec::new(),
            output: Tensor::empty(),
            in_grad: Tensor::empty(),
        }
    }

    pub fn from_modules(modules: Vec<Box<dyn Module<T>>>) -> Result<Self, NeuraRustError> {
        let mut concat = Self::new();
        for module in modules {
            concat.add(module)?;
        }
        Ok(concat)
    }

    pub fn with(mut self, module: impl Module<T> + 'static) -> Result<Self, NeuraRustError> {
        self.add(Box::new(module))?;
        Ok(self)
    }

    /// Width of each component's output, in order.
    fn widths(&self) -> Result<Vec<usize>, NeuraRustError> {
        self.components
            .iter()
            .map(|m| match m.output_shape().as_slice() {
                [width] => Ok(*width),
                other => Err(NeuraRustError::shape_mismatch(&[0], other, "Concat component output")),
            })
            .collect()
    }

    pub fn load(node: &ModuleNode, registry: &ModuleRegistry<T>) -> Result<Self, NeuraRustError> {
        node.expect_kind("Concat")?;
        let mut concat = Self::new();
        for child in &node.children {
            concat.add(registry.load(child)?)?;
        }
        Ok(concat)
    }
}

impl<T: NeuraNumeric> Module<T> for Concat<T> {
    fn type_name(&self) -> &'static str {
        "Concat"
    }

    fn forward(&mut self, input: &Tensor<T>) -> Result<&Tensor<T>, NeuraRustError> {
        if self.components.is_empty() {
            return Err(usage_error("forward on an empty Concat"));
        }
        let shared = self.input_shape();
        if shape_is_set(&shared) {
            check_input(input, &shared, "Concat forward")?;
        }
        for m in self.components.iter_mut() {
            m.forward(input)?;
        }
        let widths = self.widths()?;
        let batch = input.shape().first().copied().unwrap_or(0);
        self.output.resize(&[batch, widths.iter().sum()]);
        let mut start = 0;
        for (m, width) in self.components.iter().zip(widths) {
            self.output.set_cols(start, m.output())?;
            start += width;
        }
        Ok(&self.output)
    }

    fn backward(&mut self, input: &Tensor<T>, out_grad: &Tensor<T>) -> Result<&Tensor<T>, NeuraRustError> {
        if self.components.is_empty() {
            return Err(usage_error("backward on an empty Concat"));
        }
        out_grad.expect_shape(self.output.shape(), "Concat backward")?;
        let widths = self.widths()?;
        self.in_grad.resize(input.shape());
        self.in_grad.fill_(T::zero());
        let mut start = 0;
        for (m, width) in self.components.iter_mut().zip(widths) {
            let slice = out_grad.narrow_cols(start, width)?;
            self.in_grad.add_(m.backward(input, &slice)?)?;
            start += width;
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
        self.components
            .iter()
            .map(|m| m.input_shape())
            .find(|s| shape_is_set(s))
            .unwrap_or_default()
    }

    fn output_shape(&self) -> Vec<usize> {
        match self.widths() {
            Ok(widths) if !widths.is_empty() => vec![widths.iter().sum()],
            _ => Vec::new(),
        }
    }

    fn batch(&self) -> usize {
        self.output.shape().first().copied().unwrap_or(0)
    }

    fn set_inputs(&mut self, shape: &[usize]) -> Result<(), NeuraRustError> {
        self.components.iter_mut().try_for_each(|m| m.set_inputs(shape))
    }

    fn set_outputs(&mut self, _shape: &[usize]) -> Result<(), NeuraRustError> {
        Err(usage_error(
            "Concat output width is the sum of its components; resize the components instead",
        ))
    }

    fn set_batch(&mut self, batch: usize) -> Result<(), NeuraRustError> {
        self.components.iter_mut().try_for_each(|m| m.set_batch(batch))?;
        self.output.resize(&batched(batch, &self.output_shape()));
        self.in_grad.resize(&batched(batch, &self.input_shape()));
        Ok(())
    }

    fn params(&self) -> Vec<&Tensor<T>> {
        self.components.iter().flat_map(|m| m.params()).collect()
    }

    fn params_mut(&mut self) -> Vec<&mut Tensor<T>> {
        self.components.iter_mut().flat_map(|m| m.params_mut()).collect()
    }

    fn grads(&self) -> Vec<&Tensor<T>> {
        self.components.iter().flat_map(|m| m.grads()).collect()
    }

    fn grads_mut(&mut self) -> Vec<&mut Tensor<T>> {
        self.components.iter_mut().flat_map(|m| m.grads_mut()).collect()
    }

    fn states(&self) -> Vec<&Tensor<T>> {
        self.components.iter().flat_map(|m| m.states()).collect()
    }

    fn states_mut(&mut self) -> Vec<&mut Tensor<T>> {
        self.components.iter_mut().flat_map(|m| m.states_mut()).collect()
    }

    fn set_training(&mut self, training: bool) {
        self.components.iter_mut().for_each(|m| m.set_training(training));
    }

    fn is_training(&self) -> bool {
        self.components.iter().any(|m| m.is_training())
    }

    fn reset_state(&mut self) {
        self.components.iter_mut().for_each(|m| m.reset_state());
    }

    fn reset_state_grad(&mut self) {
        self.components.iter_mut().for_each(|m| m.reset_state_grad());
    }

    fn clone_module(&self) -> Box<dyn Module<T>> {
        Box::new(self.clone())
    }

    fn save(&self) -> Result<ModuleNode, NeuraRustError> {
        let mut node = ModuleNode::new("Concat");
        for m in &self.components {
            node = node.with_child(m.save()?);
        }
        Ok(node)
    }
}

impl<T: NeuraNumeric> Container<T> for Concat<T> {
    /// A component with an unset input shape inherits the shared one; a
    /// component with a different input shape is rejected.
    fn add(&mut self, mut module: Box<dyn Module<T>>) -> Result<(), NeuraRustError> {
        let shared = self.input_shape();
        if shape_is_set(&shared) {
            let own = module.input_shape();
            if !shape_is_set(&own) {
                module.set_inputs(&shared)?;
            } else if own != shared {
                return Err(NeuraRustError::shape_mismatch(&shared, &own, "Concat add"));
            }
        }
        self.components.push(module);
        Ok(())
    }

    fn remove(&mut self, index: usize) -> Result<Box<dyn Module<T>>, NeuraRustError> {
        if index >= self.components.len() {
            return Err(usage_error(format!(
                "cannot remove component {} of a Concat with {}",
                index,
                self.components.len()
            )));
        }
        Ok(self.components.remove(index))
    }

    fn clear(&mut self) -> Result<(), NeuraRustError> {
        self.components.clear();
        Ok(())
    }

    fn components(&self) -> Vec<&dyn Module<T>> {
        self.components.iter().map(|m| m.as_ref()).collect()
    }
}

#[cfg(test)]
#[path = "concat_test.rs"]
mod tests;
