use crate::module::{shape_is_set, usage_error, Container, Module};
use crate::serialize::{ModuleNode, ModuleRegistry};
use neurarust_tensor::{NeuraNumeric, NeuraRustError, Tensor};

/// Chains child modules: each consumes the previous one's output.
///
/// Adding a component resizes its input to the previous component's output
/// shape; removing one re-propagates shapes through the rest of the chain.
#[derive(Debug, Clone, Default)]
pub struct Sequential<T: NeuraNumeric> {
    components: Vec<Box<dyn Module<T>>>,
    empty: Tensor<T>,
}

impl<T: NeuraNumeric> Sequential<T> {
    pub fn new() -> Self {
        Sequential {
            components: Vec::new(),
            empty: Tensor::empty(),
        }
    }

    /// Builds a chain from `modules`, in order.
    pub fn from_modules(modules: Vec<Box<dyn Module<T>>>) -> Result<Self, NeuraRustError> {
        let mut seq = Self::new();
        for module in modules {
            seq.add(module)?;
        }
        Ok(seq)
    }

    /// Builder-style [`Container::add`].
    pub fn with(mut self, module: impl Module<T> + 'static) -> Result<Self, NeuraRustError> {
        self.add(Box::new(module))?;
        Ok(self)
    }

    pub fn component(&self, index: usize) -> Option<&dyn Module<T>> {
        self.components.get(index).map(|m| m.as_ref())
    }

    pub fn component_mut(&mut self, index: usize) -> Option<&mut (dyn Module<T> + 'static)> {
        self.components.get_mut(index).map(|m| m.as_mut())
    }

    /// Re-propagates shapes from component `start` onward.
    fn propagate_from(&mut self, start: usize) -> Result<(), NeuraRustError> {
        for i in start.max(1)..self.components.len() {
            let shape = self.components[i - 1].output_shape();
            if shape_is_set(&shape) {
                self.components[i].set_inputs(&shape)?;
            }
        }
        Ok(())
    }

    fn require_components(&self, operation: &str) -> Result<usize, NeuraRustError> {
        if self.components.is_empty() {
            return Err(usage_error(format!("{} on an empty Sequential", operation)));
        }
        Ok(self.components.len())
    }

    pub fn load(node: &ModuleNode, registry: &ModuleRegistry<T>) -> Result<Self, NeuraRustError> {
        node.expect_kind("Sequential")?;
        let mut seq = Self::new();
        for child in &node.children {
            seq.components.push(registry.load(child)?);
        }
        // shapeless children (maps, softmax, flatten) take their shape from
        // the previous component; sized layers keep their loaded parameters
        seq.propagate_from(1)?;
        Ok(seq)
    }
}

impl<T: NeuraNumeric> Module<T> for Sequential<T> {
    fn type_name(&self) -> &'static str {
        "Sequential"
    }

    fn forward(&mut self, input: &Tensor<T>) -> Result<&Tensor<T>, NeuraRustError> {
        let n = self.require_components("forward")?;
        self.components[0].forward(input)?;
        for i in 1..n {
            let (done, rest) = self.components.split_at_mut(i);
            rest[0].forward(done[i - 1].output())?;
        }
        Ok(self.components[n - 1].output())
    }

    fn backward(&mut self, input: &Tensor<T>, out_grad: &Tensor<T>) -> Result<&Tensor<T>, NeuraRustError> {
        let n = self.require_components("backward")?;
        for i in (0..n).rev() {
            let (before, rest) = self.components.split_at_mut(i);
            let (current, after) = rest.split_at_mut(1);
            let x = if i == 0 { input } else { before[i - 1].output() };
            let g = if i + 1 == n { out_grad } else { after[0].in_grad() };
            current[0].backward(x, g)?;
        }
        Ok(self.components[0].in_grad())
    }

    fn output(&self) -> &Tensor<T> {
        self.components.last().map_or(&self.empty, |m| m.output())
    }

    fn in_grad(&self) -> &Tensor<T> {
        self.components.first().map_or(&self.empty, |m| m.in_grad())
    }

    fn input_shape(&self) -> Vec<usize> {
        self.components.first().map(|m| m.input_shape()).unwrap_or_default()
    }

    fn output_shape(&self) -> Vec<usize> {
        self.components.last().map(|m| m.output_shape()).unwrap_or_default()
    }

    fn batch(&self) -> usize {
        self.components.first().map_or(0, |m| m.batch())
    }

    fn set_inputs(&mut self, shape: &[usize]) -> Result<(), NeuraRustError> {
        self.require_components("set_inputs")?;
        self.components[0].set_inputs(shape)?;
        self.propagate_from(1)
    }

    fn set_outputs(&mut self, shape: &[usize]) -> Result<(), NeuraRustError> {
        let n = self.require_components("set_outputs")?;
        self.components[n - 1].set_outputs(shape)
    }

    fn set_batch(&mut self, batch: usize) -> Result<(), NeuraRustError> {
        self.components.iter_mut().try_for_each(|m| m.set_batch(batch))
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
        let mut node = ModuleNode::new("Sequential");
        for m in &self.components {
            node = node.with_child(m.save()?);
        }
        Ok(node)
    }
}

impl<T: NeuraNumeric> Container<T> for Sequential<T> {
    fn add(&mut self, mut module: Box<dyn Module<T>>) -> Result<(), NeuraRustError> {
        if let Some(last) = self.components.last() {
            let shape = last.output_shape();
            if shape_is_set(&shape) {
                module.set_inputs(&shape)?;
            }
        }
        self.components.push(module);
        Ok(())
    }

    fn remove(&mut self, index: usize) -> Result<Box<dyn Module<T>>, NeuraRustError> {
        if index >= self.components.len() {
            return Err(usage_error(format!(
                "cannot remove component {} of a Sequential with {}",
                index,
                self.components.len()
            )));
        }
        let removed = self.components.remove(index);
        log::debug!("Sequential removed {} at {}, re-propagating shapes", removed.type_name(), index);
        self.propagate_from(index)?;
        Ok(removed)
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
#[path = "sequential_test.rs"]
mod tests;
