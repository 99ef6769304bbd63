//! Pointwise activation layers.
//!
//! A [`Map`] applies a scalar [`Activation`] to every element. The input and
//! output shapes are always identical, and the layer adopts whatever feature
//! shape it is fed.

use crate::module::{check_input, Module};
use crate::serialize::{ModuleNode, ModuleRegistry};
use neurarust_tensor::{NeuraNumeric, NeuraRustError, Tensor};
use std::fmt::Debug;

/// A scalar function and its derivative.
///
/// `derivative` receives both the input `x` and the already computed output
/// `y = apply(x)`, so implementations can use whichever is cheaper.
pub trait Activation<T: NeuraNumeric>: Debug + Clone + Send + 'static {
    fn name(&self) -> &'static str;

    fn apply(&self, x: T) -> T;

    fn derivative(&self, x: T, y: T) -> T;

    fn save_attrs(&self, node: ModuleNode) -> ModuleNode {
        node
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IdentityFn;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LogisticFn;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TanhFn;

/// Leaky rectifier; `leak == 0` is the plain ReLU.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReluFn {
    leak: f64,
}

impl<T: NeuraNumeric> Activation<T> for IdentityFn {
    fn name(&self) -> &'static str {
        "Identity"
    }

    fn apply(&self, x: T) -> T {
        x
    }

    fn derivative(&self, _x: T, _y: T) -> T {
        T::one()
    }
}

impl<T: NeuraNumeric> Activation<T> for LogisticFn {
    fn name(&self) -> &'static str {
        "Logistic"
    }

    fn apply(&self, x: T) -> T {
        logistic(x)
    }

    fn derivative(&self, _x: T, y: T) -> T {
        y * (T::one() - y)
    }
}

impl<T: NeuraNumeric> Activation<T> for TanhFn {
    fn name(&self) -> &'static str {
        "TanH"
    }

    fn apply(&self, x: T) -> T {
        x.tanh()
    }

    fn derivative(&self, _x: T, y: T) -> T {
        T::one() - y * y
    }
}

impl<T: NeuraNumeric> Activation<T> for ReluFn {
    fn name(&self) -> &'static str {
        "ReLU"
    }

    fn apply(&self, x: T) -> T {
        if x > T::zero() {
            x
        } else {
            T::from_f64_lossy(self.leak) * x
        }
    }

    fn derivative(&self, x: T, _y: T) -> T {
        if x > T::zero() {
            T::one()
        } else {
            T::from_f64_lossy(self.leak)
        }
    }

    fn save_attrs(&self, node: ModuleNode) -> ModuleNode {
        node.with_attr("leak", self.leak)
    }
}

/// The logistic sigmoid `1 / (1 + e^-x)`.
pub fn logistic<T: NeuraNumeric>(x: T) -> T {
    T::one() / (T::one() + (-x).exp())
}

#[derive(Debug, Clone)]
pub struct Map<T, A> {
    activation: A,
    shape: Vec<usize>,
    output: Tensor<T>,
    in_grad: Tensor<T>,
}

pub type Identity<T> = Map<T, IdentityFn>;
pub type Logistic<T> = Map<T, LogisticFn>;
pub type TanH<T> = Map<T, TanhFn>;
pub type ReLU<T> = Map<T, ReluFn>;

impl<T: NeuraNumeric, A: Activation<T>> Map<T, A> {
    pub fn with_activation(activation: A) -> Self {
        Map {
            activation,
            shape: Vec::new(),
            output: Tensor::empty(),
            in_grad: Tensor::empty(),
        }
    }

    pub fn activation(&self) -> &A {
        &self.activation
    }
}

impl<T: NeuraNumeric, A: Activation<T> + Default> Map<T, A> {
    pub fn new() -> Self {
        Self::with_activation(A::default())
    }
}

impl<T: NeuraNumeric, A: Activation<T> + Default> Default for Map<T, A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: NeuraNumeric> Map<T, ReluFn> {
    /// A leaky ReLU passing `leak * x` for non-positive inputs.
    ///
    /// # Errors
    /// Returns `ConfigurationError` unless `0 <= leak < 1`.
    pub fn leaky(leak: f64) -> Result<Self, NeuraRustError> {
        if !(0.0..1.0).contains(&leak) {
            return Err(NeuraRustError::ConfigurationError(format!(
                "ReLU leak must be in [0, 1), got {}",
                leak
            )));
        }
        Ok(Self::with_activation(ReluFn { leak }))
    }

    pub fn leak(&self) -> f64 {
        self.activation.leak
    }
}

impl<T: NeuraNumeric> Identity<T> {
    pub fn load(node: &ModuleNode, _registry: &ModuleRegistry<T>) -> Result<Self, NeuraRustError> {
        node.expect_kind("Identity")?;
        Ok(Self::new())
    }
}

impl<T: NeuraNumeric> Logistic<T> {
    pub fn load(node: &ModuleNode, _registry: &ModuleRegistry<T>) -> Result<Self, NeuraRustError> {
        node.expect_kind("Logistic")?;
        Ok(Self::new())
    }
}

impl<T: NeuraNumeric> TanH<T> {
    pub fn load(node: &ModuleNode, _registry: &ModuleRegistry<T>) -> Result<Self, NeuraRustError> {
        node.expect_kind("TanH")?;
        Ok(Self::new())
    }
}

impl<T: NeuraNumeric> ReLU<T> {
    pub fn load(node: &ModuleNode, _registry: &ModuleRegistry<T>) -> Result<Self, NeuraRustError> {
        node.expect_kind("ReLU")?;
        Self::leaky(node.attr_or("leak", 0.0))
    }
}

impl<T: NeuraNumeric, A: Activation<T>> Module<T> for Map<T, A> {
    fn type_name(&self) -> &'static str {
        self.activation.name()
    }

    fn forward(&mut self, input: &Tensor<T>) -> Result<&Tensor<T>, NeuraRustError> {
        if input.rank() == 0 {
            return Err(NeuraRustError::shape_mismatch(&[0], input.shape(), "Map forward"));
        }
        self.shape = input.feature_shape().to_vec();
        let activation = &self.activation;
        self.output.copy_from_(input);
        self.output.map_(|x| activation.apply(x));
        Ok(&self.output)
    }

    fn backward(&mut self, input: &Tensor<T>, out_grad: &Tensor<T>) -> Result<&Tensor<T>, NeuraRustError> {
        check_input(input, &self.shape, "Map backward")?;
        input.expect_shape(self.output.shape(), "Map backward")?;
        out_grad.expect_shape(self.output.shape(), "Map backward")?;
        self.in_grad.resize(input.shape());
        let activation = &self.activation;
        for (((d, &x), &y), &g) in self
            .in_grad
            .data_mut()
            .iter_mut()
            .zip(input.data())
            .zip(self.output.data())
            .zip(out_grad.data())
        {
            *d = g * activation.derivative(x, y);
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
        let shape = crate::module::batched(batch, &self.shape);
        self.output.resize(&shape);
        self.in_grad.resize(&shape);
        Ok(())
    }

    fn clone_module(&self) -> Box<dyn Module<T>> {
        Box::new(self.clone())
    }

    fn save(&self) -> Result<ModuleNode, NeuraRustError> {
        Ok(self.activation.save_attrs(ModuleNode::new(self.activation.name())))
    }
}

#[cfg(test)]
#[path = "map_test.rs"]
mod tests;
