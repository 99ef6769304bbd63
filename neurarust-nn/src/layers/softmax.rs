//! Row-wise normalizing activations over `[batch, features]` inputs.

use crate::module::{batched, Module};
use crate::serialize::{ModuleNode, ModuleRegistry};
use neurarust_tensor::{NeuraNumeric, NeuraRustError, Tensor};

/// Writes `x - max(x) - ln(sum(exp(x - max(x))))` for one row.
fn log_softmax_row<T: NeuraNumeric>(x: &[T], y: &mut [T]) {
    let max = x.iter().copied().fold(T::neg_infinity(), T::max);
    let log_sum = x.iter().map(|&v| (v - max).exp()).sum::<T>().ln();
    for (yi, &xi) in y.iter_mut().zip(x) {
        *yi = xi - max - log_sum;
    }
}

fn check_rows<T: NeuraNumeric>(input: &Tensor<T>, operation: &str) -> Result<(usize, usize), NeuraRustError> {
    let (rows, cols) = input.expect_matrix(operation)?;
    if cols == 0 {
        return Err(NeuraRustError::shape_mismatch(&[rows, 1], input.shape(), operation));
    }
    Ok((rows, cols))
}

macro_rules! row_normalizer_common {
    () => {
        fn output(&self) -> &Tensor<T> {
            &self.output
        }

        fn in_grad(&self) -> &Tensor<T> {
            &self.in_grad
        }

        fn input_shape(&self) -> Vec<usize> {
            self.features.map(|f| vec![f]).unwrap_or_default()
        }

        fn output_shape(&self) -> Vec<usize> {
            self.input_shape()
        }

        fn batch(&self) -> usize {
            self.output.shape().first().copied().unwrap_or(0)
        }

        fn set_inputs(&mut self, shape: &[usize]) -> Result<(), NeuraRustError> {
            match shape {
                [features] => {
                    self.features = Some(*features);
                    let batch = self.batch();
                    self.set_batch(batch)
                }
                _ => Err(NeuraRustError::shape_mismatch(&[0], shape, "set_inputs")),
            }
        }

        fn set_outputs(&mut self, shape: &[usize]) -> Result<(), NeuraRustError> {
            self.set_inputs(shape)
        }

        fn set_batch(&mut self, batch: usize) -> Result<(), NeuraRustError> {
            let shape = batched(batch, &self.input_shape());
            self.output.resize(&shape);
            self.in_grad.resize(&shape);
            Ok(())
        }

        fn clone_module(&self) -> Box<dyn Module<T>> {
            Box::new(self.clone())
        }
    };
}

/// `y = log(softmax(x))`, computed with the log-sum-exp shift so large
/// inputs neither overflow nor lose precision.
#[derive(Debug, Clone)]
pub struct LogSoftMax<T> {
    features: Option<usize>,
    output: Tensor<T>,
    in_grad: Tensor<T>,
}

impl<T: NeuraNumeric> LogSoftMax<T> {
    pub fn new() -> Self {
        LogSoftMax {
            features: None,
            output: Tensor::empty(),
            in_grad: Tensor::empty(),
        }
    }

    pub fn load(node: &ModuleNode, _registry: &ModuleRegistry<T>) -> Result<Self, NeuraRustError> {
        node.expect_kind("LogSoftMax")?;
        Ok(Self::new())
    }
}

impl<T: NeuraNumeric> Default for LogSoftMax<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: NeuraNumeric> Module<T> for LogSoftMax<T> {
    fn type_name(&self) -> &'static str {
        "LogSoftMax"
    }

    fn forward(&mut self, input: &Tensor<T>) -> Result<&Tensor<T>, NeuraRustError> {
        let (rows, cols) = check_rows(input, "LogSoftMax forward")?;
        self.features = Some(cols);
        self.output.resize(&[rows, cols]);
        for (x, y) in input.data().chunks(cols).zip(self.output.data_mut().chunks_mut(cols)) {
            log_softmax_row(x, y);
        }
        Ok(&self.output)
    }

    /// `inGrad = g - exp(y) * rowsum(g)`.
    fn backward(&mut self, input: &Tensor<T>, out_grad: &Tensor<T>) -> Result<&Tensor<T>, NeuraRustError> {
        let (rows, cols) = check_rows(input, "LogSoftMax backward")?;
        self.output.expect_shape(&[rows, cols], "LogSoftMax backward")?;
        out_grad.expect_shape(&[rows, cols], "LogSoftMax backward")?;
        self.in_grad.resize(&[rows, cols]);
        for ((d, y), g) in self
            .in_grad
            .data_mut()
            .chunks_mut(cols)
            .zip(self.output.data().chunks(cols))
            .zip(out_grad.data().chunks(cols))
        {
            let total: T = g.iter().copied().sum();
            for ((di, &yi), &gi) in d.iter_mut().zip(y).zip(g) {
                *di = gi - yi.exp() * total;
            }
        }
        Ok(&self.in_grad)
    }

    row_normalizer_common!();

    fn save(&self) -> Result<ModuleNode, NeuraRustError> {
        Ok(ModuleNode::new("LogSoftMax"))
    }
}

/// Row-wise softmax.
#[derive(Debug, Clone)]
pub struct SoftMax<T> {
    features: Option<usize>,
    output: Tensor<T>,
    in_grad: Tensor<T>,
}

impl<T: NeuraNumeric> SoftMax<T> {
    pub fn new() -> Self {
        SoftMax {
            features: None,
            output: Tensor::empty(),
            in_grad: Tensor::empty(),
        }
    }

    pub fn load(node: &ModuleNode, _registry: &ModuleRegistry<T>) -> Result<Self, NeuraRustError> {
        node.expect_kind("SoftMax")?;
        Ok(Self::new())
    }
}

impl<T: NeuraNumeric> Default for SoftMax<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: NeuraNumeric> Module<T> for SoftMax<T> {
    fn type_name(&self) -> &'static str {
        "SoftMax"
    }

    fn forward(&mut self, input: &Tensor<T>) -> Result<&Tensor<T>, NeuraRustError> {
        let (rows, cols) = check_rows(input, "SoftMax forward")?;
        self.features = Some(cols);
        self.output.resize(&[rows, cols]);
        for (x, y) in input.data().chunks(cols).zip(self.output.data_mut().chunks_mut(cols)) {
            log_softmax_row(x, y);
            y.iter_mut().for_each(|v| *v = v.exp());
        }
        Ok(&self.output)
    }

    /// `inGrad = y * (g - rowsum(g * y))`.
    fn backward(&mut self, input: &Tensor<T>, out_grad: &Tensor<T>) -> Result<&Tensor<T>, NeuraRustError> {
        let (rows, cols) = check_rows(input, "SoftMax backward")?;
        self.output.expect_shape(&[rows, cols], "SoftMax backward")?;
        out_grad.expect_shape(&[rows, cols], "SoftMax backward")?;
        self.in_grad.resize(&[rows, cols]);
        for ((d, y), g) in self
            .in_grad
            .data_mut()
            .chunks_mut(cols)
            .zip(self.output.data().chunks(cols))
            .zip(out_grad.data().chunks(cols))
        {
            let dot: T = y.iter().zip(g).map(|(&yi, &gi)| yi * gi).sum();
            for ((di, &yi), &gi) in d.iter_mut().zip(y).zip(g) {
                *di = yi * (gi - dot);
            }
        }
        Ok(&self.in_grad)
    }

    row_normalizer_common!();

    fn save(&self) -> Result<ModuleNode, NeuraRustError> {
        Ok(ModuleNode::new("SoftMax"))
    }
}

#[cfg(test)]
#[path = "softmax_test.rs"]
mod tests;
