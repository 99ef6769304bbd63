use super::Critic;
use neurarust_tensor::{NeuraNumeric, NeuraRustError, Tensor};

/// Negative log-likelihood over log-probabilities.
///
/// `prediction` is `[batch, classes]` (typically the output of a
/// `LogSoftMax`); `target` is a `[batch, 1]` column of class indices. The
/// loss is `-mean_i p[i, target[i]]`.
#[derive(Debug, Clone)]
pub struct Nll<T> {
    in_grad: Tensor<T>,
}

impl<T: NeuraNumeric> Nll<T> {
    pub fn new() -> Self {
        Nll {
            in_grad: Tensor::empty(),
        }
    }

    /// Validates the target column and returns one class index per row.
    fn classes(prediction: &Tensor<T>, target: &Tensor<T>, operation: &str) -> Result<Vec<usize>, NeuraRustError> {
        let (batch, classes) = prediction.expect_matrix(operation)?;
        target.expect_shape(&[batch, 1], operation)?;
        target
            .data()
            .iter()
            .map(|&value| {
                let index = value.to_f64_lossless();
                if index < 0.0 || index.fract() != 0.0 || index >= classes as f64 {
                    return Err(NeuraRustError::NumericDomainError(format!(
                        "{}: class index must be an integer in [0, {}), got {}",
                        operation, classes, index
                    )));
                }
                Ok(index as usize)
            })
            .collect()
    }
}

impl<T: NeuraNumeric> Default for Nll<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: NeuraNumeric> Critic<T> for Nll<T> {
    fn type_name(&self) -> &'static str {
        "NLL"
    }

    fn forward(&mut self, prediction: &Tensor<T>, target: &Tensor<T>) -> Result<T, NeuraRustError> {
        let indices = Self::classes(prediction, target, "NLL forward")?;
        if indices.is_empty() {
            return Ok(T::zero());
        }
        let mut total = T::zero();
        for (row, &class) in indices.iter().enumerate() {
            total -= prediction.at2(row, class)?;
        }
        Ok(total / T::from_f64_lossy(indices.len() as f64))
    }

    fn backward(&mut self, prediction: &Tensor<T>, target: &Tensor<T>) -> Result<&Tensor<T>, NeuraRustError> {
        let indices = Self::classes(prediction, target, "NLL backward")?;
        self.in_grad = Tensor::zeros(prediction.shape());
        let weight = -T::one() / T::from_f64_lossy(indices.len().max(1) as f64);
        for (row, &class) in indices.iter().enumerate() {
            self.in_grad.set2(row, class, weight)?;
        }
        Ok(&self.in_grad)
    }

    fn in_grad(&self) -> &Tensor<T> {
        &self.in_grad
    }

    fn clone_critic(&self) -> Box<dyn Critic<T>> {
        Box::new(self.clone())
    }
}
