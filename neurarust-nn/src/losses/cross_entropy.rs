use super::{check_same_shape, Critic};
use neurarust_tensor::{NeuraNumeric, NeuraRustError, Tensor};

/// Probabilities are floored here before the logarithm.
const PROBABILITY_FLOOR: f64 = 1e-12;

/// Cross-entropy between row-stochastic predictions and one-hot (or soft)
/// target rows: `-sum(t * ln(p)) / batch`.
#[derive(Debug, Clone)]
pub struct CrossEntropy<T> {
    in_grad: Tensor<T>,
}

impl<T: NeuraNumeric> CrossEntropy<T> {
    pub fn new() -> Self {
        CrossEntropy {
            in_grad: Tensor::empty(),
        }
    }
}

impl<T: NeuraNumeric> Default for CrossEntropy<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn batch_of<T: NeuraNumeric>(prediction: &Tensor<T>) -> T {
    T::from_f64_lossy(prediction.shape().first().copied().unwrap_or(0).max(1) as f64)
}

impl<T: NeuraNumeric> Critic<T> for CrossEntropy<T> {
    fn type_name(&self) -> &'static str {
        "CrossEntropy"
    }

    fn forward(&mut self, prediction: &Tensor<T>, target: &Tensor<T>) -> Result<T, NeuraRustError> {
        check_same_shape(prediction, target, "CrossEntropy forward")?;
        let floor = T::from_f64_lossy(PROBABILITY_FLOOR);
        let total = prediction.zip_map(target, |p, t| t * p.max(floor).ln())?.sum();
        Ok(-total / batch_of(prediction))
    }

    fn backward(&mut self, prediction: &Tensor<T>, target: &Tensor<T>) -> Result<&Tensor<T>, NeuraRustError> {
        check_same_shape(prediction, target, "CrossEntropy backward")?;
        let floor = T::from_f64_lossy(PROBABILITY_FLOOR);
        let batch = batch_of(prediction);
        self.in_grad = prediction.zip_map(target, |p, t| -t / p.max(floor) / batch)?;
        Ok(&self.in_grad)
    }

    fn in_grad(&self) -> &Tensor<T> {
        &self.in_grad
    }

    fn clone_critic(&self) -> Box<dyn Critic<T>> {
        Box::new(self.clone())
    }
}
