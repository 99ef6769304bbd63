use super::{check_same_shape, Critic};
use neurarust_tensor::{NeuraNumeric, NeuraRustError, Tensor};

/// Half the sum of squared errors, `0.5 * sum((p - t)^2)`; gradient `p - t`.
#[derive(Debug, Clone)]
pub struct Sse<T> {
    in_grad: Tensor<T>,
}

impl<T: NeuraNumeric> Sse<T> {
    pub fn new() -> Self {
        Sse {
            in_grad: Tensor::empty(),
        }
    }
}

impl<T: NeuraNumeric> Default for Sse<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: NeuraNumeric> Critic<T> for Sse<T> {
    fn type_name(&self) -> &'static str {
        "SSE"
    }

    fn forward(&mut self, prediction: &Tensor<T>, target: &Tensor<T>) -> Result<T, NeuraRustError> {
        check_same_shape(prediction, target, "SSE forward")?;
        Ok(T::from_f64_lossy(0.5) * prediction.sub(target)?.square_sum())
    }

    fn backward(&mut self, prediction: &Tensor<T>, target: &Tensor<T>) -> Result<&Tensor<T>, NeuraRustError> {
        check_same_shape(prediction, target, "SSE backward")?;
        self.in_grad = prediction.sub(target)?;
        Ok(&self.in_grad)
    }

    fn in_grad(&self) -> &Tensor<T> {
        &self.in_grad
    }

    fn clone_critic(&self) -> Box<dyn Critic<T>> {
        Box::new(self.clone())
    }
}
