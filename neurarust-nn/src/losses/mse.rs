use super::{check_same_shape, Critic};
use neurarust_tensor::{NeuraNumeric, NeuraRustError, Tensor};

/// Mean squared error, `mean((p - t)^2)` over every element.
///
/// The gradient is reported as `p - t`, without the `2 / n` factor of the
/// exact derivative, so step sizes do not depend on the batch size.
#[derive(Debug, Clone)]
pub struct Mse<T> {
    in_grad: Tensor<T>,
}

impl<T: NeuraNumeric> Mse<T> {
    pub fn new() -> Self {
        Mse {
            in_grad: Tensor::empty(),
        }
    }
}

impl<T: NeuraNumeric> Default for Mse<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: NeuraNumeric> Critic<T> for Mse<T> {
    fn type_name(&self) -> &'static str {
        "MSE"
    }

    fn forward(&mut self, prediction: &Tensor<T>, target: &Tensor<T>) -> Result<T, NeuraRustError> {
        check_same_shape(prediction, target, "MSE forward")?;
        Ok(prediction.sub(target)?.square_sum() / T::from_f64_lossy(prediction.size().max(1) as f64))
    }

    fn backward(&mut self, prediction: &Tensor<T>, target: &Tensor<T>) -> Result<&Tensor<T>, NeuraRustError> {
        check_same_shape(prediction, target, "MSE backward")?;
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
