use crate::module::{check_input, Module};
use crate::serialize::{ModuleNode, ModuleRegistry};
use neurarust_tensor::{NeuraNumeric, NeuraRustError, Tensor};

/// Added to the variance before the inverse square root.
const VARIANCE_FLOOR: f64 = 1e-12;

/// Batch normalization over `[batch, features]` inputs.
///
/// In training mode each feature column is normalized with the batch mean and
/// the *population* (divide by `n`) variance, while the running variance used
/// at inference time is updated with the *sample* (divide by `n - 1`)
/// variance. In inference mode the running statistics are used as-is.
#[derive(Debug, Clone)]
pub struct BatchNorm<T> {
    weights: Tensor<T>,
    biases: Tensor<T>,
    weights_grad: Tensor<T>,
    biases_grad: Tensor<T>,
    running_mean: Tensor<T>,
    running_var: Tensor<T>,
    mean: Tensor<T>,
    inv_std: Tensor<T>,
    normalized: Tensor<T>,
    output: Tensor<T>,
    in_grad: Tensor<T>,
    momentum: f64,
    training: bool,
}

impl<T: NeuraNumeric> BatchNorm<T> {
    /// Unit scale, zero shift, running statistics at mean 0 and variance 1,
    /// momentum 0.1.
    pub fn new(features: usize) -> Result<Self, NeuraRustError> {
        if features == 0 {
            return Err(NeuraRustError::ConfigurationError(
                "BatchNorm needs at least one feature".to_string(),
            ));
        }
        Ok(BatchNorm {
            weights: Tensor::ones(&[features]),
            biases: Tensor::zeros(&[features]),
            weights_grad: Tensor::zeros(&[features]),
            biases_grad: Tensor::zeros(&[features]),
            running_mean: Tensor::zeros(&[features]),
            running_var: Tensor::ones(&[features]),
            mean: Tensor::zeros(&[features]),
            inv_std: Tensor::ones(&[features]),
            normalized: Tensor::empty(),
            output: Tensor::empty(),
            in_grad: Tensor::empty(),
            momentum: 0.1,
            training: true,
        })
    }

    /// Sets the weight given to the newest batch statistics.
    ///
    /// # Errors
    /// Returns `ConfigurationError` unless `0 <= momentum <= 1`.
    pub fn with_momentum(mut self, momentum: f64) -> Result<Self, NeuraRustError> {
        if !(0.0..=1.0).contains(&momentum) {
            return Err(NeuraRustError::ConfigurationError(format!(
                "BatchNorm momentum must be in [0, 1], got {}",
                momentum
            )));
        }
        self.momentum = momentum;
        Ok(self)
    }

    pub fn features(&self) -> usize {
        self.weights.size()
    }

    pub fn momentum(&self) -> f64 {
        self.momentum
    }

    pub fn running_mean(&self) -> &Tensor<T> {
        &self.running_mean
    }

    pub fn running_var(&self) -> &Tensor<T> {
        &self.running_var
    }

    pub fn weights(&self) -> &Tensor<T> {
        &self.weights
    }

    pub fn biases(&self) -> &Tensor<T> {
        &self.biases
    }

    /// Computes batch statistics and folds them into the running ones.
    fn update_statistics(&mut self, input: &Tensor<T>, rows: usize) {
        let cols = self.features();
        let n = T::from_f64_lossy(rows as f64);
        let momentum = T::from_f64_lossy(self.momentum);
        let keep = T::one() - momentum;
        let floor = T::from_f64_lossy(VARIANCE_FLOOR);
        if rows == 1 {
            log::warn!("BatchNorm running variance updated from a batch of one; using the biased estimate");
        }
        for j in 0..cols {
            let column = || input.data().iter().skip(j).step_by(cols).copied();
            let mean = column().sum::<T>() / n;
            let sq: T = column().map(|x| (x - mean) * (x - mean)).sum();
            let biased = sq / n;
            let unbiased = if rows > 1 { sq / (n - T::one()) } else { biased };

            self.mean[j] = mean;
            self.inv_std[j] = T::one() / (biased + floor).sqrt();
            self.running_mean[j] = self.running_mean[j] * keep + momentum * mean;
            self.running_var[j] = self.running_var[j] * keep + momentum * unbiased;
        }
    }

    fn use_running_statistics(&mut self) {
        let floor = T::from_f64_lossy(VARIANCE_FLOOR);
        self.mean.copy_from_(&self.running_mean);
        self.inv_std.copy_from_(&self.running_var);
        self.inv_std.map_(|v| T::one() / (v + floor).sqrt());
    }

    pub fn load(node: &ModuleNode, _registry: &ModuleRegistry<T>) -> Result<Self, NeuraRustError> {
        node.expect_kind("BatchNorm")?;
        let weights: Tensor<T> = node.tensor("weights")?;
        let mut layer = Self::new(weights.size())?.with_momentum(node.attr_or("momentum", 0.1))?;
        let features = [layer.features()];
        for (name, target) in [
            ("weights", &mut layer.weights),
            ("biases", &mut layer.biases),
            ("running_mean", &mut layer.running_mean),
            ("running_var", &mut layer.running_var),
        ] {
            let value = node.tensor(name)?;
            value
                .expect_shape(&features, "BatchNorm load")
                .map_err(|e| NeuraRustError::SerializationError(e.to_string()))?;
            *target = value;
        }
        Ok(layer)
    }
}

impl<T: NeuraNumeric> Module<T> for BatchNorm<T> {
    fn type_name(&self) -> &'static str {
        "BatchNorm"
    }

    fn forward(&mut self, input: &Tensor<T>) -> Result<&Tensor<T>, NeuraRustError> {
        let rows = check_input(input, &[self.features()], "BatchNorm forward")?;
        let cols = self.features();
        if self.training && rows > 0 {
            self.update_statistics(input, rows);
        } else {
            self.use_running_statistics();
        }

        self.normalized.resize(input.shape());
        self.output.resize(input.shape());
        for ((x, xhat), y) in input
            .data()
            .chunks(cols)
            .zip(self.normalized.data_mut().chunks_mut(cols))
            .zip(self.output.data_mut().chunks_mut(cols))
        {
            for j in 0..cols {
                xhat[j] = (x[j] - self.mean[j]) * self.inv_std[j];
                y[j] = xhat[j] * self.weights[j] + self.biases[j];
            }
        }
        Ok(&self.output)
    }

    fn backward(&mut self, input: &Tensor<T>, out_grad: &Tensor<T>) -> Result<&Tensor<T>, NeuraRustError> {
        let rows = check_input(input, &[self.features()], "BatchNorm backward")?;
        out_grad.expect_shape(input.shape(), "BatchNorm backward")?;
        self.normalized.expect_shape(input.shape(), "BatchNorm backward")?;
        let cols = self.features();
        self.in_grad.resize(input.shape());
        let g = out_grad.data();
        let xhat = self.normalized.data();

        for j in 0..cols {
            let mut sum_g = T::zero();
            let mut sum_g_xhat = T::zero();
            for i in 0..rows {
                sum_g += g[i * cols + j];
                sum_g_xhat += g[i * cols + j] * xhat[i * cols + j];
            }
            self.biases_grad[j] += sum_g;
            self.weights_grad[j] += sum_g_xhat;

            let w = self.weights[j];
            let inv_std = self.inv_std[j];
            let d = self.in_grad.data_mut();
            if self.training {
                // dxhat = g * w, so the column sums are the sums above scaled by w
                let n = T::from_f64_lossy(rows as f64);
                let sum_dxhat = sum_g * w;
                let sum_dxhat_xhat = sum_g_xhat * w;
                for i in 0..rows {
                    let k = i * cols + j;
                    d[k] = inv_std / n * (n * g[k] * w - sum_dxhat - xhat[k] * sum_dxhat_xhat);
                }
            } else {
                for i in 0..rows {
                    let k = i * cols + j;
                    d[k] = g[k] * inv_std * w;
                }
            }
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
        vec![self.features()]
    }

    fn output_shape(&self) -> Vec<usize> {
        vec![self.features()]
    }

    fn batch(&self) -> usize {
        self.output.shape().first().copied().unwrap_or(0)
    }

    fn set_inputs(&mut self, shape: &[usize]) -> Result<(), NeuraRustError> {
        match shape {
            [features] if *features == self.features() => Ok(()),
            [features] => {
                log::debug!("BatchNorm resized from {} to {} features", self.features(), features);
                let batch = self.batch();
                let momentum = self.momentum;
                let training = self.training;
                *self = Self::new(*features)?.with_momentum(momentum)?;
                self.training = training;
                self.set_batch(batch)
            }
            _ => Err(NeuraRustError::shape_mismatch(&[self.features()], shape, "BatchNorm set_inputs")),
        }
    }

    fn set_outputs(&mut self, shape: &[usize]) -> Result<(), NeuraRustError> {
        self.set_inputs(shape)
    }

    fn set_batch(&mut self, batch: usize) -> Result<(), NeuraRustError> {
        let shape = [batch, self.features()];
        self.normalized.resize(&shape);
        self.output.resize(&shape);
        self.in_grad.resize(&shape);
        Ok(())
    }

    fn params(&self) -> Vec<&Tensor<T>> {
        vec![&self.weights, &self.biases]
    }

    fn params_mut(&mut self) -> Vec<&mut Tensor<T>> {
        vec![&mut self.weights, &mut self.biases]
    }

    fn grads(&self) -> Vec<&Tensor<T>> {
        vec![&self.weights_grad, &self.biases_grad]
    }

    fn grads_mut(&mut self) -> Vec<&mut Tensor<T>> {
        vec![&mut self.weights_grad, &mut self.biases_grad]
    }

    fn states(&self) -> Vec<&Tensor<T>> {
        vec![&self.running_mean, &self.running_var]
    }

    fn states_mut(&mut self) -> Vec<&mut Tensor<T>> {
        vec![&mut self.running_mean, &mut self.running_var]
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    fn is_training(&self) -> bool {
        self.training
    }

    fn clone_module(&self) -> Box<dyn Module<T>> {
        Box::new(self.clone())
    }

    fn save(&self) -> Result<ModuleNode, NeuraRustError> {
        Ok(ModuleNode::new("BatchNorm")
            .with_attr("momentum", self.momentum)
            .with_tensor("weights", &self.weights)
            .with_tensor("biases", &self.biases)
            .with_tensor("running_mean", &self.running_mean)
            .with_tensor("running_var", &self.running_var))
    }
}

#[cfg(test)]
#[path = "batchnorm_test.rs"]
mod tests;
