use crate::init::normal_;
use crate::module::{check_input, Module};
use crate::serialize::{ModuleNode, ModuleRegistry};
use neurarust_tensor::linalg::{gemm, Transpose};
use neurarust_tensor::{NeuraNumeric, NeuraRustError, Tensor};
use rand::Rng;

/// Geometry of a [`Convolution`] layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvolutionConfig {
    pub channels: usize,
    pub rows: usize,
    pub cols: usize,
    pub filters: usize,
    pub kernel_rows: usize,
    pub kernel_cols: usize,
    pub stride: usize,
    pub padding: usize,
}

impl ConvolutionConfig {
    /// Unit stride, no padding.
    pub fn new(
        channels: usize,
        rows: usize,
        cols: usize,
        filters: usize,
        kernel_rows: usize,
        kernel_cols: usize,
    ) -> Self {
        ConvolutionConfig {
            channels,
            rows,
            cols,
            filters,
            kernel_rows,
            kernel_cols,
            stride: 1,
            padding: 0,
        }
    }

    pub fn with_stride(mut self, stride: usize) -> Self {
        self.stride = stride;
        self
    }

    pub fn with_padding(mut self, padding: usize) -> Self {
        self.padding = padding;
        self
    }

    pub fn validate(&self) -> Result<(), NeuraRustError> {
        let dims = [
            self.channels,
            self.rows,
            self.cols,
            self.filters,
            self.kernel_rows,
            self.kernel_cols,
            self.stride,
        ];
        if dims.iter().any(|&d| d == 0) {
            return Err(NeuraRustError::ConfigurationError(format!(
                "Convolution sizes and stride must be positive: {:?}",
                self
            )));
        }
        if self.rows + 2 * self.padding < self.kernel_rows || self.cols + 2 * self.padding < self.kernel_cols {
            return Err(NeuraRustError::ConfigurationError(format!(
                "Convolution kernel {}x{} does not fit a padded {}x{} input",
                self.kernel_rows,
                self.kernel_cols,
                self.rows + 2 * self.padding,
                self.cols + 2 * self.padding
            )));
        }
        Ok(())
    }

    pub fn output_rows(&self) -> usize {
        (self.rows + 2 * self.padding - self.kernel_rows) / self.stride + 1
    }

    pub fn output_cols(&self) -> usize {
        (self.cols + 2 * self.padding - self.kernel_cols) / self.stride + 1
    }

    fn patch_size(&self) -> usize {
        self.channels * self.kernel_rows * self.kernel_cols
    }

    fn positions(&self) -> usize {
        self.output_rows() * self.output_cols()
    }

    /// Input row/column read by output position `o` at kernel offset `k`,
    /// or `None` when it falls in the padding.
    fn source(&self, o: usize, k: usize, extent: usize) -> Option<usize> {
        (o * self.stride + k).checked_sub(self.padding).filter(|&i| i < extent)
    }
}

/// 2-D convolution over `[batch, channels, rows, cols]` inputs, producing
/// `[batch, filters, output_rows, output_cols]`.
///
/// Each image is unfolded into a `[patch, positions]` matrix (im2col) so the
/// forward pass is one `gemm` per image; backward folds the column gradient
/// back onto the image (col2im).
#[derive(Debug, Clone)]
pub struct Convolution<T> {
    config: ConvolutionConfig,
    weights: Tensor<T>,
    bias: Tensor<T>,
    weights_grad: Tensor<T>,
    bias_grad: Tensor<T>,
    columns: Tensor<T>,
    output: Tensor<T>,
    in_grad: Tensor<T>,
}

impl<T: NeuraNumeric> Convolution<T> {
    pub fn new(config: ConvolutionConfig) -> Result<Self, NeuraRustError> {
        Self::with_rng(config, &mut rand::thread_rng())
    }

    pub fn with_rng<R: Rng + ?Sized>(config: ConvolutionConfig, rng: &mut R) -> Result<Self, NeuraRustError> {
        config.validate()?;
        let mut layer = Self::zeroed(config);
        normal_(&mut layer.weights, rng);
        normal_(&mut layer.bias, rng);
        Ok(layer)
    }

    /// Builds a layer from explicit filters (`[filters, channels * kernel_rows * kernel_cols]`)
    /// and bias (`[filters]`).
    pub fn from_parts(config: ConvolutionConfig, weights: Tensor<T>, bias: Tensor<T>) -> Result<Self, NeuraRustError> {
        config.validate()?;
        weights.expect_shape(&[config.filters, config.patch_size()], "Convolution weights")?;
        bias.expect_shape(&[config.filters], "Convolution bias")?;
        let mut layer = Self::zeroed(config);
        layer.weights = weights;
        layer.bias = bias;
        Ok(layer)
    }

    fn zeroed(config: ConvolutionConfig) -> Self {
        Convolution {
            config,
            weights: Tensor::zeros(&[config.filters, config.patch_size()]),
            bias: Tensor::zeros(&[config.filters]),
            weights_grad: Tensor::zeros(&[config.filters, config.patch_size()]),
            bias_grad: Tensor::zeros(&[config.filters]),
            columns: Tensor::zeros(&[config.patch_size(), config.positions()]),
            output: Tensor::empty(),
            in_grad: Tensor::empty(),
        }
    }

    pub fn config(&self) -> &ConvolutionConfig {
        &self.config
    }

    pub fn weights(&self) -> &Tensor<T> {
        &self.weights
    }

    pub fn bias(&self) -> &Tensor<T> {
        &self.bias
    }

    fn reconfigure(&mut self, config: ConvolutionConfig) -> Result<(), NeuraRustError> {
        if config == self.config {
            return Ok(());
        }
        config.validate()?;
        log::debug!("Convolution reconfigured to {:?}, re-randomizing parameters", config);
        let batch = self.batch();
        *self = Self::with_rng(config, &mut rand::thread_rng())?;
        self.set_batch(batch)
    }

    /// Unfolds one image into `self.columns`.
    fn im2col(&mut self, image: &[T]) {
        let c = self.config;
        let (out_rows, out_cols) = (c.output_rows(), c.output_cols());
        let columns = self.columns.data_mut();
        let mut row = 0;
        for ch in 0..c.channels {
            for ki in 0..c.kernel_rows {
                for kj in 0..c.kernel_cols {
                    let dst = &mut columns[row * out_rows * out_cols..(row + 1) * out_rows * out_cols];
                    for oi in 0..out_rows {
                        for oj in 0..out_cols {
                            dst[oi * out_cols + oj] = match (c.source(oi, ki, c.rows), c.source(oj, kj, c.cols)) {
                                (Some(r), Some(col)) => image[(ch * c.rows + r) * c.cols + col],
                                _ => T::zero(),
                            };
                        }
                    }
                    row += 1;
                }
            }
        }
    }

    /// Adds a `[patch, positions]` column gradient onto one image gradient.
    fn col2im(config: &ConvolutionConfig, columns: &[T], image: &mut [T]) {
        let c = config;
        let (out_rows, out_cols) = (c.output_rows(), c.output_cols());
        let mut row = 0;
        for ch in 0..c.channels {
            for ki in 0..c.kernel_rows {
                for kj in 0..c.kernel_cols {
                    let src = &columns[row * out_rows * out_cols..(row + 1) * out_rows * out_cols];
                    for oi in 0..out_rows {
                        for oj in 0..out_cols {
                            if let (Some(r), Some(col)) = (c.source(oi, ki, c.rows), c.source(oj, kj, c.cols)) {
                                image[(ch * c.rows + r) * c.cols + col] += src[oi * out_cols + oj];
                            }
                        }
                    }
                    row += 1;
                }
            }
        }
    }

    pub fn load(node: &ModuleNode, _registry: &ModuleRegistry<T>) -> Result<Self, NeuraRustError> {
        node.expect_kind("Convolution")?;
        let config = ConvolutionConfig {
            channels: node.attr_usize("channels")?,
            rows: node.attr_usize("rows")?,
            cols: node.attr_usize("cols")?,
            filters: node.attr_usize("filters")?,
            kernel_rows: node.attr_usize("kernel_rows")?,
            kernel_cols: node.attr_usize("kernel_cols")?,
            stride: node.attr_usize("stride")?,
            padding: node.attr_usize("padding")?,
        };
        Self::from_parts(config, node.tensor("weights")?, node.tensor("bias")?)
    }
}

impl<T: NeuraNumeric> Module<T> for Convolution<T> {
    fn type_name(&self) -> &'static str {
        "Convolution"
    }

    fn forward(&mut self, input: &Tensor<T>) -> Result<&Tensor<T>, NeuraRustError> {
        let batch = check_input(input, &self.input_shape(), "Convolution forward")?;
        let positions = self.config.positions();
        let filters = self.config.filters;
        self.output.resize(&[batch, filters, self.config.output_rows(), self.config.output_cols()]);
        let mut image_out = Tensor::zeros(&[filters, positions]);
        for b in 0..batch {
            self.im2col(input.slice0(b)?);
            gemm(T::one(), &self.weights, Transpose::No, &self.columns, Transpose::No, T::zero(), &mut image_out)?;
            for (row, &bias) in image_out.data_mut().chunks_mut(positions).zip(self.bias.data()) {
                row.iter_mut().for_each(|v| *v += bias);
            }
            self.output.slice0_mut(b)?.copy_from_slice(image_out.data());
        }
        Ok(&self.output)
    }

    fn backward(&mut self, input: &Tensor<T>, out_grad: &Tensor<T>) -> Result<&Tensor<T>, NeuraRustError> {
        let batch = check_input(input, &self.input_shape(), "Convolution backward")?;
        out_grad.expect_shape(self.output.shape(), "Convolution backward")?;
        let positions = self.config.positions();
        let filters = self.config.filters;
        self.in_grad.resize(input.shape());
        self.in_grad.fill_(T::zero());
        let mut column_grad = Tensor::zeros(&[self.config.patch_size(), positions]);
        for b in 0..batch {
            let image_grad = Tensor::new(out_grad.slice0(b)?.to_vec(), vec![filters, positions])?;
            self.im2col(input.slice0(b)?);
            gemm(T::one(), &image_grad, Transpose::No, &self.columns, Transpose::Yes, T::one(), &mut self.weights_grad)?;
            for (g, row) in self.bias_grad.data_mut().iter_mut().zip(image_grad.data().chunks(positions)) {
                *g += row.iter().copied().sum::<T>();
            }
            gemm(T::one(), &self.weights, Transpose::Yes, &image_grad, Transpose::No, T::zero(), &mut column_grad)?;
            Self::col2im(&self.config, column_grad.data(), self.in_grad.slice0_mut(b)?);
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
        vec![self.config.channels, self.config.rows, self.config.cols]
    }

    fn output_shape(&self) -> Vec<usize> {
        vec![self.config.filters, self.config.output_rows(), self.config.output_cols()]
    }

    fn batch(&self) -> usize {
        self.output.shape().first().copied().unwrap_or(0)
    }

    fn set_inputs(&mut self, shape: &[usize]) -> Result<(), NeuraRustError> {
        match shape {
            [channels, rows, cols] => self.reconfigure(ConvolutionConfig {
                channels: *channels,
                rows: *rows,
                cols: *cols,
                ..self.config
            }),
            _ => Err(NeuraRustError::shape_mismatch(&self.input_shape(), shape, "Convolution set_inputs")),
        }
    }

    /// Only the filter count can be changed; the spatial size follows from
    /// the input geometry.
    fn set_outputs(&mut self, shape: &[usize]) -> Result<(), NeuraRustError> {
        match shape {
            [filters, rows, cols] if *rows == self.config.output_rows() && *cols == self.config.output_cols() => {
                self.reconfigure(ConvolutionConfig {
                    filters: *filters,
                    ..self.config
                })
            }
            _ => Err(NeuraRustError::shape_mismatch(&self.output_shape(), shape, "Convolution set_outputs")),
        }
    }

    fn set_batch(&mut self, batch: usize) -> Result<(), NeuraRustError> {
        let mut out = vec![batch];
        out.extend(self.output_shape());
        self.output.resize(&out);
        let mut inp = vec![batch];
        inp.extend(self.input_shape());
        self.in_grad.resize(&inp);
        Ok(())
    }

    fn params(&self) -> Vec<&Tensor<T>> {
        vec![&self.weights, &self.bias]
    }

    fn params_mut(&mut self) -> Vec<&mut Tensor<T>> {
        vec![&mut self.weights, &mut self.bias]
    }

    fn grads(&self) -> Vec<&Tensor<T>> {
        vec![&self.weights_grad, &self.bias_grad]
    }

    fn grads_mut(&mut self) -> Vec<&mut Tensor<T>> {
        vec![&mut self.weights_grad, &mut self.bias_grad]
    }

    fn clone_module(&self) -> Box<dyn Module<T>> {
        Box::new(self.clone())
    }

    fn save(&self) -> Result<ModuleNode, NeuraRustError> {
        let c = &self.config;
        Ok(ModuleNode::new("Convolution")
            .with_attr("channels", c.channels as f64)
            .with_attr("rows", c.rows as f64)
            .with_attr("cols", c.cols as f64)
            .with_attr("filters", c.filters as f64)
            .with_attr("kernel_rows", c.kernel_rows as f64)
            .with_attr("kernel_cols", c.kernel_cols as f64)
            .with_attr("stride", c.stride as f64)
            .with_attr("padding", c.padding as f64)
            .with_tensor("weights", &self.weights)
            .with_tensor("bias", &self.bias))
    }
}

#[cfg(test)]
#[path = "convolution_test.rs"]
mod tests;
