// In-place and element-wise operations. Methods ending in `_` mutate `self`.

use super::Tensor;
use crate::error::NeuraRustError;
use crate::numeric::NeuraNumeric;

impl<T: NeuraNumeric> Tensor<T> {
    fn check_same_shape(&self, other: &Tensor<T>, operation: &str) -> Result<(), NeuraRustError> {
        if self.shape != other.shape {
            return Err(NeuraRustError::shape_mismatch(&self.shape, &other.shape, operation));
        }
        Ok(())
    }

    /// Deep-copies `src` into `self`, adopting its shape.
    pub fn copy_from_(&mut self, src: &Tensor<T>) {
        self.shape.clone_from(&src.shape);
        self.data.clone_from(&src.data);
    }

    /// Sets every element to `value`.
    pub fn fill_(&mut self, value: T) {
        self.data.iter_mut().for_each(|x| *x = value);
    }

    /// Multiplies every element by `factor`.
    pub fn scale_(&mut self, factor: T) {
        self.data.iter_mut().for_each(|x| *x *= factor);
    }

    /// Adds `value` to every element.
    pub fn add_scalar_(&mut self, value: T) {
        self.data.iter_mut().for_each(|x| *x += value);
    }

    /// `self += other`.
    pub fn add_(&mut self, other: &Tensor<T>) -> Result<(), NeuraRustError> {
        self.check_same_shape(other, "add_")?;
        self.data.iter_mut().zip(other.data.iter()).for_each(|(a, b)| *a += *b);
        Ok(())
    }

    /// `self += alpha * other` (axpy).
    pub fn add_scaled_(&mut self, other: &Tensor<T>, alpha: T) -> Result<(), NeuraRustError> {
        self.check_same_shape(other, "add_scaled_")?;
        self.data
            .iter_mut()
            .zip(other.data.iter())
            .for_each(|(a, b)| *a += alpha * *b);
        Ok(())
    }

    /// `self -= other`.
    pub fn sub_(&mut self, other: &Tensor<T>) -> Result<(), NeuraRustError> {
        self.check_same_shape(other, "sub_")?;
        self.data.iter_mut().zip(other.data.iter()).for_each(|(a, b)| *a -= *b);
        Ok(())
    }

    /// Pointwise product, `self *= other`.
    pub fn mul_(&mut self, other: &Tensor<T>) -> Result<(), NeuraRustError> {
        self.check_same_shape(other, "mul_")?;
        self.data.iter_mut().zip(other.data.iter()).for_each(|(a, b)| *a *= *b);
        Ok(())
    }

    /// Squares every element.
    pub fn square_(&mut self) {
        self.data.iter_mut().for_each(|x| *x = *x * *x);
    }

    /// Replaces every element by its square root.
    pub fn sqrt_(&mut self) {
        self.data.iter_mut().for_each(|x| *x = x.sqrt());
    }

    /// Clamps every element into `[min, max]`.
    pub fn clip_(&mut self, min: T, max: T) {
        self.data.iter_mut().for_each(|x| {
            if *x < min {
                *x = min;
            } else if *x > max {
                *x = max;
            }
        });
    }

    /// Applies `f` to every element in place.
    pub fn map_<F: Fn(T) -> T>(&mut self, f: F) {
        self.data.iter_mut().for_each(|x| *x = f(*x));
    }

    /// Returns a new tensor with `f` applied to every element.
    pub fn map<F: Fn(T) -> T>(&self, f: F) -> Tensor<T> {
        Tensor {
            data: self.data.iter().map(|&x| f(x)).collect(),
            shape: self.shape.clone(),
        }
    }

    /// Combines two same-shaped tensors element by element.
    pub fn zip_map<F: Fn(T, T) -> T>(&self, other: &Tensor<T>, f: F) -> Result<Tensor<T>, NeuraRustError> {
        self.check_same_shape(other, "zip_map")?;
        Ok(Tensor {
            data: self
                .data
                .iter()
                .zip(other.data.iter())
                .map(|(&a, &b)| f(a, b))
                .collect(),
            shape: self.shape.clone(),
        })
    }

    /// Returns `self - other`.
    pub fn sub(&self, other: &Tensor<T>) -> Result<Tensor<T>, NeuraRustError> {
        self.zip_map(other, |a, b| a - b)
    }

    /// Returns `self + other`.
    pub fn add(&self, other: &Tensor<T>) -> Result<Tensor<T>, NeuraRustError> {
        self.zip_map(other, |a, b| a + b)
    }

    /// Returns the pointwise product.
    pub fn mul(&self, other: &Tensor<T>) -> Result<Tensor<T>, NeuraRustError> {
        self.zip_map(other, |a, b| a * b)
    }
}

#[cfg(test)]
#[path = "elementwise_test.rs"]
mod tests;
