//! Flattening of tensor lists.
//!
//! A flattened view is an explicit copy: [`flatten`] gathers the components
//! into one contiguous rank-1 tensor, and [`unflatten_into`] scatters a flat
//! tensor back into the components. Writes made to the flat tensor reach the
//! components only through `unflatten_into`; writes made to the components
//! reach the flat tensor only through a fresh `flatten`.

use super::Tensor;
use crate::error::NeuraRustError;
use crate::numeric::NeuraNumeric;

/// Total number of elements across `parts`.
pub fn total_size<T: NeuraNumeric>(parts: &[&Tensor<T>]) -> usize {
    parts.iter().map(|t| t.size()).sum()
}

/// Concatenates the storage of `parts`, in order, into one rank-1 tensor.
pub fn flatten<T: NeuraNumeric>(parts: &[&Tensor<T>]) -> Tensor<T> {
    let mut data = Vec::with_capacity(total_size(parts));
    for part in parts {
        data.extend_from_slice(part.data());
    }
    Tensor::vector(data)
}

/// Writes consecutive ranges of `flat` back into `parts`, in order.
///
/// # Errors
/// Returns `ShapeMismatch` if `flat` does not hold exactly as many elements
/// as the parts combined; no part is modified in that case.
pub fn unflatten_into<T: NeuraNumeric>(
    flat: &Tensor<T>,
    parts: &mut [&mut Tensor<T>],
) -> Result<(), NeuraRustError> {
    let expected: usize = parts.iter().map(|t| t.size()).sum();
    if flat.size() != expected {
        return Err(NeuraRustError::shape_mismatch(&[expected], flat.shape(), "unflatten_into"));
    }
    let mut offset = 0;
    for part in parts.iter_mut() {
        let len = part.size();
        part.data_mut().copy_from_slice(&flat.data()[offset..offset + len]);
        offset += len;
    }
    Ok(())
}

#[cfg(test)]
#[path = "utils_test.rs"]
mod tests;
