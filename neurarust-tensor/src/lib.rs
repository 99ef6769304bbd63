//! Dense tensors and linear-algebra kernels for NeuraRust.
//!
//! This crate is the leaf of the workspace: the network crate consumes the
//! `Tensor` type, the `linalg` kernels and the shared error enum from here.

pub mod error;
pub mod linalg;
pub mod numeric;
pub mod tensor;

pub use error::NeuraRustError;
pub use numeric::NeuraNumeric;
pub use tensor::Tensor;
