use num_traits::{Float, FromPrimitive, NumAssignOps, NumOps, ToPrimitive};
use std::fmt::{Debug, Display};
use std::iter::Sum;

/// A trait representing the scalar types a `Tensor` can hold.
///
/// Only floating-point types qualify: every kernel in the workspace is
/// written against this bound, so `f32` tensors are computed in `f32` and
/// `f64` tensors in `f64` with no implicit narrowing in between.
pub trait NeuraNumeric:
    Float
    + NumAssignOps
    + NumOps
    + FromPrimitive
    + ToPrimitive
    + Sum
    + PartialOrd
    + Debug
    + Display
    + Default
    + Copy
    + Send
    + Sync
    + 'static
{
    /// Converts an `f64` literal into this scalar type.
    ///
    /// Used for constants (`0.5`, `1e-12`, hyper-parameters); every value the
    /// library feeds through here is representable in `f32`.
    fn from_f64_lossy(value: f64) -> Self {
        <Self as FromPrimitive>::from_f64(value).unwrap_or_else(Self::nan)
    }

    /// Widens this scalar to `f64` (exact for both `f32` and `f64`).
    fn to_f64_lossless(self) -> f64 {
        <Self as ToPrimitive>::to_f64(&self).unwrap_or(f64::NAN)
    }
}

impl NeuraNumeric for f32 {}
impl NeuraNumeric for f64 {}
