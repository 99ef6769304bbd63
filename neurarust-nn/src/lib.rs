//! Neural-network building blocks on top of `neurarust-tensor`.
//!
//! Every layer implements [`module::Module`]: an explicit forward/backward
//! protocol over owned output and gradient buffers, with parameters,
//! parameter gradients and persistent state exposed as tensor lists that can
//! be flattened for optimizers. Containers compose modules, recurrent
//! modules carry hidden state across calls, critics score predictions, and
//! optimizers tie a model and a critic together into a training step.

pub mod containers;
pub mod grad_check;
pub mod init;
pub mod layers;
pub mod losses;
pub mod module;
pub mod optim;
pub mod recurrent;
pub mod serialize;

pub use module::{Container, Module};
pub use neurarust_tensor::{NeuraNumeric, NeuraRustError, Tensor};
