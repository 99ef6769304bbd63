//! Optimizers: bind a model and a critic, and update the model's flattened
//! parameters from one forward/backward pass per `step`.

pub mod adam;
pub mod nadam;
pub mod optimizer_trait;
pub mod rmsprop;
pub mod sgd;

pub use adam::{Adam, AdamHyperParams};
pub use nadam::Nadam;
pub use optimizer_trait::Optimizer;
pub use rmsprop::{RmsProp, RmsPropHyperParams};
pub use sgd::{Sgd, SgdHyperParams};
