//! Modules that carry hidden state across time steps, and the driver that
//! unrolls them over a sequence.

mod lstm;
#[allow(clippy::module_inception)]
mod recurrent;
mod sequencer;

pub use lstm::Lstm;
pub use recurrent::Recurrent;
pub use sequencer::Sequencer;
