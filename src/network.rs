//! Representation and analysis of combinational circuits

mod activation;
mod analysis;
mod circuit;
mod gates;
pub mod generators;
pub mod stats;
mod testability;
mod value;

#[cfg(test)]
pub(crate) use activation::Splice;
pub(crate) use analysis::{intersect, SINK};
pub use circuit::{Circuit, CircuitBuilder, Fanout, Gate, GateState, Testability};
pub use gates::GateKind;
pub use testability::INFINITE_COST;
pub use value::{PackedVal, Val3, NB_LANES};
