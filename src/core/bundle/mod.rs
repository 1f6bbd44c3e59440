//! Transaction bundles

pub mod accumulator;

pub use accumulator::Bundle;
