//! Lab unit conversion

pub mod client;

pub use client::{LabQuantity, LoincClient, UnitConverter};
