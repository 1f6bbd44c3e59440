//! Pseudonymization of patient and encounter ids

pub mod client;
pub mod traits;

pub use client::GpasResolver;
pub use traits::{IdentifierResolver, PrefixResolver};
