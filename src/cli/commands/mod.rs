//! CLI command implementations
//!
//! This module contains all CLI command implementations.

pub mod migrate;
pub mod sync;
pub mod validate;
pub mod verify;
