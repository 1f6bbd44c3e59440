//! Change extraction from the clinical warehouse
//!
//! A [`ChangeSource`] pages through the changes of one entity within a
//! [`crate::domain::Window`], already classified as upserts or
//! cancellations.

pub mod memory;
pub mod rows;
pub mod traits;
pub mod warehouse;

pub use memory::MemorySource;
pub use traits::{ChangeSource, Page};
pub use warehouse::WarehouseSource;
