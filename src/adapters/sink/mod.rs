//! Destinations for mapped resources
//!
//! [`ResourceSink`] is implemented by the PostgreSQL `resources_inc` store,
//! the HAPI FHIR server and an in-memory store. [`create_sink`] picks one
//! from `destination.kind`.

pub mod factory;
pub mod memory;
pub mod traits;

pub use factory::create_sink;
pub use memory::{MemoryStore, StoredResource};
pub use traits::{DeliveryStats, IntegrityCount, ResourceSink, INTEGRITY_CATEGORIES};
