//! Domain models and types.
//!
//! # Overview
//!
//! The domain layer provides:
//! - **Strongly-typed identifiers** ([`ResourceType`], [`FhirId`], [`ResourceKey`])
//! - **Mapped resources** ([`MappedResource`], [`MapOutcome`])
//! - **Change records** ([`ChangeRecord`], [`Window`])
//! - **Error types** ([`SyncError`], [`ResolverError`], [`FhirServerError`])
//! - **Result type alias** ([`Result`])
//!
//! ```rust
//! use fhir_inc_sync::domain::{FhirId, ResourceKey, ResourceType};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let key = ResourceKey::new(ResourceType::Patient, FhirId::new("dic-pid-110")?);
//! assert_eq!(key.reference(), "Patient/dic-pid-110");
//! # Ok(())
//! # }
//! ```

pub mod change;
pub mod errors;
pub mod ids;
pub mod resource;
pub mod result;

pub use change::{Change, ChangeRecord, EntityKind, Operation, Window};
pub use errors::{FhirServerError, ResolverError, SyncError};
pub use ids::{FhirId, ResourceKey, ResourceType};
pub use resource::{MapOutcome, MappedResource, ResourceReference};
pub use result::Result;
