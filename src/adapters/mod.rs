//! External system integrations.
//!
//! This module provides adapters for the systems around the sync engine:
//!
//! - [`source`] - Change extraction from the clinical warehouse
//! - [`gpas`] - gPAS pseudonymization of patient and encounter ids
//! - [`loinc`] - LOINC unit conversion service
//! - [`sink`] - Resource sink abstraction (trait-based)
//! - [`postgresql`] - PostgreSQL client and `resources_inc` store
//! - [`hapi`] - HAPI FHIR server destination
//!
//! # Design Pattern
//!
//! Adapters follow the **Adapter Pattern** to isolate external dependencies
//! and enable testing with in-memory implementations. Sources, resolvers,
//! converters and sinks are traits so the core never sees a driver type.
//!
//! # Sink Adapter
//!
//! ```rust,no_run
//! use fhir_inc_sync::adapters::sink::create_sink;
//! use fhir_inc_sync::config::{DestinationConfig, DestinationKind, HapiConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let destination = DestinationConfig {
//!     kind: DestinationKind::Hapi,
//!     postgresql: None,
//!     hapi: Some(HapiConfig {
//!         base_url: "http://localhost:8080/fhir".to_string(),
//!         timeout_seconds: 30,
//!         username: None,
//!         password: None,
//!     }),
//! };
//!
//! let sink = create_sink(&destination).await?;
//! sink.test_connection().await?;
//! # Ok(())
//! # }
//! ```

pub mod gpas;
pub mod hapi;
pub mod http;
pub mod loinc;
pub mod postgresql;
pub mod sink;
pub mod source;
