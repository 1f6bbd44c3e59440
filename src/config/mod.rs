//! Configuration management
//!
//! TOML configuration with `${VAR_NAME}` substitution, `FHIR_SYNC_*`
//! environment overrides, per-key defaults and validation on load.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use fhir_inc_sync::config::load_config;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("fhir-inc-sync.toml")?;
//! println!("Destination: {}", config.destination.kind);
//! println!("Page size: {}", config.application.chunk_size);
//! # Ok(())
//! # }
//! ```
//!
//! # Example Configuration
//!
//! ```toml
//! [application]
//! log_level = "info"
//! chunk_size = 100
//!
//! [source]
//! connection_string = "${FHIR_SYNC_DWH_DSN}"
//!
//! [destination]
//! kind = "psql"
//!
//! [destination.postgresql]
//! connection_string = "${FHIR_SYNC_STORE_DSN}"
//! table = "resources_inc"
//!
//! [destination.hapi]
//! base_url = "http://hapi:8080/fhir"
//!
//! [pseudonymization]
//! url = "http://gpas:8080/gpas/gpasService"
//! ```

pub mod loader;
pub mod schema;
pub mod secret;

pub use loader::load_config;
pub use schema::{
    ApplicationConfig, DestinationConfig, DestinationKind, HapiConfig, LoggingConfig,
    LookupsConfig, PostgreSQLConfig, PseudonymizationConfig, ResourceStoreConfig, RetryConfig,
    SyncConfig, SystemsConfig, TerminologyConfig,
};
pub use secret::{secret_string, secret_string_opt, SecretString, SecretValue};
