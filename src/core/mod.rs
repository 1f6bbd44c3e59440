//! Core reconciliation logic.
//!
//! # Modules
//!
//! - [`mapping`] - Source rows to FHIR resources
//! - [`bundle`] - Per-pass accumulation of resources and cancellation requests
//! - [`cascade`] - Dependency table and cascade planning for cancellations
//! - [`sync`] - Passes, statistics and run coordination
//!
//! # Sync Workflow
//!
//! Every pass of a run:
//!
//! 1. **Extract**: Page through the window's upserts and cancellations
//! 2. **Resolve**: Look up patient and encounter pseudonyms
//! 3. **Map**: Build FHIR resources; invalid ones are counted and dropped
//! 4. **Accumulate**: Collect resources and cancellation requests in a bundle
//! 5. **Deliver**: Write the bundle and its cascades in one transaction
//! 6. **Read back**: Count what the sink upserted and removed
//!
//! # Example
//!
//! ```rust,no_run
//! use fhir_inc_sync::config::load_config;
//! use fhir_inc_sync::core::sync::SyncCoordinator;
//! use fhir_inc_sync::domain::Window;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("fhir-inc-sync.toml")?;
//! let window = Window::parse_dates("2020-12-12", "2020-12-14")?;
//!
//! let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//! let coordinator = SyncCoordinator::new(config, window, shutdown_rx).await?;
//!
//! let summary = coordinator.execute_sync().await?;
//! println!("Valid: {}", summary.total_valid());
//! println!("Invalid: {}", summary.total_invalid());
//! # Ok(())
//! # }
//! ```

pub mod bundle;
pub mod cascade;
pub mod mapping;
pub mod sync;
