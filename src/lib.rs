// FHIR Inc Sync - Incremental FHIR reconciliation engine
// Copyright (c) 2025 FHIR Inc Sync Contributors
// Licensed under the MIT License

//! # FHIR Inc Sync - Incremental FHIR reconciliation
//!
//! FHIR Inc Sync reads the changes a hospital data warehouse recorded in a
//! time window, maps them to FHIR R4 resources and reconciles them into a
//! resource store: a PostgreSQL `resources_inc` table or a HAPI FHIR server.
//!
//! ## Overview
//!
//! Every run works on one half-open window `[start, end)` and executes a
//! fixed sequence of passes (patients, encounters, transfers, conditions,
//! procedures, then optionally lab and lung function). Each pass:
//! - **Extracts** changed and cancelled rows page by page
//! - **Pseudonymizes** patient and encounter numbers through gPAS
//! - **Maps** rows to resources, counting rows that cannot be mapped
//! - **Delivers** all resources and cancellations of the pass in one bundle
//! - **Reads back** how many resources were upserted and removed
//!
//! A cancellation marks the resource deleted and cascades to everything
//! that references it.
//!
//! ## Architecture
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`core`] - Bundle accumulation, cascade planning, mapping and passes
//! - [`adapters`] - Warehouse source, sinks, gPAS and LOINC clients
//! - [`domain`] - Windows, change records, identifiers and errors
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fhir_inc_sync::config::load_config;
//! use fhir_inc_sync::core::sync::SyncCoordinator;
//! use fhir_inc_sync::domain::Window;
//! use tokio::sync::watch;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config("fhir-inc-sync.toml")?;
//!     let window = Window::parse_dates("2020-12-12", "2020-12-14")?;
//!     let (_tx, rx) = watch::channel(false);
//!
//!     let coordinator = SyncCoordinator::new(config, window, rx).await?;
//!     let summary = coordinator.execute_sync().await?;
//!
//!     println!("{} valid resources", summary.total_valid());
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! All fallible operations return [`domain::Result`], whose error type is
//! [`domain::SyncError`]. A row that cannot be mapped is counted as invalid
//! and does not stop the pass; any other error aborts the run.

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod logging;
