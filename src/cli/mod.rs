//! CLI interface and argument parsing
//!
//! This module provides the command-line interface for FHIR Inc Sync using clap.

pub mod commands;

use clap::{Parser, Subcommand};

/// FHIR Inc Sync - Incremental FHIR reconciliation engine
#[derive(Parser, Debug)]
#[command(name = "fhir-inc-sync")]
#[command(version, about, long_about = None)]
#[command(author = "FHIR Inc Sync Contributors")]
pub struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        default_value = "fhir-inc-sync.toml",
        env = "FHIR_SYNC_CONFIG"
    )]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "FHIR_SYNC_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Reconcile the changes of one window into the destination
    Sync(commands::sync::SyncArgs),

    /// Validate configuration file
    ValidateConfig(commands::validate::ValidateArgs),

    /// Create the resources_inc table in the PostgreSQL store
    Migrate(commands::migrate::MigrateArgs),

    /// Report referential integrity of the destination
    Verify(commands::verify::VerifyArgs),
}
