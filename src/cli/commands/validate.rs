//! Validate config command implementation
//!
//! This module implements the `validate-config` command for validating
//! the configuration file.

use crate::config::{load_config, DestinationKind};
use crate::core::sync::enabled_passes;
use clap::Args;
use secrecy::ExposeSecret;

/// Arguments for the validate-config command
#[derive(Args, Debug)]
pub struct ValidateArgs {}

impl ValidateArgs {
    /// Execute the validate-config command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(config_path = %config_path, "Validating configuration");

        println!("🔍 Validating configuration file: {config_path}");
        println!();

        // load_config validates as part of loading
        let config = match load_config(config_path) {
            Ok(c) => {
                println!("✅ Configuration is valid");
                c
            }
            Err(e) => {
                println!("❌ Configuration validation failed");
                println!("   Error: {e}");
                return Ok(1);
            }
        };

        let passes: Vec<String> = enabled_passes(&config.application)
            .iter()
            .map(ToString::to_string)
            .collect();

        println!();
        println!("Configuration Summary:");
        println!("  Log Level: {}", config.application.log_level);
        println!(
            "  Source: {}",
            config.source.connection_string.expose_secret().after_credentials()
        );
        println!("  Destination: {}", config.destination.kind);
        match config.destination.kind {
            DestinationKind::Psql => {
                if let Some(ref store) = config.destination.postgresql {
                    println!(
                        "  Resource Store: {}",
                        store.connection.connection_string.expose_secret().after_credentials()
                    );
                    println!("  Table: {}", store.table);
                }
            }
            DestinationKind::Hapi => {
                if let Some(ref hapi) = config.destination.hapi {
                    println!("  HAPI FHIR Server: {}", hapi.base_url);
                }
            }
        }
        println!("  Pseudonymization: {}", config.pseudonymization.url);
        println!(
            "  LOINC Conversion: {}",
            config
                .terminology
                .loinc_url
                .as_deref()
                .unwrap_or("disabled")
        );
        println!(
            "  Lookup Tables: {}",
            config.lookups.path.as_deref().unwrap_or("built-in")
        );
        println!("  Page Size: {}", config.application.chunk_size);
        println!("  Lab Page Size: {}", config.application.lab_chunk_size);
        println!("  Passes: {}", passes.join(", "));
        println!();
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_fails() {
        let code = ValidateArgs {}
            .execute("/nonexistent/fhir-inc-sync.toml")
            .await
            .unwrap();
        assert_eq!(code, 1);
    }
}
