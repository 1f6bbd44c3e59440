//! Verify command implementation
//!
//! Reports how many distinct patients and encounters the live resources of
//! each category reference in the destination.

use crate::adapters::sink::create_sink;
use crate::config::load_config;
use clap::Args;

/// Arguments for the verify command
#[derive(Args, Debug)]
pub struct VerifyArgs {}

impl VerifyArgs {
    /// Execute the verify command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!("Checking referential integrity");

        println!("🔎 Referential Integrity");
        println!();

        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                println!("❌ Failed to load configuration file");
                println!("   Error: {e}");
                return Ok(1);
            }
        };

        let sink = match create_sink(&config.destination).await {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "Failed to create sink");
                println!("❌ Failed to connect to the destination");
                println!("   Error: {e}");
                return Ok(1);
            }
        };

        let counts = match sink.integrity_counts().await {
            Ok(Some(counts)) => counts,
            Ok(None) => {
                println!(
                    "⚠️  Integrity counts are not available for destination {}",
                    sink.name()
                );
                return Ok(1);
            }
            Err(e) => {
                tracing::error!(error = %e, "Integrity query failed");
                println!("❌ Integrity query failed");
                println!("   Error: {e}");
                return Ok(1);
            }
        };

        println!("  {:<24} {:>10} {:>12}", "Category", "Patients", "Encounters");
        println!("  {}", "-".repeat(48));
        for count in &counts {
            let encounters = count
                .encounters
                .map_or_else(|| "-".to_string(), |n| n.to_string());
            println!(
                "  {:<24} {:>10} {:>12}",
                count.category.to_string(),
                count.patients,
                encounters
            );
        }
        println!();
        Ok(0)
    }
}
