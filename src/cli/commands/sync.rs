//! Sync command implementation
//!
//! This module implements the `sync` command, which reconciles the changes
//! of one time window into the configured destination.

use crate::config::{load_config, DestinationKind, SyncConfig};
use crate::core::sync::{enabled_passes, RunSummary, SyncCoordinator};
use crate::domain::Window;
use clap::Args;
use std::io::{self, BufRead, IsTerminal, Write};
use std::str::FromStr;
use tokio::sync::watch;

/// Arguments for the sync command
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Window start (inclusive), YYYY-MM-DD
    #[arg(short, long, value_name = "YYYY-MM-DD")]
    pub start_date: String,

    /// Window end (exclusive), YYYY-MM-DD
    #[arg(short, long, value_name = "YYYY-MM-DD")]
    pub end_date: String,

    /// Override the destination (psql or hapi)
    #[arg(short, long, value_parser = DestinationKind::from_str)]
    pub dest: Option<DestinationKind>,

    /// Skip the lab pass
    #[arg(short, long)]
    pub no_lab: bool,

    /// Run the lung-function pass
    #[arg(long)]
    pub lufu: bool,

    /// Log bundles instead of delivering them
    #[arg(long)]
    pub dry_run: bool,

    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

impl SyncArgs {
    /// The window given on the command line
    pub fn window(&self) -> Result<Window, String> {
        Window::parse_dates(&self.start_date, &self.end_date)
    }

    /// Apply command-line overrides to the loaded configuration
    pub fn apply_overrides(&self, config: &mut SyncConfig) {
        if let Some(dest) = self.dest {
            tracing::info!(dest = %dest, "Overriding destination from CLI");
            config.destination.kind = dest;
        }
        if self.no_lab {
            tracing::info!("Disabling lab pass from CLI");
            config.application.include_lab = false;
        }
        if self.lufu {
            tracing::info!("Enabling lung-function pass from CLI");
            config.application.include_lung_function = true;
        }
        if self.dry_run {
            tracing::info!("Enabling dry-run mode from CLI");
            config.application.dry_run = true;
        }
    }

    /// Whether to ask before touching the destination
    ///
    /// Unattended runs (cron, batch) have no terminal on stdin and proceed.
    pub fn needs_confirmation(&self, dry_run: bool, interactive: bool) -> bool {
        interactive && !self.yes && !dry_run
    }

    /// Execute the sync command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        tracing::info!("Starting sync command");

        let window = match self.window() {
            Ok(w) => w,
            Err(e) => {
                eprintln!("Invalid window: {e}");
                return Ok(1);
            }
        };

        let mut config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load configuration");
                eprintln!("Failed to load configuration: {e}");
                return Ok(1);
            }
        };
        self.apply_overrides(&mut config);

        if let Err(e) = config.validate() {
            tracing::error!(error = %e, "Configuration validation failed");
            eprintln!("Configuration validation failed: {e}");
            return Ok(1);
        }

        if config.application.dry_run {
            tracing::info!("Dry run mode enabled - no data will be written");
            println!("🔍 DRY RUN MODE - No data will be written to the destination");
            println!();
        }

        // Confirmation prompt (interactive runs only, unless --yes or dry-run)
        let interactive = io::stdin().is_terminal();
        if self.needs_confirmation(config.application.dry_run, interactive) {
            let passes: Vec<String> = enabled_passes(&config.application)
                .iter()
                .map(ToString::to_string)
                .collect();
            println!("Sync Configuration:");
            println!("  Window: {window}");
            println!("  Destination: {}", config.destination.kind);
            println!("  Passes: {}", passes.join(", "));
            println!("  Page size: {}", config.application.chunk_size);
            println!();
            print!("Proceed with sync? [y/N]: ");
            io::stdout().flush()?;

            if !confirmed(&mut io::stdin().lock())? {
                println!("Sync cancelled.");
                return Ok(1);
            }
        } else if !interactive && !self.yes {
            tracing::info!("Standard input is not a terminal, skipping confirmation");
        }

        tracing::info!("Creating sync coordinator");
        let coordinator = match SyncCoordinator::new(config, window, shutdown_signal).await {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, "Failed to create sync coordinator");
                eprintln!("Failed to initialize sync: {e}");
                return Ok(1);
            }
        };

        println!("🚀 Starting sync of {window}...");
        println!();

        let summary = match coordinator.execute_sync().await {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "Sync failed");
                eprintln!("Sync failed: {e}");
                return Ok(1);
            }
        };

        print_summary(&summary);

        if summary.is_successful() {
            println!("✅ Sync completed successfully!");
            Ok(0)
        } else {
            println!("⚠️  Sync did not complete");
            Ok(1)
        }
    }
}

/// Reads one answer line; only `y` proceeds
fn confirmed<R: BufRead>(input: &mut R) -> io::Result<bool> {
    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(answer.trim().eq_ignore_ascii_case("y"))
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!("📊 Sync Summary (run {}):", summary.run_id);
    for pass in &summary.passes {
        println!(
            "  {} ({:.2}s, {} entries, {} cancellations)",
            pass.pass,
            pass.duration.as_secs_f64(),
            pass.entries_delivered,
            pass.cancellations_delivered
        );
        for (category, counts) in &pass.categories {
            let read_back = match (counts.upserted, counts.removed) {
                (Some(upserted), Some(removed)) => {
                    format!(", upserted {upserted}, removed {removed}")
                }
                _ => String::new(),
            };
            println!(
                "    {category}: valid {}, invalid {}, delete requests {}{read_back}",
                counts.valid, counts.invalid, counts.cancellation_requests
            );
        }
    }
    println!("  Duration: {:.2}s", summary.duration.as_secs_f64());
    println!();

    if !summary.skipped.is_empty() {
        let skipped: Vec<String> = summary.skipped.iter().map(ToString::to_string).collect();
        println!("⚠️  Passes not run: {}", skipped.join(", "));
    }

    if !summary.errors.is_empty() {
        println!("⚠️  Errors encountered:");
        for error in &summary.errors {
            println!("  - {:?}: {}", error.error_type, error.message);
            if let Some(context) = &error.context {
                println!("    Context: {context}");
            }
        }
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;

    fn args() -> SyncArgs {
        SyncArgs {
            start_date: "2020-12-12".to_string(),
            end_date: "2020-12-14".to_string(),
            dest: None,
            no_lab: false,
            lufu: false,
            dry_run: false,
            yes: false,
        }
    }

    #[test]
    fn test_sync_args_window() {
        let window = args().window().unwrap();
        assert_eq!(window.to_string(), "[2020-12-12 00:00:00, 2020-12-14 00:00:00)");

        let reversed = SyncArgs {
            start_date: "2020-12-14".to_string(),
            end_date: "2020-12-12".to_string(),
            ..args()
        };
        assert!(reversed.window().is_err());
    }

    #[test]
    fn test_unattended_run_skips_confirmation() {
        let cli = Cli::try_parse_from([
            "fhir-inc-sync",
            "sync",
            "-s",
            "2020-12-12",
            "-e",
            "2020-12-14",
            "-d",
            "psql",
            "--lufu",
        ])
        .unwrap();
        let Commands::Sync(args) = cli.command else {
            panic!("expected sync command");
        };

        assert!(!args.needs_confirmation(false, false));
        assert!(args.needs_confirmation(false, true));
        assert!(!args.needs_confirmation(true, true));
        let yes = SyncArgs { yes: true, ..args };
        assert!(!yes.needs_confirmation(false, true));
    }

    #[test]
    fn test_confirmation_answers() {
        assert!(confirmed(&mut "y\n".as_bytes()).unwrap());
        assert!(confirmed(&mut " Y \n".as_bytes()).unwrap());
        assert!(!confirmed(&mut "n\n".as_bytes()).unwrap());
        // closed stdin
        assert!(!confirmed(&mut "".as_bytes()).unwrap());
    }

    #[test]
    fn test_sync_args_invalid_date() {
        let bad = SyncArgs {
            start_date: "12.12.2020".to_string(),
            ..args()
        };
        assert!(bad.window().is_err());
    }
}
