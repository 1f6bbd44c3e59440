//! Sync coordinator - main orchestrator for a reconciliation run
//!
//! This module wires the change source, the pseudonymization service, the
//! optional unit converter and the sink together and runs the enabled
//! passes one after another over a single window.

use super::pass::{run_pass, PassContext, PassKind};
use super::summary::{RunSummary, SyncErrorType, SyncRunError};
use crate::adapters::gpas::GpasResolver;
use crate::adapters::loinc::{LoincClient, UnitConverter};
use crate::adapters::postgresql::PostgreSQLClient;
use crate::adapters::sink::create_sink;
use crate::adapters::source::WarehouseSource;
use crate::config::{ApplicationConfig, SyncConfig};
use crate::core::mapping::LookupTables;
use crate::domain::{Result, SyncError, Window};
use crate::log_error_with_context;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::Instrument;
use uuid::Uuid;

/// Passes enabled by the application settings, in execution order
pub fn enabled_passes(application: &ApplicationConfig) -> Vec<PassKind> {
    PassKind::ALL
        .into_iter()
        .filter(|pass| match pass {
            PassKind::Lab => application.include_lab,
            PassKind::LungFunction => application.include_lung_function,
            _ => true,
        })
        .collect()
}

/// Sync coordinator
pub struct SyncCoordinator {
    context: PassContext,
    passes: Vec<PassKind>,
    shutdown_signal: Option<watch::Receiver<bool>>,
}

impl SyncCoordinator {
    /// Create a coordinator for `window` from the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the lookup file
    /// cannot be read or a client cannot be built.
    pub async fn new(
        config: SyncConfig,
        window: Window,
        shutdown_signal: watch::Receiver<bool>,
    ) -> Result<Self> {
        config.validate().map_err(SyncError::Configuration)?;

        let lookups = match &config.lookups.path {
            Some(path) => {
                tracing::info!(path = %path, "Loading lookup tables");
                LookupTables::from_file(path)?
            }
            None => LookupTables::default(),
        };

        let warehouse = Arc::new(PostgreSQLClient::new(config.source.clone()).await?);
        let source = Arc::new(WarehouseSource::new(warehouse));
        let resolver = Arc::new(GpasResolver::new(config.pseudonymization.clone())?);
        let converter = LoincClient::from_config(&config.terminology)?
            .map(|client| Arc::new(client) as Arc<dyn UnitConverter>);
        let sink = create_sink(&config.destination).await?;

        let application = &config.application;
        let context = PassContext {
            source,
            resolver,
            converter,
            sink,
            systems: Arc::new(config.systems.clone()),
            lookups: Arc::new(lookups),
            window,
            chunk_size: application.chunk_size,
            lab_chunk_size: application.lab_chunk_size,
            resolver_concurrency: application.resolver_concurrency,
            dry_run: application.dry_run,
        };

        Ok(Self {
            context,
            passes: enabled_passes(application),
            shutdown_signal: Some(shutdown_signal),
        })
    }

    /// Create a coordinator from already built parts
    pub fn with_parts(context: PassContext, passes: Vec<PassKind>) -> Self {
        Self {
            context,
            passes,
            shutdown_signal: None,
        }
    }

    /// Stop between passes once the signal flips
    pub fn with_shutdown_signal(mut self, shutdown_signal: watch::Receiver<bool>) -> Self {
        self.shutdown_signal = Some(shutdown_signal);
        self
    }

    pub fn passes(&self) -> &[PassKind] {
        &self.passes
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown_signal
            .as_ref()
            .is_some_and(|signal| *signal.borrow())
    }

    async fn check_connections(&self) -> Result<()> {
        self.context.source.test_connection().await?;
        self.context.sink.test_connection().await?;
        tracing::info!(
            source = self.context.source.name(),
            sink = self.context.sink.name(),
            "Connections verified"
        );
        Ok(())
    }

    /// Execute the sync
    ///
    /// This is the main entry point of a run. It:
    /// 1. Verifies the source and sink connections
    /// 2. Runs every enabled pass in order, each delivering one bundle
    /// 3. Stops at the first failing pass; delivered passes stay delivered
    /// 4. Generates the run summary
    pub async fn execute_sync(&self) -> Result<RunSummary> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "sync",
            run_id = %run_id,
            window = %self.context.window
        );
        self.run(run_id).instrument(span).await
    }

    async fn run(&self, run_id: Uuid) -> Result<RunSummary> {
        let start_time = Instant::now();
        let mut summary = RunSummary::new(run_id);
        summary.window = Some(self.context.window);
        summary.dry_run = self.context.dry_run;

        tracing::info!(
            passes = ?self.passes,
            dry_run = self.context.dry_run,
            "Starting sync process"
        );

        if let Err(e) = self.check_connections().await {
            log_error_with_context!(&e, "Connection check failed");
            summary.add_error(SyncRunError::new(SyncErrorType::Connection, e.to_string()));
            summary.skipped = self.passes.clone();
            return Ok(summary.with_duration(start_time.elapsed()));
        }

        for (index, pass) in self.passes.iter().enumerate() {
            if self.shutdown_requested() {
                tracing::warn!(pass = %pass, "Shutdown requested, not starting further passes");
                summary.add_error(SyncRunError::new(
                    SyncErrorType::Interrupted,
                    "Run interrupted by shutdown signal".to_string(),
                ));
                summary.skipped = self.passes[index..].to_vec();
                break;
            }

            match run_pass(&self.context, *pass).await {
                Ok(stats) => summary.add_pass(stats),
                Err(e) => {
                    log_error_with_context!(&e, format!("Pass {pass} failed"));
                    summary.add_error(SyncRunError::from(&e).with_context(format!("pass={pass}")));
                    summary.skipped = self.passes[index + 1..].to_vec();
                    break;
                }
            }
        }

        let summary = summary.with_duration(start_time.elapsed());
        summary.log_summary();
        Ok(summary)
    }
}
