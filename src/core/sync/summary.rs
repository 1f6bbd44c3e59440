//! Run summary and reporting
//!
//! This module defines structures for tracking and reporting the result of
//! one sync run across all of its passes.

use super::pass::PassKind;
use super::stats::PassStats;
use crate::domain::{SyncError, Window};
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

/// Summary of a sync run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Identifier attached to every log line of the run
    pub run_id: Uuid,

    /// Window the run reconciled
    pub window: Option<Window>,

    /// Statistics of every pass that completed, in execution order
    pub passes: Vec<PassStats>,

    /// Passes that were enabled but did not run
    pub skipped: Vec<PassKind>,

    /// Whether deliveries were only logged
    pub dry_run: bool,

    /// Duration of the run
    #[serde(skip)]
    pub duration: Duration,

    /// Errors encountered during the run
    pub errors: Vec<SyncRunError>,
}

impl RunSummary {
    /// Create a new empty run summary
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            window: None,
            passes: Vec::new(),
            skipped: Vec::new(),
            dry_run: false,
            duration: Duration::from_secs(0),
            errors: Vec::new(),
        }
    }

    /// Set the duration
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn add_pass(&mut self, stats: PassStats) {
        self.passes.push(stats);
    }

    /// Add an error
    pub fn add_error(&mut self, error: SyncRunError) {
        self.errors.push(error);
    }

    pub fn pass(&self, pass: PassKind) -> Option<&PassStats> {
        self.passes.iter().find(|p| p.pass == pass)
    }

    /// Check if the run was successful (no errors, nothing skipped)
    pub fn is_successful(&self) -> bool {
        self.errors.is_empty() && self.skipped.is_empty()
    }

    pub fn total_valid(&self) -> u64 {
        self.passes.iter().map(PassStats::total_valid).sum()
    }

    pub fn total_invalid(&self) -> u64 {
        self.passes.iter().map(PassStats::total_invalid).sum()
    }

    pub fn total_cancellation_requests(&self) -> u64 {
        self.passes
            .iter()
            .map(PassStats::total_cancellation_requests)
            .sum()
    }

    /// Share of mapped resources that were valid, as a percentage
    pub fn valid_rate(&self) -> f64 {
        let attempted = self.total_valid() + self.total_invalid();
        if attempted == 0 {
            return 100.0;
        }
        (self.total_valid() as f64 / attempted as f64) * 100.0
    }

    /// Log the summary
    pub fn log_summary(&self) {
        for pass in &self.passes {
            tracing::info!(
                run_id = %self.run_id,
                pass = %pass.pass,
                valid = pass.total_valid(),
                invalid = pass.total_invalid(),
                cancellation_requests = pass.total_cancellation_requests(),
                entries_delivered = pass.entries_delivered,
                rows_affected = pass.rows_affected,
                duration_ms = pass.duration.as_millis() as u64,
                "Pass summary"
            );
        }

        tracing::info!(
            run_id = %self.run_id,
            passes = self.passes.len(),
            valid = self.total_valid(),
            invalid = self.total_invalid(),
            cancellation_requests = self.total_cancellation_requests(),
            dry_run = self.dry_run,
            duration_secs = self.duration.as_secs(),
            valid_rate = format!("{:.2}%", self.valid_rate()),
            "Sync completed"
        );

        if !self.skipped.is_empty() {
            tracing::warn!(
                skipped = ?self.skipped,
                "Passes not run"
            );
        }

        if !self.errors.is_empty() {
            tracing::warn!(
                error_count = self.errors.len(),
                "Sync completed with errors"
            );
            for error in &self.errors {
                tracing::warn!(
                    error_type = ?error.error_type,
                    message = %error.message,
                    context = ?error.context,
                    "Sync error"
                );
            }
        }
    }
}

/// Type of run error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SyncErrorType {
    /// Source, sink or service unreachable
    Connection,
    /// Pseudonymization failed
    Resolution,
    /// Extraction query failed
    Extraction,
    /// Bundle could not be delivered
    Delivery,
    /// Configuration error
    Configuration,
    /// Run stopped by a shutdown signal
    Interrupted,
    /// Unknown error
    Unknown,
}

impl SyncErrorType {
    /// Classifies an error that aborted a pass
    pub fn of(error: &SyncError) -> Self {
        match error {
            SyncError::Configuration(_) | SyncError::Validation(_) => {
                SyncErrorType::Configuration
            }
            SyncError::Connection(_) => SyncErrorType::Connection,
            SyncError::Resolver(_) => SyncErrorType::Resolution,
            SyncError::Database(_) => SyncErrorType::Extraction,
            SyncError::Delivery(_) | SyncError::FhirServer(_) => SyncErrorType::Delivery,
            _ => SyncErrorType::Unknown,
        }
    }
}

/// Run error with context
#[derive(Debug, Clone, Serialize)]
pub struct SyncRunError {
    /// Type of error
    pub error_type: SyncErrorType,

    /// Error message
    pub message: String,

    /// Optional context (e.g. the pass)
    pub context: Option<String>,
}

impl SyncRunError {
    /// Create a new run error
    pub fn new(error_type: SyncErrorType, message: String) -> Self {
        Self {
            error_type,
            message,
            context: None,
        }
    }

    /// Add context to the error
    pub fn with_context(mut self, context: String) -> Self {
        self.context = Some(context);
        self
    }
}

impl From<&SyncError> for SyncRunError {
    fn from(error: &SyncError) -> Self {
        Self::new(SyncErrorType::of(error), error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::sync::stats::ReadBackCategory;
    use crate::domain::{ResolverError, ResourceType};

    #[test]
    fn test_run_summary_creation() {
        let summary = RunSummary::new(Uuid::new_v4());

        assert!(summary.passes.is_empty());
        assert!(summary.errors.is_empty());
        assert_eq!(summary.duration, Duration::from_secs(0));
        assert!(summary.is_successful());
        assert_eq!(summary.valid_rate(), 100.0);
    }

    #[test]
    fn test_run_summary_with_duration() {
        let summary = RunSummary::new(Uuid::new_v4()).with_duration(Duration::from_secs(120));

        assert_eq!(summary.duration, Duration::from_secs(120));
    }

    #[test]
    fn test_run_summary_totals() {
        let mut patients = PassStats::new(PassKind::Patients);
        patients
            .category_mut(ReadBackCategory::Resource(ResourceType::Patient))
            .record_valid(19);
        patients
            .category_mut(ReadBackCategory::Resource(ResourceType::Patient))
            .record_invalid(1);

        let mut summary = RunSummary::new(Uuid::new_v4());
        summary.add_pass(patients);

        assert_eq!(summary.total_valid(), 19);
        assert_eq!(summary.total_invalid(), 1);
        assert_eq!(summary.valid_rate(), 95.0);
        assert!(summary.pass(PassKind::Patients).is_some());
        assert!(summary.pass(PassKind::Lab).is_none());
    }

    #[test]
    fn test_errors_make_run_unsuccessful() {
        let mut summary = RunSummary::new(Uuid::new_v4());
        summary.add_error(
            SyncRunError::new(SyncErrorType::Delivery, "Transaction failed".to_string())
                .with_context("pass=encounters".to_string()),
        );

        assert!(!summary.is_successful());
        assert_eq!(
            summary.errors[0].context,
            Some("pass=encounters".to_string())
        );
    }

    #[test]
    fn test_skipped_passes_make_run_unsuccessful() {
        let mut summary = RunSummary::new(Uuid::new_v4());
        summary.skipped.push(PassKind::Lab);
        assert!(!summary.is_successful());
    }

    #[test]
    fn test_error_classification() {
        let resolver = SyncError::from(ResolverError::Timeout("30s".to_string()));
        assert_eq!(SyncErrorType::of(&resolver), SyncErrorType::Resolution);
        assert_eq!(
            SyncErrorType::of(&SyncError::Delivery("rollback".to_string())),
            SyncErrorType::Delivery
        );
        assert_eq!(
            SyncRunError::from(&SyncError::Configuration("bad".to_string())).error_type,
            SyncErrorType::Configuration
        );
    }
}
