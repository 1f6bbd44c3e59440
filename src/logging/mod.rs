//! Logging and observability
//!
//! Structured logging through `tracing`, plus a handful of macros that keep
//! the field names of recurring events consistent across passes.
//!
//! # Example
//!
//! ```no_run
//! use fhir_inc_sync::logging::init_logging;
//! use fhir_inc_sync::config::LoggingConfig;
//!
//! let _guard = init_logging("info", &LoggingConfig::default())
//!     .expect("Failed to initialize logging");
//!
//! tracing::info!(pass = "patients", "Pass started");
//! ```

pub mod structured;

pub use structured::{init_logging, LoggingGuard};

/// Log the start of a reconciliation pass
///
/// # Example
///
/// ```no_run
/// use fhir_inc_sync::log_pass_start;
/// use fhir_inc_sync::domain::Window;
///
/// let window = Window::parse_dates("2020-12-12", "2020-12-14").unwrap();
/// log_pass_start!("patients", &window);
/// ```
#[macro_export]
macro_rules! log_pass_start {
    ($pass:expr, $window:expr) => {
        tracing::info!(
            pass = %$pass,
            window = %$window,
            "Starting pass"
        );
    };
}

/// Log the completion of a reconciliation pass
///
/// # Example
///
/// ```no_run
/// use fhir_inc_sync::log_pass_complete;
/// use std::time::Duration;
///
/// log_pass_complete!("patients", 20, 1, Duration::from_secs(3));
/// ```
#[macro_export]
macro_rules! log_pass_complete {
    ($pass:expr, $entries:expr, $cancellations:expr, $duration:expr) => {
        tracing::info!(
            pass = %$pass,
            entries = $entries,
            cancellations = $cancellations,
            duration_ms = $duration.as_millis() as u64,
            "Pass completed"
        );
    };
}

/// Log an error with context
///
/// # Example
///
/// ```no_run
/// use fhir_inc_sync::log_error_with_context;
/// use fhir_inc_sync::domain::SyncError;
///
/// let error = SyncError::Configuration("Invalid config".to_string());
/// log_error_with_context!(&error, "Failed to load configuration");
/// ```
#[macro_export]
macro_rules! log_error_with_context {
    ($error:expr, $context:expr) => {
        tracing::error!(
            error = %$error,
            context = $context,
            "Error occurred"
        );
    };
}

/// Log an extractor page
///
/// ```no_run
/// use fhir_inc_sync::log_page_processing;
///
/// log_page_processing!("encounters", 3, 100);
/// ```
#[macro_export]
macro_rules! log_page_processing {
    ($pass:expr, $page:expr, $rows:expr) => {
        tracing::debug!(
            pass = %$pass,
            page = $page,
            rows = $rows,
            "Processing page"
        );
    };
}

/// Log a retry attempt
///
/// ```no_run
/// use fhir_inc_sync::log_retry_attempt;
///
/// log_retry_attempt!(2, 3, "Connection timeout");
/// ```
#[macro_export]
macro_rules! log_retry_attempt {
    ($attempt:expr, $max_attempts:expr, $reason:expr) => {
        tracing::warn!(
            attempt = $attempt,
            max_attempts = $max_attempts,
            reason = %$reason,
            "Retrying operation"
        );
    };
}
