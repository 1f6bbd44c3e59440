//! Result type alias
//!
//! All fallible operations in the crate use [`SyncError`] as their error type.

use super::errors::SyncError;

/// Result type alias for sync operations
///
/// # Examples
///
/// ```
/// use fhir_inc_sync::domain::result::Result;
/// use fhir_inc_sync::domain::errors::SyncError;
///
/// fn example_function() -> Result<String> {
///     Ok("success".to_string())
/// }
///
/// fn failing_function() -> Result<()> {
///     Err(SyncError::Validation("Invalid input".to_string()))
/// }
/// ```
pub type Result<T> = std::result::Result<T, SyncError>;
