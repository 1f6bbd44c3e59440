//! Domain error types
//!
//! This module defines the error hierarchy for the sync engine. Errors from
//! third-party crates are converted to strings at the adapter boundary so no
//! driver or HTTP client type leaks into the core.

use thiserror::Error;

/// Main error type
///
/// Every fallible operation in the crate returns this type through
/// [`crate::domain::Result`].
#[derive(Debug, Error)]
pub enum SyncError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Identifier resolution (gPAS) errors
    #[error("Identifier resolution error: {0}")]
    Resolver(#[from] ResolverError),

    /// Remote FHIR server errors
    #[error("FHIR server error: {0}")]
    FhirServer(#[from] FhirServerError),

    /// Source warehouse or resource store errors
    #[error("Database error: {0}")]
    Database(String),

    /// A bundle could not be delivered to its sink
    #[error("Delivery error: {0}")]
    Delivery(String),

    /// A source row could not be mapped to a FHIR resource
    #[error("Mapping error: {0}")]
    Mapping(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Network/connection errors
    #[error("Connection error: {0}")]
    Connection(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Generic errors with context
    #[error("{0}")]
    Other(String),
}

impl SyncError {
    /// Returns true for failures that only affect a single source row
    pub fn is_row_level(&self) -> bool {
        matches!(self, SyncError::Mapping(_))
    }
}

/// gPAS pseudonymization errors
#[derive(Debug, Error)]
pub enum ResolverError {
    /// Failed to connect to the pseudonymization service
    #[error("Failed to connect to pseudonymization service: {0}")]
    ConnectionFailed(String),

    /// The response body could not be read
    #[error("Invalid response from pseudonymization service: {0}")]
    InvalidResponse(String),

    /// The response did not contain a `<psn>` element
    #[error("No pseudonym returned for value in domain '{0}'")]
    MissingPseudonym(String),

    /// Server error (5xx)
    #[error("Server error: {status} - {message}")]
    ServerError { status: u16, message: String },

    /// Client error (4xx)
    #[error("Client error: {status} - {message}")]
    ClientError { status: u16, message: String },

    /// Timeout
    #[error("Request timeout: {0}")]
    Timeout(String),
}

impl ResolverError {
    /// Whether a retry has any chance of succeeding
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ResolverError::ConnectionFailed(_)
                | ResolverError::ServerError { .. }
                | ResolverError::Timeout(_)
        )
    }
}

/// Remote FHIR server (HAPI) errors
#[derive(Debug, Error)]
pub enum FhirServerError {
    /// Failed to connect to the FHIR server
    #[error("Failed to connect to FHIR server: {0}")]
    ConnectionFailed(String),

    /// Server error (5xx)
    #[error("Server error: {status} - {message}")]
    ServerError { status: u16, message: String },

    /// Client error (4xx), usually a rejected transaction bundle
    #[error("Client error: {status} - {message}")]
    ClientError { status: u16, message: String },

    /// Timeout
    #[error("Request timeout: {0}")]
    Timeout(String),
}

// Conversion from std::io::Error
impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::Io(err.to_string())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Serialization(err.to_string())
    }
}

// Conversion from toml parse errors
impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::Configuration(format!("TOML parse error: {err}"))
    }
}
