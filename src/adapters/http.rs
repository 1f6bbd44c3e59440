//! Shared HTTP plumbing for the gPAS, LOINC and HAPI clients

use crate::config::RetryConfig;
use crate::domain::{Result, SyncError};
use base64::{engine::general_purpose, Engine as _};
use reqwest::{Client, ClientBuilder};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Builds a reqwest client with request and connect timeouts
pub fn build_client(timeout_seconds: u64) -> Result<Client> {
    ClientBuilder::new()
        .timeout(Duration::from_secs(timeout_seconds))
        .connect_timeout(Duration::from_secs(timeout_seconds.min(30)))
        .build()
        .map_err(|e| SyncError::Configuration(format!("Failed to build HTTP client: {e}")))
}

/// `Authorization` header value for HTTP basic auth
pub fn basic_auth_header(username: &str, password: &str) -> String {
    let credentials = format!("{username}:{password}");
    format!(
        "Basic {}",
        general_purpose::STANDARD.encode(credentials.as_bytes())
    )
}

/// Delay before retry number `attempt` (1-based)
pub fn backoff_delay(retry: &RetryConfig, attempt: usize) -> Duration {
    let exponent = attempt.saturating_sub(1) as i32;
    let delay_ms = retry.initial_delay_ms as f64 * retry.backoff_multiplier.powi(exponent);
    Duration::from_millis((delay_ms as u64).min(retry.max_delay_ms))
}

/// Runs `operation` until it succeeds, fails with a non-retryable error or
/// `retry.max_retries` retries have been spent
pub async fn retry_with_backoff<T, E, F, Fut>(
    retry: &RetryConfig,
    is_retryable: impl Fn(&E) -> bool,
    mut operation: F,
) -> std::result::Result<T, E>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                attempt += 1;
                if attempt > retry.max_retries || !is_retryable(&e) {
                    return Err(e);
                }

                let delay = backoff_delay(retry, attempt);
                crate::log_retry_attempt!(attempt, retry.max_retries, e);
                tracing::debug!(delay_ms = delay.as_millis() as u64, "Backing off");

                tokio::time::sleep(delay).await;
            }
        }
    }
}
