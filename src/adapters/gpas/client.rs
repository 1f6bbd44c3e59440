//! gPAS SOAP client
//!
//! Calls `getOrCreatePseudonymFor` on the gPAS PSN manager and keeps every
//! answer for the rest of the run.

use super::traits::IdentifierResolver;
use crate::adapters::http::{build_client, retry_with_backoff};
use crate::config::PseudonymizationConfig;
use crate::domain::{ResolverError, Result, SyncError};
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;

const SOAP_CONTENT_TYPE: &str = "application/xml;charset=utf-8";

/// Pseudonym resolver backed by gPAS
///
/// # Example
///
/// ```no_run
/// use fhir_inc_sync::adapters::gpas::{GpasResolver, IdentifierResolver};
/// use fhir_inc_sync::config::{PseudonymizationConfig, RetryConfig};
///
/// # async fn example() -> fhir_inc_sync::domain::Result<()> {
/// let config = PseudonymizationConfig {
///     url: "http://gpas:8080/gpas/gpasService".to_string(),
///     patient_domain: "patient_id".to_string(),
///     encounter_domain: "encounter_id".to_string(),
///     timeout_seconds: 30,
///     retry: RetryConfig::default(),
/// };
/// let resolver = GpasResolver::new(config)?;
/// let psn = resolver.resolve_patient("110").await?;
/// # Ok(())
/// # }
/// ```
pub struct GpasResolver {
    client: Client,
    config: PseudonymizationConfig,
    psn_pattern: Regex,
    /// One cell per (domain, value); concurrent lookups of the same value
    /// wait on the same request
    cache: Mutex<HashMap<(String, String), Arc<OnceCell<String>>>>,
}

impl GpasResolver {
    pub fn new(config: PseudonymizationConfig) -> Result<Self> {
        let client = build_client(config.timeout_seconds)?;
        let psn_pattern = Regex::new(r"<psn>(.*?)</psn>")
            .map_err(|e| SyncError::Configuration(format!("Invalid pseudonym pattern: {e}")))?;

        Ok(Self {
            client,
            config,
            psn_pattern,
            cache: Mutex::new(HashMap::new()),
        })
    }

    /// Number of distinct values resolved so far
    pub fn cached_count(&self) -> usize {
        self.cache
            .lock()
            .map(|c| c.values().filter(|cell| cell.initialized()).count())
            .unwrap_or(0)
    }

    async fn resolve(&self, domain: &str, value: &str) -> Result<String> {
        let cell = self.cell(domain, value)?;
        let psn = cell
            .get_or_try_init(|| async {
                let psn = retry_with_backoff(&self.config.retry, ResolverError::is_retryable, || {
                    self.request_pseudonym(domain, value)
                })
                .await?;
                tracing::trace!(domain = %domain, "Pseudonym resolved");
                Ok::<_, SyncError>(psn)
            })
            .await?;
        Ok(psn.clone())
    }

    fn cell(&self, domain: &str, value: &str) -> Result<Arc<OnceCell<String>>> {
        let mut cache = self
            .cache
            .lock()
            .map_err(|_| SyncError::Other("Pseudonym cache poisoned".to_string()))?;
        Ok(cache
            .entry((domain.to_string(), value.to_string()))
            .or_default()
            .clone())
    }

    async fn request_pseudonym(
        &self,
        domain: &str,
        value: &str,
    ) -> std::result::Result<String, ResolverError> {
        let response = self
            .client
            .post(&self.config.url)
            .header("Content-Type", SOAP_CONTENT_TYPE)
            .body(soap_envelope(domain, value))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ResolverError::Timeout(e.to_string())
                } else {
                    ResolverError::ConnectionFailed(e.to_string())
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ResolverError::InvalidResponse(e.to_string()))?;

        if status.is_server_error() {
            return Err(ResolverError::ServerError {
                status: status.as_u16(),
                message: body,
            });
        }
        if !status.is_success() {
            return Err(ResolverError::ClientError {
                status: status.as_u16(),
                message: body,
            });
        }

        self.psn_pattern
            .captures(&body)
            .and_then(|cap| cap.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|psn| !psn.is_empty())
            .ok_or_else(|| ResolverError::MissingPseudonym(domain.to_string()))
    }
}

#[async_trait]
impl IdentifierResolver for GpasResolver {
    async fn resolve_patient(&self, raw: &str) -> Result<String> {
        self.resolve(&self.config.patient_domain, raw).await
    }

    async fn resolve_encounter(&self, raw: &str) -> Result<String> {
        self.resolve(&self.config.encounter_domain, raw).await
    }
}

fn soap_envelope(domain: &str, value: &str) -> String {
    format!(
        r#"<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/" xmlns:psn="http://psn.ttp.ganimed.icmvc.emau.org/">
  <soapenv:Header/>
  <soapenv:Body>
    <psn:getOrCreatePseudonymFor>
      <value>{}</value>
      <domainName>{}</domainName>
    </psn:getOrCreatePseudonymFor>
  </soapenv:Body>
</soapenv:Envelope>"#,
        xml_escape(value),
        xml_escape(domain)
    )
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
