//! LOINC/UCUM conversion service client
//!
//! The service takes `[{"loinc", "unit", "value"}]` and answers with the
//! same shape, converted to the preferred unit of the LOINC code, or with an
//! `error` member when it cannot convert.

use crate::adapters::http::build_client;
use crate::config::TerminologyConfig;
use crate::domain::{Result, SyncError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A numeric lab result as sent to and returned by the converter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabQuantity {
    pub loinc: String,
    pub unit: String,
    pub value: f64,
}

/// Converts lab quantities to canonical units
#[async_trait]
pub trait UnitConverter: Send + Sync {
    /// Returns `None` when the service has no conversion for the input
    async fn convert(&self, quantity: &LabQuantity) -> Result<Option<LabQuantity>>;
}

pub struct LoincClient {
    client: Client,
    url: String,
}

impl LoincClient {
    /// Builds a client, or `None` when no `terminology.loinc_url` is set
    pub fn from_config(config: &TerminologyConfig) -> Result<Option<Self>> {
        match config.loinc_url {
            Some(ref url) => Ok(Some(Self {
                client: build_client(config.timeout_seconds)?,
                url: url.clone(),
            })),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl UnitConverter for LoincClient {
    async fn convert(&self, quantity: &LabQuantity) -> Result<Option<LabQuantity>> {
        let response = self
            .client
            .post(&self.url)
            .json(&[quantity])
            .send()
            .await
            .map_err(|e| SyncError::Connection(format!("LOINC conversion request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Connection(format!(
                "LOINC conversion failed with status {status}: {body}"
            )));
        }

        let body: Vec<Value> = response.json().await.map_err(|e| {
            SyncError::Serialization(format!("Invalid LOINC conversion response: {e}"))
        })?;

        Ok(parse_conversion(body.first()))
    }
}

fn parse_conversion(first: Option<&Value>) -> Option<LabQuantity> {
    let first = first?;
    if first.get("error").is_some() {
        tracing::debug!(response = %first, "No LOINC conversion available");
        return None;
    }

    let loinc = first.get("loinc")?.as_str().filter(|s| !s.is_empty())?;
    let unit = first.get("unit")?.as_str().filter(|s| !s.is_empty())?;
    let value = first.get("value")?.as_f64()?;

    Some(LabQuantity {
        loinc: loinc.to_string(),
        unit: unit.to_string(),
        value,
    })
}
