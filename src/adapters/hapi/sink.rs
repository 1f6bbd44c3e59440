//! HAPI FHIR server sink
//!
//! Entries travel as a single FHIR transaction bundle with conditional
//! creates. The server has no notion of our soft-deletes, so cancellations
//! are only logged.

use crate::adapters::http::{basic_auth_header, build_client};
use crate::adapters::sink::traits::{DeliveryStats, IntegrityCount, ResourceSink};
use crate::config::HapiConfig;
use crate::core::bundle::Bundle;
use crate::core::sync::stats::{ReadBackCategory, ReadBackCounts};
use crate::domain::{FhirServerError, MappedResource, Result, SyncError};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde_json::{json, Value};

pub const FHIR_CONTENT_TYPE: &str = "application/fhir+json;charset=utf-8";

pub struct HapiSink {
    client: Client,
    config: HapiConfig,
}

impl HapiSink {
    pub fn new(config: HapiConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout_seconds)?,
            config,
        })
    }

    fn authorization(&self) -> Option<String> {
        let username = self.config.username.as_deref().filter(|u| !u.is_empty())?;
        let password = self.config.password.as_ref()?;
        Some(basic_auth_header(
            username,
            password.expose_secret().as_ref(),
        ))
    }

    async fn post(&self, body: &Value) -> std::result::Result<(), FhirServerError> {
        let mut request = self
            .client
            .post(&self.config.base_url)
            .header("Content-Type", FHIR_CONTENT_TYPE)
            .json(body);
        if let Some(auth) = self.authorization() {
            request = request.header("Authorization", auth);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                FhirServerError::Timeout(e.to_string())
            } else {
                FhirServerError::ConnectionFailed(e.to_string())
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let message = response.text().await.unwrap_or_default();
        if status.is_server_error() {
            Err(FhirServerError::ServerError {
                status: status.as_u16(),
                message,
            })
        } else {
            Err(FhirServerError::ClientError {
                status: status.as_u16(),
                message,
            })
        }
    }
}

fn transaction_entry(resource: &MappedResource) -> Value {
    let mut request = json!({
        "method": "POST",
        "url": resource.resource_type().as_str(),
    });
    if let Some(system) = resource.identifier_system() {
        request["ifNoneExist"] = Value::from(format!("identifier={}|{}", system, resource.id()));
    }

    json!({
        "fullUrl": resource.key().reference(),
        "resource": resource.body(),
        "request": request,
    })
}

/// FHIR transaction bundle of all entries, in delivery order
pub fn transaction_bundle(bundle: &Bundle) -> Value {
    json!({
        "resourceType": "Bundle",
        "type": "transaction",
        "entry": bundle.entries().map(transaction_entry).collect::<Vec<_>>(),
    })
}

#[async_trait]
impl ResourceSink for HapiSink {
    fn name(&self) -> &'static str {
        "hapi"
    }

    async fn test_connection(&self) -> Result<()> {
        let url = format!("{}/metadata", self.config.base_url.trim_end_matches('/'));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FhirServerError::ConnectionFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SyncError::Connection(format!(
                "FHIR server capability statement returned {}",
                response.status()
            )));
        }
        tracing::info!(base_url = %self.config.base_url, "FHIR server connection test successful");
        Ok(())
    }

    async fn read_back_marker(&self) -> Result<NaiveDateTime> {
        Ok(chrono::Local::now().naive_local())
    }

    async fn deliver(&self, bundle: &Bundle, dry_run: bool) -> Result<DeliveryStats> {
        if bundle.cancellation_count() > 0 {
            tracing::warn!(
                cancellations = bundle.cancellation_count(),
                "Cancellations are not applied on a FHIR server destination"
            );
        }

        if dry_run {
            tracing::info!(
                base_url = %self.config.base_url,
                entries = bundle.len(),
                "DRY RUN: Would deliver {} resources to FHIR server",
                bundle.len()
            );
            return Ok(DeliveryStats::dry_run(bundle));
        }

        if bundle.entries().next().is_none() {
            tracing::debug!("Bundle has no entries, nothing sent to FHIR server");
            return Ok(DeliveryStats::default());
        }

        self.post(&transaction_bundle(bundle)).await?;
        tracing::info!(entries = bundle.len(), "FHIR bundle was sent to FHIR server");

        Ok(DeliveryStats {
            entries_sent: bundle.len(),
            cancellations_applied: 0,
            rows_affected: bundle.len() as u64,
            dry_run: false,
        })
    }

    async fn read_back(
        &self,
        _category: ReadBackCategory,
        _since: NaiveDateTime,
    ) -> Result<Option<ReadBackCounts>> {
        Ok(None)
    }

    async fn integrity_counts(&self) -> Result<Option<Vec<IntegrityCount>>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FhirId, ResourceType};

    fn patient(id: &str) -> MappedResource {
        MappedResource::new(ResourceType::Patient, FhirId::new(id).unwrap()).with(
            "identifier",
            json!([{ "system": "https://example.org/pid", "value": id }]),
        )
    }

    #[test]
    fn test_transaction_entry_shape() {
        let entry = transaction_entry(&patient("p1"));
        assert_eq!(entry["fullUrl"], "Patient/p1");
        assert_eq!(entry["request"]["method"], "POST");
        assert_eq!(entry["request"]["url"], "Patient");
        assert_eq!(
            entry["request"]["ifNoneExist"],
            "identifier=https://example.org/pid|p1"
        );
        assert_eq!(entry["resource"]["id"], "p1");
    }

    #[test]
    fn test_entry_without_identifier_has_no_condition() {
        let location = MappedResource::new(ResourceType::Location, FhirId::new("l1").unwrap());
        let entry = transaction_entry(&location);
        assert!(entry["request"].get("ifNoneExist").is_none());
    }

    #[test]
    fn test_transaction_bundle_follows_delivery_order() {
        let mut bundle = Bundle::new();
        bundle.add_resources(vec![
            MappedResource::new(ResourceType::Encounter, FhirId::new("e1").unwrap()),
            patient("p1"),
        ]);

        let body = transaction_bundle(&bundle);
        assert_eq!(body["type"], "transaction");
        assert_eq!(body["entry"][0]["fullUrl"], "Patient/p1");
        assert_eq!(body["entry"][1]["fullUrl"], "Encounter/e1");
    }
}
