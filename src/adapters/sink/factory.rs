//! Sink factory

use super::traits::ResourceSink;
use crate::adapters::hapi::HapiSink;
use crate::adapters::postgresql::{PostgreSQLClient, PostgresSink};
use crate::config::{DestinationConfig, DestinationKind};
use crate::domain::{Result, SyncError};
use std::sync::Arc;

/// Create the sink selected by `destination.kind`
///
/// # Errors
///
/// Returns an error if the section of the active kind is missing or its
/// client cannot be built.
pub async fn create_sink(
    destination: &DestinationConfig,
) -> Result<Arc<dyn ResourceSink + Send + Sync>> {
    match destination.kind {
        DestinationKind::Psql => {
            let store = destination.postgresql.as_ref().ok_or_else(|| {
                SyncError::Configuration(
                    "destination.postgresql configuration is required for psql".to_string(),
                )
            })?;

            tracing::info!(table = %store.table, "Creating PostgreSQL sink");
            let client = PostgreSQLClient::new(store.connection.clone()).await?;
            let sink = PostgresSink::new(Arc::new(client), store.table.clone());

            Ok(Arc::new(sink) as Arc<dyn ResourceSink + Send + Sync>)
        }
        DestinationKind::Hapi => {
            let hapi = destination.hapi.as_ref().ok_or_else(|| {
                SyncError::Configuration(
                    "destination.hapi configuration is required for hapi".to_string(),
                )
            })?;

            tracing::info!(base_url = %hapi.base_url, "Creating HAPI FHIR sink");
            let sink = HapiSink::new(hapi.clone())?;

            Ok(Arc::new(sink) as Arc<dyn ResourceSink + Send + Sync>)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HapiConfig;

    #[tokio::test]
    async fn test_missing_section_is_configuration_error() {
        let destination = DestinationConfig {
            kind: DestinationKind::Psql,
            postgresql: None,
            hapi: None,
        };
        let result = create_sink(&destination).await;
        assert!(matches!(result, Err(SyncError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_creates_hapi_sink() {
        let destination = DestinationConfig {
            kind: DestinationKind::Hapi,
            postgresql: None,
            hapi: Some(HapiConfig {
                base_url: "http://localhost:8080/fhir".to_string(),
                timeout_seconds: 30,
                username: None,
                password: None,
            }),
        };
        let sink = create_sink(&destination).await.unwrap();
        assert_eq!(sink.name(), "hapi");
    }
}
