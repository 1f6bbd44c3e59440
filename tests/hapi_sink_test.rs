//! Integration tests for the HAPI FHIR sink against a mock server

use fhir_inc_sync::adapters::hapi::HapiSink;
use fhir_inc_sync::adapters::sink::ResourceSink;
use fhir_inc_sync::config::{secret_string, HapiConfig};
use fhir_inc_sync::core::bundle::Bundle;
use fhir_inc_sync::core::sync::ReadBackCategory;
use fhir_inc_sync::domain::{FhirId, FhirServerError, MappedResource, ResourceType, SyncError};
use mockito::Matcher;
use serde_json::json;

fn config(base_url: String) -> HapiConfig {
    HapiConfig {
        base_url,
        timeout_seconds: 5,
        username: None,
        password: None,
    }
}

fn patient(id: &str) -> MappedResource {
    MappedResource::new(ResourceType::Patient, FhirId::new(id).unwrap())
        .with(
            "identifier",
            json!([{ "system": "https://example.org/PatientId", "value": id }]),
        )
        .with("gender", json!("female"))
}

fn bundle_of(ids: &[&str]) -> Bundle {
    let mut bundle = Bundle::new();
    bundle.add_resources(ids.iter().map(|id| patient(id)).collect::<Vec<_>>());
    bundle
}

#[tokio::test]
async fn test_delivers_transaction_bundle() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/fhir")
        .match_header("content-type", "application/fhir+json;charset=utf-8")
        .match_body(Matcher::PartialJson(json!({
            "resourceType": "Bundle",
            "type": "transaction",
            "entry": [
                {
                    "fullUrl": "Patient/dic-pid-1",
                    "request": {
                        "method": "POST",
                        "url": "Patient",
                        "ifNoneExist": "identifier=https://example.org/PatientId|dic-pid-1"
                    }
                },
                { "fullUrl": "Patient/dic-pid-2" }
            ]
        })))
        .with_status(200)
        .with_body(r#"{"resourceType":"Bundle","type":"transaction-response"}"#)
        .expect(1)
        .create_async()
        .await;

    let sink = HapiSink::new(config(format!("{}/fhir", server.url()))).unwrap();
    let stats = sink
        .deliver(&bundle_of(&["dic-pid-1", "dic-pid-2"]), false)
        .await
        .unwrap();

    assert_eq!(stats.entries_sent, 2);
    assert_eq!(stats.cancellations_applied, 0);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_sends_basic_auth_when_configured() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/fhir")
        .match_header("authorization", "Basic aGFwaTpzZWNyZXQ=")
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let mut config = config(format!("{}/fhir", server.url()));
    config.username = Some("hapi".to_string());
    config.password = Some(secret_string("secret".to_string()));
    let sink = HapiSink::new(config).unwrap();

    sink.deliver(&bundle_of(&["dic-pid-1"]), false).await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn test_rejected_bundle_fails_delivery() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/fhir")
        .with_status(422)
        .with_body(r#"{"resourceType":"OperationOutcome"}"#)
        .create_async()
        .await;

    let sink = HapiSink::new(config(format!("{}/fhir", server.url()))).unwrap();
    let result = sink.deliver(&bundle_of(&["dic-pid-1"]), false).await;

    assert!(matches!(
        result,
        Err(SyncError::FhirServer(FhirServerError::ClientError { status: 422, .. }))
    ));
}

#[tokio::test]
async fn test_empty_bundle_and_dry_run_send_nothing() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/fhir")
        .with_status(200)
        .expect(0)
        .create_async()
        .await;

    let sink = HapiSink::new(config(format!("{}/fhir", server.url()))).unwrap();

    let mut cancellations = Bundle::new();
    cancellations.request_cancellation(ResourceType::Patient, FhirId::new("dic-pid-1").unwrap());
    let stats = sink.deliver(&cancellations, false).await.unwrap();
    assert_eq!(stats.entries_sent, 0);

    let stats = sink.deliver(&bundle_of(&["dic-pid-1"]), true).await.unwrap();
    assert!(stats.dry_run);

    mock.assert_async().await;
}

#[tokio::test]
async fn test_connection_checks_capability_statement() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/fhir/metadata")
        .with_status(200)
        .with_body(r#"{"resourceType":"CapabilityStatement"}"#)
        .create_async()
        .await;

    let sink = HapiSink::new(config(format!("{}/fhir/", server.url()))).unwrap();
    sink.test_connection().await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn test_read_back_and_integrity_are_unavailable() {
    let sink = HapiSink::new(config("http://localhost:1/fhir".to_string())).unwrap();
    let since = chrono::NaiveDate::from_ymd_opt(2020, 12, 12)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();

    assert!(sink
        .read_back(ReadBackCategory::Resource(ResourceType::Patient), since)
        .await
        .unwrap()
        .is_none());
    assert!(sink.integrity_counts().await.unwrap().is_none());
}
