//! Integration tests for the LOINC conversion client against a mock server

use fhir_inc_sync::adapters::loinc::{LabQuantity, LoincClient, UnitConverter};
use fhir_inc_sync::config::TerminologyConfig;
use mockito::Matcher;
use serde_json::json;

fn client(url: String) -> LoincClient {
    LoincClient::from_config(&TerminologyConfig {
        loinc_url: Some(url),
        timeout_seconds: 5,
    })
    .unwrap()
    .unwrap()
}

fn creatinine() -> LabQuantity {
    LabQuantity {
        loinc: "2160-0".to_string(),
        unit: "µmol/l".to_string(),
        value: 88.4,
    }
}

#[tokio::test]
async fn test_converts_to_preferred_unit() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/conversions")
        .match_body(Matcher::Json(json!([
            { "loinc": "2160-0", "unit": "µmol/l", "value": 88.4 }
        ])))
        .with_status(200)
        .with_body(r#"[{"loinc":"2160-0","unit":"mg/dL","value":1.0}]"#)
        .create_async()
        .await;

    let converted = client(format!("{}/conversions", server.url()))
        .convert(&creatinine())
        .await
        .unwrap();

    assert_eq!(
        converted,
        Some(LabQuantity {
            loinc: "2160-0".to_string(),
            unit: "mg/dL".to_string(),
            value: 1.0,
        })
    );
    mock.assert_async().await;
}

#[tokio::test]
async fn test_unconvertible_value_yields_none() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/conversions")
        .with_status(200)
        .with_body(r#"[{"error":"unit not convertible"}]"#)
        .create_async()
        .await;

    let converted = client(format!("{}/conversions", server.url()))
        .convert(&creatinine())
        .await
        .unwrap();
    assert_eq!(converted, None);
}

#[tokio::test]
async fn test_service_failure_is_an_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/conversions")
        .with_status(500)
        .create_async()
        .await;

    let result = client(format!("{}/conversions", server.url()))
        .convert(&creatinine())
        .await;
    assert!(result.is_err());
}
