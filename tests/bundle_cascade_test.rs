//! Integration tests for bundle accumulation and cascade delivery

use fhir_inc_sync::adapters::sink::{MemoryStore, ResourceSink};
use fhir_inc_sync::core::bundle::Bundle;
use fhir_inc_sync::core::cascade::{
    CascadeAction, CascadeReconciler, CascadeStep, DEPENDENCY_TABLE, UNKNOWN_REFERENCE,
};
use fhir_inc_sync::domain::{FhirId, MappedResource, ResourceKey, ResourceType};
use serde_json::{json, Value};

fn key(resource_type: ResourceType, id: &str) -> ResourceKey {
    ResourceKey::parse(resource_type, id).unwrap()
}

fn resource(resource_type: ResourceType, id: &str) -> MappedResource {
    MappedResource::new(resource_type, FhirId::new(id).unwrap())
}

fn clinical_record() -> Vec<MappedResource> {
    let patient = key(ResourceType::Patient, "p1");
    let encounter = key(ResourceType::Encounter, "e1");
    vec![
        resource(ResourceType::Patient, "p1").with("gender", json!("male")),
        resource(ResourceType::Encounter, "e1")
            .with_reference("subject", &patient)
            .with(
                "diagnosis",
                json!([{ "condition": { "reference": "Condition/e1_1" } }]),
            ),
        resource(ResourceType::Condition, "e1_1")
            .with_reference("subject", &patient)
            .with_reference("encounter", &encounter),
        resource(ResourceType::Procedure, "e1_2")
            .with_reference("subject", &patient)
            .with_reference("encounter", &encounter),
        resource(ResourceType::MedicationStatement, "e1_3_med_stat")
            .with_reference("subject", &patient)
            .with_reference("context", &encounter),
    ]
}

#[tokio::test]
async fn test_cancellation_in_same_bundle_wins() {
    let store = MemoryStore::new();
    let mut bundle = Bundle::new();
    bundle.add_resources(clinical_record());
    assert!(bundle.request_cancellation(ResourceType::Procedure, FhirId::new("e1_2").unwrap()));
    // A later upsert of the canceled key is ignored
    assert_eq!(
        bundle.add_resources([resource(ResourceType::Procedure, "e1_2")]),
        0
    );

    let stats = store.deliver(&bundle, false).await.unwrap();

    assert_eq!(stats.entries_sent, 4);
    assert_eq!(stats.cancellations_applied, 1);
    assert!(store.get(&key(ResourceType::Procedure, "e1_2")).is_none());
}

#[tokio::test]
async fn test_encounter_cancellation_detaches_dependents() {
    let store = MemoryStore::new();
    let mut load = Bundle::new();
    load.add_resources(clinical_record());
    store.deliver(&load, false).await.unwrap();

    let mut cancel = Bundle::new();
    cancel.request_cancellation(ResourceType::Encounter, FhirId::new("e1").unwrap());
    store.deliver(&cancel, false).await.unwrap();

    assert!(store.get(&key(ResourceType::Encounter, "e1")).unwrap().is_deleted);

    let condition = store.get(&key(ResourceType::Condition, "e1_1")).unwrap();
    assert!(!condition.is_deleted);
    assert_eq!(condition.data["encounter"]["reference"], UNKNOWN_REFERENCE);

    let procedure = store.get(&key(ResourceType::Procedure, "e1_2")).unwrap();
    assert_eq!(procedure.data["encounter"]["reference"], UNKNOWN_REFERENCE);

    let statement = store
        .get(&key(ResourceType::MedicationStatement, "e1_3_med_stat"))
        .unwrap();
    assert_eq!(statement.data["context"]["reference"], UNKNOWN_REFERENCE);
    assert_eq!(statement.data["subject"]["reference"], "Patient/p1");
}

#[tokio::test]
async fn test_patient_cancellation_deletes_clinical_facts() {
    let store = MemoryStore::new();
    let mut load = Bundle::new();
    load.add_resources(clinical_record());
    store.deliver(&load, false).await.unwrap();

    let mut cancel = Bundle::new();
    cancel.request_cancellation(ResourceType::Patient, FhirId::new("p1").unwrap());
    store.deliver(&cancel, false).await.unwrap();

    assert!(store.get(&key(ResourceType::Condition, "e1_1")).unwrap().is_deleted);
    assert!(store.get(&key(ResourceType::Procedure, "e1_2")).unwrap().is_deleted);

    let encounter = store.get(&key(ResourceType::Encounter, "e1")).unwrap();
    assert!(!encounter.is_deleted);
    assert_eq!(encounter.data["subject"]["reference"], UNKNOWN_REFERENCE);

    let statement = store
        .get(&key(ResourceType::MedicationStatement, "e1_3_med_stat"))
        .unwrap();
    assert!(!statement.is_deleted);
    assert_eq!(statement.data["subject"]["reference"], UNKNOWN_REFERENCE);
}

#[test]
fn test_patient_plan_deletes_before_nullifying() {
    let plan = CascadeReconciler::new().plan(&key(ResourceType::Patient, "p1"));

    assert_eq!(
        plan.steps[0],
        CascadeStep::SoftDelete {
            key: key(ResourceType::Patient, "p1")
        }
    );
    let first_nullify = plan
        .steps
        .iter()
        .position(|s| matches!(s, CascadeStep::NullifyReference { .. }))
        .unwrap();
    assert!(plan.steps[..first_nullify]
        .iter()
        .skip(1)
        .all(|s| matches!(s, CascadeStep::SoftDeleteReferencing { .. })));
}

#[tokio::test]
async fn test_cancelling_unknown_resource_is_a_no_op() {
    let store = MemoryStore::new();
    let mut load = Bundle::new();
    load.add_resources(clinical_record());
    store.deliver(&load, false).await.unwrap();
    let before = store.len();

    // Canceling something that was never stored is a no-op, not an error
    let mut cancel = Bundle::new();
    cancel.request_cancellation(ResourceType::Condition, FhirId::new("e9_9").unwrap());
    store.deliver(&cancel, false).await.unwrap();

    assert_eq!(store.len(), before);
    let encounter = store.get(&key(ResourceType::Encounter, "e1")).unwrap();
    assert_eq!(
        encounter.data["diagnosis"][0]["condition"]["reference"],
        "Condition/e1_1"
    );
}

/// Object with `value` at `path`
fn nested(path: &[&str], value: Value) -> Value {
    path.iter()
        .rev()
        .fold(value, |inner, field| {
            let mut object = serde_json::Map::new();
            object.insert((*field).to_string(), inner);
            Value::Object(object)
        })
}

#[tokio::test]
async fn test_every_dependency_edge_is_applied() {
    for edge in DEPENDENCY_TABLE {
        let store = MemoryStore::new();
        let parent = key(edge.parent, "parent");
        let reference = json!(parent.reference());

        let body = match edge.action {
            CascadeAction::NullifyArrayEntry { array } => (
                array,
                json!([
                    nested(edge.reference_path, json!("Other/kept")),
                    nested(edge.reference_path, reference),
                ]),
            ),
            _ => (edge.reference_path[0], nested(&edge.reference_path[1..], reference)),
        };
        let child = resource(edge.child, "child").with(body.0, body.1);

        let mut load = Bundle::new();
        load.add_resources([resource(edge.parent, "parent"), child]);
        store.deliver(&load, false).await.unwrap();

        let mut cancel = Bundle::new();
        cancel.request_cancellation(edge.parent, FhirId::new("parent").unwrap());
        store.deliver(&cancel, false).await.unwrap();

        let stored = store.get(&key(edge.child, "child")).unwrap();
        let label = format!("{:?} -> {:?}", edge.parent, edge.child);
        match edge.action {
            CascadeAction::CascadeDelete => assert!(stored.is_deleted, "{label}"),
            CascadeAction::NullifyReference => {
                assert!(!stored.is_deleted, "{label}");
                let mut value = &stored.data;
                for field in edge.reference_path {
                    value = &value[*field];
                }
                assert_eq!(value, UNKNOWN_REFERENCE, "{label}");
            }
            CascadeAction::NullifyArrayEntry { array } => {
                assert!(!stored.is_deleted, "{label}");
                let mut kept = &stored.data[array][0];
                let mut cleared = &stored.data[array][1];
                for field in edge.reference_path {
                    kept = &kept[*field];
                    cleared = &cleared[*field];
                }
                assert_eq!(kept, "Other/kept", "{label}");
                assert_eq!(cleared, UNKNOWN_REFERENCE, "{label}");
            }
        }
    }
}
