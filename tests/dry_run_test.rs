//! Integration tests for dry-run mode
//!
//! A dry run maps and accumulates everything as usual but leaves the
//! destination untouched and skips the read-back.

use chrono::{NaiveDate, NaiveDateTime};
use fhir_inc_sync::adapters::gpas::PrefixResolver;
use fhir_inc_sync::adapters::sink::MemoryStore;
use fhir_inc_sync::adapters::source::rows::{EncounterRow, PatientRow};
use fhir_inc_sync::adapters::source::MemorySource;
use fhir_inc_sync::config::SystemsConfig;
use fhir_inc_sync::core::mapping::LookupTables;
use fhir_inc_sync::core::sync::{PassContext, PassKind, ReadBackCategory, SyncCoordinator};
use fhir_inc_sync::domain::{ResourceType, Window};
use std::sync::Arc;

fn ts(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
}

fn source() -> MemorySource {
    let at = ts("2020-12-12 08:00:00");
    (1..=3).fold(MemorySource::new(), |source, id| {
        source
            .with_patient(
                at,
                PatientRow {
                    patient_id: id,
                    sex: Some("w".to_string()),
                    birth_date: NaiveDate::from_ymd_opt(1961, 7, 2),
                    ..Default::default()
                },
            )
            .with_encounter(
                at,
                EncounterRow {
                    encounter_id: id + 100,
                    patient_id: id,
                    admission: Some(ts("2020-12-01 10:00:00")),
                    ..Default::default()
                },
            )
    })
}

fn context(store: Arc<MemoryStore>, dry_run: bool) -> PassContext {
    PassContext {
        source: Arc::new(source()),
        resolver: Arc::new(PrefixResolver::default()),
        converter: None,
        sink: store,
        systems: Arc::new(SystemsConfig::default()),
        lookups: Arc::new(LookupTables::default()),
        window: Window::parse_dates("2020-12-12", "2020-12-14").unwrap(),
        chunk_size: 2,
        lab_chunk_size: 10,
        resolver_concurrency: 1,
        dry_run,
    }
}

#[tokio::test]
async fn test_dry_run_leaves_destination_empty() {
    let store = Arc::new(MemoryStore::new());
    let summary = SyncCoordinator::with_parts(
        context(store.clone(), true),
        vec![PassKind::Patients, PassKind::Encounters],
    )
    .execute_sync()
    .await
    .unwrap();

    assert!(summary.is_successful());
    assert!(summary.dry_run);
    assert!(store.is_empty());

    let patients = summary
        .pass(PassKind::Patients)
        .unwrap()
        .category(ReadBackCategory::Resource(ResourceType::Patient))
        .unwrap();
    assert_eq!(patients.valid, 3);
    assert_eq!(patients.upserted, None);
    assert_eq!(patients.removed, None);
}

#[tokio::test]
async fn test_dry_run_then_real_run_match() {
    let dry_store = Arc::new(MemoryStore::new());
    let dry = SyncCoordinator::with_parts(context(dry_store, true), vec![PassKind::Encounters])
        .execute_sync()
        .await
        .unwrap();

    let store = Arc::new(MemoryStore::new());
    let real = SyncCoordinator::with_parts(
        context(store.clone(), false),
        vec![PassKind::Encounters],
    )
    .execute_sync()
    .await
    .unwrap();

    let encounters = ReadBackCategory::Resource(ResourceType::Encounter);
    let dry_counts = dry.pass(PassKind::Encounters).unwrap().category(encounters).unwrap();
    let real_counts = real.pass(PassKind::Encounters).unwrap().category(encounters).unwrap();

    assert_eq!(dry_counts.valid, real_counts.valid);
    assert_eq!(
        dry.pass(PassKind::Encounters).unwrap().entries_delivered,
        real.pass(PassKind::Encounters).unwrap().entries_delivered
    );
    assert!(!real.dry_run);
    assert_eq!(store.count(ResourceType::Encounter, false), 3);
}
