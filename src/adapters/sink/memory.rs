//! In-memory resource store
//!
//! Follows the `resources_inc` semantics of the PostgreSQL sink row for row:
//! upserts revive soft-deleted rows, cascade steps bump `last_updated_at`,
//! and a delivery either applies completely or not at all. Used for local
//! runs and tests.

use super::traits::{
    encounter_reference_path, DeliveryStats, IntegrityCount, ResourceSink, INTEGRITY_CATEGORIES,
    SUBJECT_PATH,
};
use crate::core::bundle::Bundle;
use crate::core::cascade::{CascadeReconciler, CascadeStep, UNKNOWN_REFERENCE};
use crate::core::sync::stats::{ReadBackCategory, ReadBackCounts};
use crate::domain::resource::{get_json_path, set_json_path};
use crate::domain::{ResourceKey, ResourceType, Result, SyncError};
use async_trait::async_trait;
use chrono::{Duration, NaiveDateTime};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

/// One row of the store
#[derive(Debug, Clone, PartialEq)]
pub struct StoredResource {
    pub data: Value,
    pub is_deleted: bool,
    pub created_at: NaiveDateTime,
    pub last_updated_at: NaiveDateTime,
}

impl StoredResource {
    fn touched_at(&self) -> NaiveDateTime {
        self.created_at.max(self.last_updated_at)
    }
}

type Rows = BTreeMap<ResourceKey, StoredResource>;

#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: Mutex<Rows>,
    clock: Mutex<Option<NaiveDateTime>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &ResourceKey) -> Option<StoredResource> {
        self.lock_rows().ok().and_then(|rows| rows.get(key).cloned())
    }

    /// Number of rows of `resource_type` with the given deletion state
    pub fn count(&self, resource_type: ResourceType, is_deleted: bool) -> usize {
        self.lock_rows()
            .map(|rows| {
                rows.iter()
                    .filter(|(k, r)| k.resource_type == resource_type && r.is_deleted == is_deleted)
                    .count()
            })
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.lock_rows().map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_rows(&self) -> Result<MutexGuard<'_, Rows>> {
        self.rows
            .lock()
            .map_err(|_| SyncError::Database("Memory store lock poisoned".to_string()))
    }

    /// Strictly increasing clock, so consecutive deliveries never share a
    /// timestamp
    fn tick(&self) -> Result<NaiveDateTime> {
        let mut last = self
            .clock
            .lock()
            .map_err(|_| SyncError::Database("Memory store clock poisoned".to_string()))?;
        let now = chrono::Local::now().naive_local();
        let next = match *last {
            Some(previous) if now <= previous => previous + Duration::microseconds(1),
            _ => now,
        };
        *last = Some(next);
        Ok(next)
    }
}

fn references(row: &StoredResource, path: &[&str], reference: &str) -> bool {
    get_json_path(&row.data, path).and_then(Value::as_str) == Some(reference)
}

fn apply_step(rows: &mut Rows, step: &CascadeStep, now: NaiveDateTime) -> u64 {
    let mut affected = 0;
    match step {
        CascadeStep::SoftDelete { key } => {
            if let Some(row) = rows.get_mut(key) {
                row.is_deleted = true;
                row.last_updated_at = now;
                affected += 1;
            }
        }
        CascadeStep::SoftDeleteReferencing {
            child,
            path,
            reference,
        } => {
            for (_, row) in rows
                .iter_mut()
                .filter(|(k, r)| k.resource_type == *child && references(r, path, reference))
            {
                row.is_deleted = true;
                row.last_updated_at = now;
                affected += 1;
            }
        }
        CascadeStep::NullifyReference {
            child,
            path,
            reference,
        } => {
            for (_, row) in rows
                .iter_mut()
                .filter(|(k, r)| k.resource_type == *child && references(r, path, reference))
            {
                if set_json_path(&mut row.data, *path, Value::from(UNKNOWN_REFERENCE), false) {
                    row.last_updated_at = now;
                    affected += 1;
                }
            }
        }
        CascadeStep::NullifyArrayEntry {
            child,
            array,
            element_path,
            reference,
        } => {
            for (key, row) in rows.iter_mut() {
                if key.resource_type != *child {
                    continue;
                }
                let indexes: Vec<usize> = match row.data.get(*array) {
                    Some(Value::Array(items)) => items
                        .iter()
                        .enumerate()
                        .filter(|(_, item)| {
                            get_json_path(item, *element_path).and_then(Value::as_str)
                                == Some(reference.as_str())
                        })
                        .map(|(i, _)| i)
                        .collect(),
                    _ => continue,
                };
                for index in indexes {
                    let index = index.to_string();
                    let path: Vec<&str> = [*array, index.as_str()]
                        .into_iter()
                        .chain(element_path.iter().copied())
                        .collect();
                    let unknown = Value::from(UNKNOWN_REFERENCE);
                    if set_json_path(&mut row.data, path.as_slice(), unknown, false) {
                        row.last_updated_at = now;
                        affected += 1;
                    }
                }
            }
        }
    }
    affected
}

#[async_trait]
impl ResourceSink for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn test_connection(&self) -> Result<()> {
        Ok(())
    }

    async fn read_back_marker(&self) -> Result<NaiveDateTime> {
        self.tick()
    }

    async fn deliver(&self, bundle: &Bundle, dry_run: bool) -> Result<DeliveryStats> {
        if dry_run {
            tracing::info!(
                entries = bundle.len(),
                cancellations = bundle.cancellation_count(),
                "DRY RUN: Would deliver {} resources and {} cancellations to memory store",
                bundle.len(),
                bundle.cancellation_count()
            );
            return Ok(DeliveryStats::dry_run(bundle));
        }

        let plans = CascadeReconciler::new().plan_bundle(bundle);
        let now = self.tick()?;
        let mut guard = self.lock_rows()?;

        // Work on a copy so a delivery is all-or-nothing
        let mut rows = guard.clone();
        let mut affected = 0;

        for resource in bundle.entries() {
            rows.entry(resource.key())
                .and_modify(|row| {
                    row.data = resource.body().clone();
                    row.is_deleted = false;
                    row.last_updated_at = now;
                })
                .or_insert_with(|| StoredResource {
                    data: resource.body().clone(),
                    is_deleted: false,
                    created_at: now,
                    last_updated_at: now,
                });
            affected += 1;
        }

        for plan in &plans {
            for step in &plan.steps {
                affected += apply_step(&mut rows, step, now);
            }
        }

        *guard = rows;

        Ok(DeliveryStats {
            entries_sent: bundle.len(),
            cancellations_applied: plans.len(),
            rows_affected: affected,
            dry_run: false,
        })
    }

    async fn read_back(
        &self,
        category: ReadBackCategory,
        since: NaiveDateTime,
    ) -> Result<Option<ReadBackCounts>> {
        let rows = self.lock_rows()?;
        let mut counts = ReadBackCounts::default();
        for (key, row) in rows.iter() {
            if row.touched_at() >= since && category.matches(key.resource_type, &row.data) {
                if row.is_deleted {
                    counts.removed += 1;
                } else {
                    counts.upserted += 1;
                }
            }
        }
        Ok(Some(counts))
    }

    async fn integrity_counts(&self) -> Result<Option<Vec<IntegrityCount>>> {
        let rows = self.lock_rows()?;

        let live_references = |resource_type: ResourceType| -> HashSet<String> {
            rows.iter()
                .filter(|(k, r)| k.resource_type == resource_type && !r.is_deleted)
                .map(|(k, _)| k.reference())
                .collect()
        };
        let patients = live_references(ResourceType::Patient);
        let encounters = live_references(ResourceType::Encounter);

        let distinct_targets = |category: ReadBackCategory,
                                path: &[&str],
                                targets: &HashSet<String>|
         -> u64 {
            rows.iter()
                .filter(|(k, r)| !r.is_deleted && category.matches(k.resource_type, &r.data))
                .filter_map(|(_, r)| get_json_path(&r.data, path).and_then(Value::as_str))
                .filter(|reference| targets.contains(*reference))
                .collect::<HashSet<_>>()
                .len() as u64
        };

        let counts = INTEGRITY_CATEGORIES
            .iter()
            .map(|category| IntegrityCount {
                category: *category,
                patients: distinct_targets(*category, SUBJECT_PATH, &patients),
                encounters: encounter_reference_path(*category)
                    .map(|path| distinct_targets(*category, path, &encounters)),
            })
            .collect();

        Ok(Some(counts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FhirId, MappedResource};
    use serde_json::json;

    fn key(resource_type: ResourceType, id: &str) -> ResourceKey {
        ResourceKey::parse(resource_type, id).unwrap()
    }

    fn patient(id: &str) -> MappedResource {
        MappedResource::new(ResourceType::Patient, FhirId::new(id).unwrap())
            .with("gender", json!("female"))
    }

    fn encounter(id: &str, patient_id: &str, conditions: &[&str]) -> MappedResource {
        let diagnosis: Vec<Value> = conditions
            .iter()
            .map(|c| json!({ "condition": { "reference": format!("Condition/{c}") } }))
            .collect();
        MappedResource::new(ResourceType::Encounter, FhirId::new(id).unwrap())
            .with_reference("subject", &key(ResourceType::Patient, patient_id))
            .with("diagnosis", Value::Array(diagnosis))
    }

    fn condition(id: &str, patient_id: &str, encounter_id: &str) -> MappedResource {
        MappedResource::new(ResourceType::Condition, FhirId::new(id).unwrap())
            .with_reference("subject", &key(ResourceType::Patient, patient_id))
            .with_reference("encounter", &key(ResourceType::Encounter, encounter_id))
    }

    fn bundle_of(resources: Vec<MappedResource>) -> Bundle {
        let mut bundle = Bundle::new();
        bundle.add_resources(resources);
        bundle
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let store = MemoryStore::new();
        let bundle = bundle_of(vec![patient("p1"), patient("p2")]);

        store.deliver(&bundle, false).await.unwrap();
        let first = store.get(&key(ResourceType::Patient, "p1")).unwrap();
        store.deliver(&bundle, false).await.unwrap();
        let second = store.get(&key(ResourceType::Patient, "p1")).unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(first.data, second.data);
        assert_eq!(first.created_at, second.created_at);
        assert!(second.last_updated_at > first.last_updated_at);
    }

    #[tokio::test]
    async fn test_cancel_then_upsert_revives() {
        let store = MemoryStore::new();
        store
            .deliver(&bundle_of(vec![patient("p1")]), false)
            .await
            .unwrap();

        let mut cancel = Bundle::new();
        cancel.request_cancellation(ResourceType::Patient, FhirId::new("p1").unwrap());
        store.deliver(&cancel, false).await.unwrap();
        assert!(store.get(&key(ResourceType::Patient, "p1")).unwrap().is_deleted);

        store
            .deliver(&bundle_of(vec![patient("p1")]), false)
            .await
            .unwrap();
        assert!(!store.get(&key(ResourceType::Patient, "p1")).unwrap().is_deleted);
    }

    #[tokio::test]
    async fn test_patient_cancellation_cascades() {
        let store = MemoryStore::new();
        store
            .deliver(
                &bundle_of(vec![
                    patient("p1"),
                    encounter("e1", "p1", &["e1_1"]),
                    condition("e1_1", "p1", "e1"),
                ]),
                false,
            )
            .await
            .unwrap();

        let mut cancel = Bundle::new();
        cancel.request_cancellation(ResourceType::Patient, FhirId::new("p1").unwrap());
        store.deliver(&cancel, false).await.unwrap();

        let enc = store.get(&key(ResourceType::Encounter, "e1")).unwrap();
        assert!(!enc.is_deleted);
        assert_eq!(enc.data["subject"]["reference"], "UNKNOWN");
        assert!(store.get(&key(ResourceType::Condition, "e1_1")).unwrap().is_deleted);
    }

    #[tokio::test]
    async fn test_condition_cancellation_nullifies_one_entry() {
        let store = MemoryStore::new();
        store
            .deliver(
                &bundle_of(vec![encounter("e1", "p1", &["e1_1", "e1_2", "e1_3"])]),
                false,
            )
            .await
            .unwrap();

        let mut cancel = Bundle::new();
        cancel.request_cancellation(ResourceType::Condition, FhirId::new("e1_3").unwrap());
        store.deliver(&cancel, false).await.unwrap();

        let enc = store.get(&key(ResourceType::Encounter, "e1")).unwrap();
        assert_eq!(enc.data["diagnosis"][0]["condition"]["reference"], "Condition/e1_1");
        assert_eq!(enc.data["diagnosis"][1]["condition"]["reference"], "Condition/e1_2");
        assert_eq!(enc.data["diagnosis"][2]["condition"]["reference"], "UNKNOWN");
    }

    #[tokio::test]
    async fn test_read_back_counts_since_marker() {
        let store = MemoryStore::new();
        store
            .deliver(&bundle_of(vec![patient("p1"), patient("p2")]), false)
            .await
            .unwrap();

        let since = store.read_back_marker().await.unwrap();
        let mut bundle = bundle_of(vec![patient("p3")]);
        bundle.request_cancellation(ResourceType::Patient, FhirId::new("p1").unwrap());
        store.deliver(&bundle, false).await.unwrap();

        let counts = store
            .read_back(ReadBackCategory::Resource(ResourceType::Patient), since)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(counts, ReadBackCounts { upserted: 1, removed: 1 });
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let store = MemoryStore::new();
        let stats = store
            .deliver(&bundle_of(vec![patient("p1")]), true)
            .await
            .unwrap();
        assert!(stats.dry_run);
        assert_eq!(stats.entries_sent, 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_integrity_counts() {
        let store = MemoryStore::new();
        store
            .deliver(
                &bundle_of(vec![
                    patient("p1"),
                    encounter("e1", "p1", &[]),
                    condition("e1_1", "p1", "e1"),
                    condition("e1_2", "p1", "e1"),
                ]),
                false,
            )
            .await
            .unwrap();

        let counts = store.integrity_counts().await.unwrap().unwrap();
        let conditions = counts
            .iter()
            .find(|c| c.category == ReadBackCategory::Resource(ResourceType::Condition))
            .unwrap();
        assert_eq!(conditions.patients, 1);
        assert_eq!(conditions.encounters, Some(1));

        let encounters = counts
            .iter()
            .find(|c| c.category == ReadBackCategory::Resource(ResourceType::Encounter))
            .unwrap();
        assert_eq!(encounters.patients, 1);
        assert_eq!(encounters.encounters, None);
    }
}
