//! Bundle accumulator
//!
//! A [`Bundle`] collects everything one pass delivers in a single
//! transaction: the mapped resources and the cancellation requests.

use crate::domain::{FhirId, MappedResource, ResourceKey, ResourceType};
use std::collections::BTreeMap;

/// One transaction unit
///
/// Entries are keyed by `(type, id)`; the first resource accepted for a key
/// wins and later duplicates are dropped. A canceled key never appears as an
/// entry: cancellation removes an existing entry and blocks later ones.
#[derive(Debug, Clone, Default)]
pub struct Bundle {
    entries: BTreeMap<ResourceKey, MappedResource>,
    cancellations: BTreeMap<ResourceType, Vec<FhirId>>,
}

impl Bundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds resources and returns how many were accepted
    ///
    /// ```
    /// use fhir_inc_sync::core::bundle::Bundle;
    /// use fhir_inc_sync::domain::{FhirId, MappedResource, ResourceType};
    ///
    /// let patient = MappedResource::new(ResourceType::Patient, FhirId::new("p1").unwrap());
    /// let mut bundle = Bundle::new();
    /// assert_eq!(bundle.add_resources([patient.clone()]), 1);
    /// assert_eq!(bundle.add_resources([patient]), 0);
    /// assert_eq!(bundle.len(), 1);
    /// ```
    pub fn add_resources<I>(&mut self, resources: I) -> usize
    where
        I: IntoIterator<Item = MappedResource>,
    {
        let mut accepted = 0;
        for resource in resources {
            let key = resource.key();
            if self.entries.contains_key(&key) || self.is_canceled(&key) {
                tracing::trace!(resource = %key, "Skipping duplicate or canceled resource");
                continue;
            }
            self.entries.insert(key, resource);
            accepted += 1;
        }
        accepted
    }

    /// Records a cancellation for `(resource_type, id)`
    ///
    /// Returns true if a pending entry with the same key was dropped.
    pub fn request_cancellation(&mut self, resource_type: ResourceType, id: FhirId) -> bool {
        let key = ResourceKey::new(resource_type, id);
        let removed = self.entries.remove(&key).is_some();
        if removed {
            tracing::debug!(resource = %key, "Cancellation supersedes pending upsert");
        }
        self.cancellations
            .entry(resource_type)
            .or_default()
            .push(key.id);
        removed
    }

    pub fn is_canceled(&self, key: &ResourceKey) -> bool {
        self.cancellations
            .get(&key.resource_type)
            .is_some_and(|ids| ids.contains(&key.id))
    }

    pub fn reset(&mut self) {
        self.entries.clear();
        self.cancellations.clear();
    }

    /// Entries in delivery order: type priority first, then id
    pub fn entries(&self) -> impl Iterator<Item = &MappedResource> {
        self.entries.values()
    }

    /// Cancellation requests per type, in request order
    pub fn cancellations(&self) -> &BTreeMap<ResourceType, Vec<FhirId>> {
        &self.cancellations
    }

    pub fn cancellations_of(&self, resource_type: ResourceType) -> &[FhirId] {
        self.cancellations
            .get(&resource_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn cancellation_count(&self) -> usize {
        self.cancellations.values().map(Vec::len).sum()
    }

    /// Number of entries of a single type
    pub fn count_of(&self, resource_type: ResourceType) -> usize {
        self.entries
            .keys()
            .filter(|key| key.resource_type == resource_type)
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.cancellations.is_empty()
    }

    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.entries.contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn resource(resource_type: ResourceType, id: &str) -> MappedResource {
        MappedResource::new(resource_type, FhirId::new(id).unwrap())
    }

    fn key(resource_type: ResourceType, id: &str) -> ResourceKey {
        ResourceKey::parse(resource_type, id).unwrap()
    }

    #[test]
    fn test_first_entry_wins() {
        let mut bundle = Bundle::new();
        let first = resource(ResourceType::Patient, "p1").with("gender", json!("female"));
        let second = resource(ResourceType::Patient, "p1").with("gender", json!("male"));

        assert_eq!(bundle.add_resources([first, second]), 1);
        let kept = bundle.entries().next().unwrap();
        assert_eq!(kept.body()["gender"], "female");
    }

    #[test]
    fn test_empty_input_has_no_effect() {
        let mut bundle = Bundle::new();
        assert_eq!(bundle.add_resources(Vec::new()), 0);
        assert!(bundle.is_empty());
    }

    #[test]
    fn test_delivery_order_follows_type_priority() {
        let mut bundle = Bundle::new();
        bundle.add_resources([
            resource(ResourceType::Observation, "a"),
            resource(ResourceType::Encounter, "b"),
            resource(ResourceType::Patient, "z"),
            resource(ResourceType::Patient, "c"),
        ]);

        let order: Vec<String> = bundle.entries().map(|r| r.key().reference()).collect();
        assert_eq!(
            order,
            vec!["Patient/c", "Patient/z", "Encounter/b", "Observation/a"]
        );
    }

    #[test]
    fn test_cancellation_removes_entry() {
        let mut bundle = Bundle::new();
        bundle.add_resources([resource(ResourceType::Patient, "p1")]);

        assert!(bundle.request_cancellation(ResourceType::Patient, FhirId::new("p1").unwrap()));
        assert!(!bundle.contains(&key(ResourceType::Patient, "p1")));
        assert_eq!(bundle.cancellation_count(), 1);
    }

    #[test]
    fn test_cancellation_blocks_later_entry() {
        let mut bundle = Bundle::new();
        bundle.request_cancellation(ResourceType::Condition, FhirId::new("e1_2").unwrap());

        assert_eq!(bundle.add_resources([resource(ResourceType::Condition, "e1_2")]), 0);
        assert_eq!(bundle.add_resources([resource(ResourceType::Condition, "e1_3")]), 1);
        assert!(bundle.is_canceled(&key(ResourceType::Condition, "e1_2")));
    }

    #[test]
    fn test_cancellation_is_per_type() {
        let mut bundle = Bundle::new();
        bundle.request_cancellation(ResourceType::Procedure, FhirId::new("e1_1").unwrap());
        assert_eq!(bundle.add_resources([resource(ResourceType::Condition, "e1_1")]), 1);
    }

    #[test]
    fn test_contents_independent_of_order() {
        let items = vec![
            resource(ResourceType::Patient, "p1"),
            resource(ResourceType::Encounter, "e1"),
            resource(ResourceType::Patient, "p2"),
        ];

        let mut forward = Bundle::new();
        forward.add_resources(items.clone());
        let mut backward = Bundle::new();
        backward.add_resources(items.into_iter().rev());

        let keys = |b: &Bundle| b.entries().map(MappedResource::key).collect::<Vec<_>>();
        assert_eq!(keys(&forward), keys(&backward));
    }

    #[test]
    fn test_reset_and_counts() {
        let mut bundle = Bundle::new();
        bundle.add_resources([
            resource(ResourceType::Encounter, "e1"),
            resource(ResourceType::Encounter, "e2"),
            resource(ResourceType::Location, "l1"),
        ]);
        bundle.request_cancellation(ResourceType::Patient, FhirId::new("p9").unwrap());

        assert_eq!(bundle.count_of(ResourceType::Encounter), 2);
        assert_eq!(bundle.cancellations_of(ResourceType::Patient).len(), 1);
        assert!(bundle.cancellations_of(ResourceType::Condition).is_empty());

        bundle.reset();
        assert!(bundle.is_empty());
        assert_eq!(bundle.len(), 0);
    }
}
