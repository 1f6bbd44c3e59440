//! Resource sink abstraction
//!
//! A sink receives one [`Bundle`] per pass and makes it durable: upserts
//! first, then every cascade plan of the bundle's cancellations.

use crate::core::bundle::Bundle;
use crate::core::sync::stats::{ReadBackCategory, ReadBackCounts};
use crate::domain::{ResourceType, Result};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::Serialize;

/// Outcome of delivering one bundle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryStats {
    pub entries_sent: usize,
    pub cancellations_applied: usize,
    pub rows_affected: u64,
    pub dry_run: bool,
}

impl DeliveryStats {
    /// Stats for a bundle that was only logged
    pub fn dry_run(bundle: &Bundle) -> Self {
        Self {
            entries_sent: bundle.len(),
            cancellations_applied: bundle.cancellation_count(),
            rows_affected: 0,
            dry_run: true,
        }
    }
}

/// Live resources of one category that point at live patients and encounters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IntegrityCount {
    pub category: ReadBackCategory,
    pub patients: u64,
    /// `None` for categories without an encounter reference
    pub encounters: Option<u64>,
}

/// Categories reported by `verify`
pub const INTEGRITY_CATEGORIES: [ReadBackCategory; 10] = [
    ReadBackCategory::Resource(ResourceType::Encounter),
    ReadBackCategory::SubEncounter,
    ReadBackCategory::Resource(ResourceType::Condition),
    ReadBackCategory::Resource(ResourceType::Procedure),
    ReadBackCategory::Resource(ResourceType::MedicationStatement),
    ReadBackCategory::Ventilation,
    ReadBackCategory::Dialysis,
    ReadBackCategory::Icu,
    ReadBackCategory::Lab,
    ReadBackCategory::LungFunction,
];

pub const SUBJECT_PATH: &[&str] = &["subject", "reference"];
const ENCOUNTER_PATH: &[&str] = &["encounter", "reference"];
const CONTEXT_PATH: &[&str] = &["context", "reference"];
const PART_OF_PATH: &[&str] = &["partOf", "reference"];

/// Path of the reference a category uses to point at its encounter
pub fn encounter_reference_path(category: ReadBackCategory) -> Option<&'static [&'static str]> {
    match category {
        ReadBackCategory::Resource(ResourceType::Encounter) => None,
        ReadBackCategory::SubEncounter => Some(PART_OF_PATH),
        ReadBackCategory::Resource(ResourceType::MedicationStatement) => Some(CONTEXT_PATH),
        _ => Some(ENCOUNTER_PATH),
    }
}

/// Destination of mapped resources
#[async_trait]
pub trait ResourceSink: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Test the connection to the destination
    async fn test_connection(&self) -> Result<()>;

    /// Timestamp to pass to [`ResourceSink::read_back`] after the next
    /// delivery, taken from the sink's own clock
    async fn read_back_marker(&self) -> Result<NaiveDateTime>;

    /// Delivers entries and cancellations atomically
    ///
    /// # Errors
    ///
    /// Any store or network failure fails the whole bundle; nothing is
    /// retried here.
    async fn deliver(&self, bundle: &Bundle, dry_run: bool) -> Result<DeliveryStats>;

    /// Rows of `category` touched at or after `since`, split by deletion
    /// state. `None` if the destination cannot be queried.
    async fn read_back(
        &self,
        category: ReadBackCategory,
        since: NaiveDateTime,
    ) -> Result<Option<ReadBackCounts>>;

    /// Referential integrity counts over live resources, `None` if the
    /// destination cannot be queried
    async fn integrity_counts(&self) -> Result<Option<Vec<IntegrityCount>>>;
}
