//! Identifier resolution seam

use crate::domain::Result;
use async_trait::async_trait;

/// Maps raw source ids to pseudonyms
///
/// Implementations must be deterministic within a run: the same raw id
/// always yields the same pseudonym.
#[async_trait]
pub trait IdentifierResolver: Send + Sync {
    async fn resolve_patient(&self, raw: &str) -> Result<String>;

    async fn resolve_encounter(&self, raw: &str) -> Result<String>;
}

/// Resolver that prefixes raw ids, e.g. `110` becomes `dic-pid-110`
///
/// Used for local runs against test data and in tests.
#[derive(Debug, Clone)]
pub struct PrefixResolver {
    patient_prefix: String,
    encounter_prefix: String,
}

impl PrefixResolver {
    pub fn new(patient_prefix: impl Into<String>, encounter_prefix: impl Into<String>) -> Self {
        Self {
            patient_prefix: patient_prefix.into(),
            encounter_prefix: encounter_prefix.into(),
        }
    }
}

impl Default for PrefixResolver {
    fn default() -> Self {
        Self::new("dic-pid-", "dic-eid-")
    }
}

#[async_trait]
impl IdentifierResolver for PrefixResolver {
    async fn resolve_patient(&self, raw: &str) -> Result<String> {
        Ok(format!("{}{}", self.patient_prefix, raw))
    }

    async fn resolve_encounter(&self, raw: &str) -> Result<String> {
        Ok(format!("{}{}", self.encounter_prefix, raw))
    }
}
