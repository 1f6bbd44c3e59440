//! Domain identifier types with validation
//!
//! FHIR resources are addressed by `(type, id)`. The newtypes below keep the two
//! halves from being mixed up and validate ids before they reach a sink.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// FHIR resource types produced by the sync engine
///
/// Declaration order is the delivery priority inside a bundle: referenced
/// resources come before the resources that reference them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceType {
    Patient,
    Location,
    Encounter,
    Condition,
    Medication,
    Procedure,
    MedicationStatement,
    Observation,
    DiagnosticReport,
}

impl ResourceType {
    /// All resource types in delivery order
    pub const ALL: [ResourceType; 9] = [
        ResourceType::Patient,
        ResourceType::Location,
        ResourceType::Encounter,
        ResourceType::Condition,
        ResourceType::Medication,
        ResourceType::Procedure,
        ResourceType::MedicationStatement,
        ResourceType::Observation,
        ResourceType::DiagnosticReport,
    ];

    /// FHIR resource type name
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Patient => "Patient",
            ResourceType::Location => "Location",
            ResourceType::Encounter => "Encounter",
            ResourceType::Condition => "Condition",
            ResourceType::Medication => "Medication",
            ResourceType::Procedure => "Procedure",
            ResourceType::MedicationStatement => "MedicationStatement",
            ResourceType::Observation => "Observation",
            ResourceType::DiagnosticReport => "DiagnosticReport",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("Unknown resource type: {s}"))
    }
}

/// FHIR logical id newtype wrapper
///
/// Pseudonyms, composite ids such as `{encounter}_{nr}` and sha256 digests all
/// end up here. An id must be non-empty, at most 256 characters and free of
/// whitespace and `/`, since it is embedded in `Type/id` references.
///
/// # Examples
///
/// ```
/// use fhir_inc_sync::domain::ids::FhirId;
///
/// let id = FhirId::new("dic-eid-110_3").unwrap();
/// assert_eq!(id.as_str(), "dic-eid-110_3");
/// assert!(FhirId::new("a/b").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FhirId(String);

impl FhirId {
    /// Maximum id length accepted by the store
    pub const MAX_LEN: usize = 256;

    /// Creates a new FhirId from a string
    pub fn new(id: impl Into<String>) -> Result<Self, String> {
        let id = id.into();
        if id.is_empty() {
            return Err("FHIR id cannot be empty".to_string());
        }
        if id.len() > Self::MAX_LEN {
            return Err(format!(
                "FHIR id exceeds {} characters: {}",
                Self::MAX_LEN,
                id
            ));
        }
        if id.chars().any(|c| c.is_whitespace() || c == '/') {
            return Err(format!("FHIR id contains invalid characters: '{id}'"));
        }
        Ok(Self(id))
    }

    /// Returns the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FhirId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for FhirId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for FhirId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for FhirId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<FhirId> for String {
    fn from(id: FhirId) -> Self {
        id.0
    }
}

/// Identity of a resource in the store: `(type, id)`
///
/// Ordering follows [`ResourceType`] priority first, then the id, which is the
/// order in which bundle entries are delivered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    pub resource_type: ResourceType,
    pub id: FhirId,
}

impl ResourceKey {
    pub fn new(resource_type: ResourceType, id: FhirId) -> Self {
        Self { resource_type, id }
    }

    /// Builds a key from a raw id string
    pub fn parse(resource_type: ResourceType, id: impl Into<String>) -> Result<Self, String> {
        Ok(Self::new(resource_type, FhirId::new(id)?))
    }

    /// Literal FHIR reference, `Type/id`
    pub fn reference(&self) -> String {
        format!("{}/{}", self.resource_type, self.id)
    }

    /// Parses a literal reference of the form `Type/id`
    ///
    /// ```
    /// use fhir_inc_sync::domain::ids::{ResourceKey, ResourceType};
    ///
    /// let key = ResourceKey::parse_reference("Patient/dic-pid-110").unwrap();
    /// assert_eq!(key.resource_type, ResourceType::Patient);
    /// assert_eq!(key.id.as_str(), "dic-pid-110");
    /// ```
    pub fn parse_reference(reference: &str) -> Result<Self, String> {
        let (type_part, id_part) = reference
            .split_once('/')
            .ok_or_else(|| format!("Not a literal reference: {reference}"))?;
        Self::parse(type_part.parse()?, id_part)
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.resource_type, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_type_round_trip_names() {
        for resource_type in ResourceType::ALL {
            assert_eq!(
                resource_type.as_str().parse::<ResourceType>().unwrap(),
                resource_type
            );
        }
        assert!("Organization".parse::<ResourceType>().is_err());
    }

    #[test]
    fn test_resource_type_priority_order() {
        assert!(ResourceType::Patient < ResourceType::Encounter);
        assert!(ResourceType::Location < ResourceType::Encounter);
        assert!(ResourceType::Medication < ResourceType::MedicationStatement);
        assert!(ResourceType::Observation < ResourceType::DiagnosticReport);
    }

    #[test]
    fn test_fhir_id_validation() {
        assert!(FhirId::new("dic-pid-110").is_ok());
        assert!(FhirId::new("").is_err());
        assert!(FhirId::new("has space").is_err());
        assert!(FhirId::new("Patient/1").is_err());
        assert!(FhirId::new("x".repeat(FhirId::MAX_LEN + 1)).is_err());
    }

    #[test]
    fn test_fhir_id_deserialize_validates() {
        let ok: FhirId = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(ok.as_str(), "abc");
        assert!(serde_json::from_str::<FhirId>("\"\"").is_err());
    }

    #[test]
    fn test_resource_key_reference() {
        let key = ResourceKey::parse(ResourceType::Encounter, "dic-eid-110").unwrap();
        assert_eq!(key.reference(), "Encounter/dic-eid-110");
        assert_eq!(key.to_string(), key.reference());
    }

    #[test]
    fn test_parse_reference_rejects_garbage() {
        assert!(ResourceKey::parse_reference("UNKNOWN").is_err());
        assert!(ResourceKey::parse_reference("Foo/1").is_err());
        assert!(ResourceKey::parse_reference("Patient/").is_err());
    }

    #[test]
    fn test_resource_key_ordering() {
        let patient = ResourceKey::parse(ResourceType::Patient, "z").unwrap();
        let encounter = ResourceKey::parse(ResourceType::Encounter, "a").unwrap();
        assert!(patient < encounter);
    }
}
