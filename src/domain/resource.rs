//! Mapped FHIR resources
//!
//! A [`MappedResource`] is the unit that flows from the mappers through the
//! bundle to a sink. Its body is plain JSON; the struct keeps the identity
//! and the outgoing references next to it so the core never has to re-parse
//! the body to find them.

use super::ids::{FhirId, ResourceKey, ResourceType};
use serde_json::{json, Map, Value};

/// An outgoing reference held by a resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceReference {
    /// JSON path of the `reference` string inside the body
    pub path: Vec<String>,
    /// Referenced resource
    pub target: ResourceKey,
}

/// A FHIR resource produced by a mapper
#[derive(Debug, Clone, PartialEq)]
pub struct MappedResource {
    resource_type: ResourceType,
    id: FhirId,
    body: Value,
    references: Vec<ResourceReference>,
}

impl MappedResource {
    /// Creates a resource whose body holds `resourceType` and `id`
    pub fn new(resource_type: ResourceType, id: FhirId) -> Self {
        let body = json!({
            "resourceType": resource_type.as_str(),
            "id": id.as_str(),
        });
        Self {
            resource_type,
            id,
            body,
            references: Vec::new(),
        }
    }

    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    pub fn id(&self) -> &FhirId {
        &self.id
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(self.resource_type, self.id.clone())
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    pub fn references(&self) -> &[ResourceReference] {
        &self.references
    }

    /// Sets a top-level field. `null` values are skipped so optional source
    /// columns do not produce empty elements.
    pub fn with(mut self, field: &str, value: Value) -> Self {
        self.set(field, value);
        self
    }

    /// In-place variant of [`MappedResource::with`]
    pub fn set(&mut self, field: &str, value: Value) {
        if value.is_null() {
            return;
        }
        if let Value::Object(map) = &mut self.body {
            map.insert(field.to_string(), value);
        }
    }

    /// Sets `field` to `{"reference": "Type/id"}` and records the reference
    pub fn with_reference(mut self, field: &str, target: &ResourceKey) -> Self {
        self.set(field, json!({ "reference": target.reference() }));
        self.references.push(ResourceReference {
            path: vec![field.to_string(), "reference".to_string()],
            target: target.clone(),
        });
        self
    }

    /// Records a reference that the caller already wrote into the body,
    /// e.g. inside an array element
    pub fn record_reference(&mut self, path: &[&str], target: &ResourceKey) {
        self.references.push(ResourceReference {
            path: path.iter().map(|s| s.to_string()).collect(),
            target: target.clone(),
        });
    }

    /// Looks up a value by JSON path
    pub fn get(&self, path: &[&str]) -> Option<&Value> {
        get_json_path(&self.body, path)
    }

    /// System of the first identifier, used for conditional creates
    pub fn identifier_system(&self) -> Option<&str> {
        self.get(&["identifier", "0", "system"])
            .and_then(Value::as_str)
    }

    /// Checks that every dotted path in `required` holds a non-empty value
    ///
    /// ```
    /// use fhir_inc_sync::domain::{FhirId, MappedResource, ResourceType};
    /// use serde_json::json;
    ///
    /// let patient = MappedResource::new(ResourceType::Patient, FhirId::new("p1").unwrap())
    ///     .with("name", json!([{ "family": "Doe" }]));
    /// assert!(patient.clone().validate(&["name.0.family"]).is_valid());
    /// assert!(!patient.validate(&["birthDate"]).is_valid());
    /// ```
    pub fn validate(self, required: &[&str]) -> MapOutcome<Self> {
        let missing: Vec<&str> = required
            .iter()
            .copied()
            .filter(|dotted| {
                let path: Vec<&str> = dotted.split('.').collect();
                match self.get(&path) {
                    None | Some(Value::Null) => true,
                    Some(Value::String(s)) => s.trim().is_empty(),
                    Some(Value::Array(items)) => items.is_empty(),
                    Some(_) => false,
                }
            })
            .collect();

        if missing.is_empty() {
            MapOutcome::Mapped(self)
        } else {
            MapOutcome::Invalid(format!(
                "{} {} is missing required field(s): {}",
                self.resource_type,
                self.id,
                missing.join(", ")
            ))
        }
    }
}

/// Result of mapping a single source row
///
/// `Invalid` is a normal outcome: the row is counted and skipped. Errors that
/// abort the pass travel as `Err(SyncError)` instead.
#[derive(Debug, Clone, PartialEq)]
pub enum MapOutcome<T> {
    Mapped(T),
    Invalid(String),
}

impl<T> MapOutcome<T> {
    pub fn is_valid(&self) -> bool {
        matches!(self, MapOutcome::Mapped(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> MapOutcome<U> {
        match self {
            MapOutcome::Mapped(value) => MapOutcome::Mapped(f(value)),
            MapOutcome::Invalid(reason) => MapOutcome::Invalid(reason),
        }
    }

    pub fn ok(self) -> Option<T> {
        match self {
            MapOutcome::Mapped(value) => Some(value),
            MapOutcome::Invalid(_) => None,
        }
    }
}

/// Resolves a path through objects and arrays; numeric segments index arrays
pub fn get_json_path<'a, S: AsRef<str>>(value: &'a Value, path: &[S]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, segment| {
        let segment = segment.as_ref();
        match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        }
    })
}

/// Replaces the value at `path`, following PostgreSQL `jsonb_set` rules
///
/// All parents must already exist. A missing final object key is only
/// created when `create_missing` is set; array indexes must be in range.
/// Returns whether the document changed.
pub fn set_json_path<S: AsRef<str>>(
    value: &mut Value,
    path: &[S],
    new_value: Value,
    create_missing: bool,
) -> bool {
    let Some((last, parents)) = path.split_last() else {
        return false;
    };

    let mut current = value;
    for segment in parents {
        let segment = segment.as_ref();
        let next = match current {
            Value::Object(map) => map.get_mut(segment),
            Value::Array(items) => segment
                .parse::<usize>()
                .ok()
                .and_then(move |i| items.get_mut(i)),
            _ => None,
        };
        match next {
            Some(node) => current = node,
            None => return false,
        }
    }

    let last = last.as_ref();
    match current {
        Value::Object(map) => {
            if map.contains_key(last) || create_missing {
                map.insert(last.to_string(), new_value);
                true
            } else {
                false
            }
        }
        Value::Array(items) => match last.parse::<usize>().ok().and_then(|i| items.get_mut(i)) {
            Some(slot) => {
                *slot = new_value;
                true
            }
            None => false,
        },
        _ => false,
    }
}

/// Builds a JSON object from `(key, value)` pairs, dropping `null` values
pub fn compact_object<I>(pairs: I) -> Value
where
    I: IntoIterator<Item = (&'static str, Value)>,
{
    let map: Map<String, Value> = pairs
        .into_iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| (k.to_string(), v))
        .collect();
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encounter() -> MappedResource {
        MappedResource::new(ResourceType::Encounter, FhirId::new("e1").unwrap())
    }

    #[test]
    fn test_new_sets_type_and_id() {
        let res = encounter();
        assert_eq!(res.body()["resourceType"], "Encounter");
        assert_eq!(res.body()["id"], "e1");
        assert_eq!(res.key().reference(), "Encounter/e1");
    }

    #[test]
    fn test_with_skips_null() {
        let res = encounter().with("period", Value::Null);
        assert!(res.get(&["period"]).is_none());
    }

    #[test]
    fn test_with_reference_records_path() {
        let patient = ResourceKey::parse(ResourceType::Patient, "p1").unwrap();
        let res = encounter().with_reference("subject", &patient);
        assert_eq!(res.body()["subject"]["reference"], "Patient/p1");
        assert_eq!(res.references().len(), 1);
        assert_eq!(res.references()[0].path, vec!["subject", "reference"]);
        assert_eq!(res.references()[0].target, patient);
    }

    #[test]
    fn test_identifier_system() {
        let res = encounter().with(
            "identifier",
            json!([{ "system": "https://example.org/enc", "value": "e1" }]),
        );
        assert_eq!(res.identifier_system(), Some("https://example.org/enc"));
        assert_eq!(encounter().identifier_system(), None);
    }

    #[test]
    fn test_validate_reports_missing_fields() {
        let outcome = encounter()
            .with("status", json!("finished"))
            .validate(&["status", "period.start"]);
        match outcome {
            MapOutcome::Invalid(reason) => assert!(reason.contains("period.start")),
            MapOutcome::Mapped(_) => panic!("expected invalid outcome"),
        }
    }

    #[test]
    fn test_get_json_path_through_arrays() {
        let doc = json!({ "diagnosis": [{ "condition": { "reference": "Condition/c1" } }] });
        assert_eq!(
            get_json_path(&doc, &["diagnosis", "0", "condition", "reference"]),
            Some(&json!("Condition/c1"))
        );
        assert_eq!(get_json_path(&doc, &["diagnosis", "1"]), None);
    }

    #[test]
    fn test_set_json_path_like_jsonb_set() {
        let mut doc = json!({ "subject": { "reference": "Patient/p1" } });
        assert!(set_json_path(
            &mut doc,
            &["subject", "reference"],
            json!("UNKNOWN"),
            true
        ));
        assert_eq!(doc["subject"]["reference"], "UNKNOWN");

        // missing parent is never created
        assert!(!set_json_path(
            &mut doc,
            &["encounter", "reference"],
            json!("UNKNOWN"),
            true
        ));
        assert!(doc.get("encounter").is_none());

        // missing leaf only with create_missing
        assert!(!set_json_path(&mut doc, &["subject", "display"], json!("x"), false));
    }

    #[test]
    fn test_set_json_path_array_index() {
        let mut doc = json!({ "diagnosis": [
            { "condition": { "reference": "Condition/a" } },
            { "condition": { "reference": "Condition/b" } }
        ]});
        assert!(set_json_path(
            &mut doc,
            &["diagnosis", "1", "condition", "reference"],
            json!("UNKNOWN"),
            false
        ));
        assert_eq!(doc["diagnosis"][0]["condition"]["reference"], "Condition/a");
        assert_eq!(doc["diagnosis"][1]["condition"]["reference"], "UNKNOWN");
        assert!(!set_json_path(
            &mut doc,
            &["diagnosis", "5", "condition", "reference"],
            json!("UNKNOWN"),
            false
        ));
    }

    #[test]
    fn test_compact_object_drops_nulls() {
        let obj = compact_object([("start", json!("2020-01-01")), ("end", Value::Null)]);
        assert_eq!(obj, json!({ "start": "2020-01-01" }));
    }
}
