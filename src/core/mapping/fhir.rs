//! Small FHIR element builders shared by the mappers

use crate::domain::{FhirId, Result, SyncError};
use chrono::NaiveDateTime;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

pub const SOURCE_SAP: &str = "#sap-ish";
pub const LOINC: &str = "http://loinc.org";
pub const SNOMED: &str = "http://snomed.info/sct";
pub const UCUM: &str = "http://unitsofmeasure.org";
pub const V2_0203: &str = "http://terminology.hl7.org/CodeSystem/v2-0203";
pub const ACT_CODE: &str = "http://terminology.hl7.org/CodeSystem/v3-ActCode";

/// `YYYY-MM-DDTHH:MM:SS`, the form every mapper writes
pub fn fhir_datetime(ts: NaiveDateTime) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S").to_string()
}

pub fn opt_datetime(ts: Option<NaiveDateTime>) -> Value {
    ts.map(fhir_datetime).map(Value::from).unwrap_or(Value::Null)
}

/// Period with whichever bounds are known, `null` when neither is
pub fn period(start: Option<NaiveDateTime>, end: Option<NaiveDateTime>) -> Value {
    if start.is_none() && end.is_none() {
        return Value::Null;
    }
    crate::domain::resource::compact_object([
        ("start", opt_datetime(start)),
        ("end", opt_datetime(end)),
    ])
}

pub fn coding(system: &str, code: &str, display: Option<&str>) -> Value {
    crate::domain::resource::compact_object([
        ("system", json!(system)),
        ("code", json!(code)),
        ("display", display.map(Value::from).unwrap_or(Value::Null)),
    ])
}

pub fn concept(codings: Vec<Value>) -> Value {
    json!({ "coding": codings })
}

pub fn meta_source(source: &str) -> Value {
    json!({ "source": source })
}

/// Hex sha256 of the concatenated parts
pub fn sha256_id(parts: &[&str]) -> Result<FhirId> {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }
    fhir_id(format!("{:x}", hasher.finalize()))
}

pub fn fhir_id(id: impl Into<String>) -> Result<FhirId> {
    FhirId::new(id).map_err(SyncError::Mapping)
}

/// Two decimals, as stored for day counts
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Non-empty trimmed text
pub fn text(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}
