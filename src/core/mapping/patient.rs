//! Patient mapper

use super::fhir::{coding, concept, meta_source, text, SOURCE_SAP, V2_0203};
use super::{MappingContext, ResourceMapper};
use crate::adapters::source::rows::PatientRow;
use crate::domain::resource::compact_object;
use crate::domain::{MapOutcome, MappedResource, Result};
use serde_json::{json, Value};

const GKV_SYSTEM: &str = "http://fhir.de/NamingSystem/gkv/kvid-10";
const IDENTIFIER_TYPE_DE: &str = "http://fhir.de/CodeSystem/identifier-type-de-basis";

const REQUIRED: &[&str] = &["identifier.0.value", "gender", "birthDate"];

pub struct PatientMapper;

/// SAP sex code to FHIR administrative gender
pub fn gender(sex: Option<&str>) -> &'static str {
    match sex.map(|s| s.trim().to_lowercase()).as_deref() {
        Some("m") => "male",
        Some("w") => "female",
        Some("x") => "other",
        _ => "unknown",
    }
}

impl ResourceMapper<PatientRow> for PatientMapper {
    type Output = MappedResource;

    fn map(
        &self,
        ctx: &MappingContext<'_>,
        row: &PatientRow,
    ) -> Result<MapOutcome<MappedResource>> {
        let psn = ctx.ids.patient_psn()?;
        let key = ctx.ids.patient_key()?;
        let assigner = json!({ "reference": ctx.systems.assigner });

        let mut identifiers = vec![json!({
            "use": "official",
            "system": ctx.systems.patient_id,
            "value": psn,
            "assigner": assigner,
            "type": concept(vec![coding(V2_0203, "MR", None)]),
        })];
        if let Some(insurance_id) = text(row.insurance_id.as_deref()) {
            identifiers.push(json!({
                "use": "official",
                "system": GKV_SYSTEM,
                "value": insurance_id,
                "assigner": assigner,
                "type": concept(vec![coding(
                    IDENTIFIER_TYPE_DE,
                    "GKV",
                    Some("Gesetzliche Krankenversicherung"),
                )]),
            }));
        }

        let address = compact_object([
            ("city", json!(text(row.city.as_deref()))),
            ("postalCode", json!(text(row.postal_code.as_deref()))),
            (
                "line",
                text(row.street.as_deref())
                    .map(|s| json!([s]))
                    .unwrap_or(Value::Null),
            ),
            ("country", json!(text(row.country.as_deref()))),
        ]);

        let name = compact_object([
            ("use", json!("official")),
            ("family", json!(text(row.family_name.as_deref()))),
            (
                "given",
                text(row.given_name.as_deref())
                    .map(|s| json!([s]))
                    .unwrap_or(Value::Null),
            ),
        ]);

        let patient = MappedResource::new(key.resource_type, key.id)
            .with("meta", meta_source(SOURCE_SAP))
            .with("identifier", Value::Array(identifiers))
            .with("gender", json!(gender(row.sex.as_deref())))
            .with(
                "birthDate",
                json!(row.birth_date.map(|d| d.format("%Y-%m-%d").to_string())),
            )
            .with("deceasedBoolean", json!(row.deceased))
            .with(
                "address",
                if address.as_object().is_some_and(|a| a.is_empty()) {
                    Value::Null
                } else {
                    json!([address])
                },
            )
            .with("name", json!([name]));

        Ok(patient.validate(REQUIRED))
    }
}
