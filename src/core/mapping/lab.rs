//! Laboratory results to Observation
//!
//! Unit conversion through the terminology service is async and happens in
//! the lab pass; the mapper only sees its result.

use super::fhir::{coding, concept, fhir_id, opt_datetime, text, LOINC, UCUM, V2_0203};
use super::{MappingContext, ResourceMapper};
use crate::adapters::loinc::LabQuantity;
use crate::adapters::source::rows::LabRow;
use crate::domain::resource::compact_object;
use crate::domain::{MapOutcome, MappedResource, ResourceType, Result};
use serde_json::{json, Value};

pub const SOURCE_LABORATORY: &str = "#laboratory";
pub const NO_LOINC: &str = "noLoinc";

const OBSERVATION_CATEGORY: &str = "http://terminology.hl7.org/CodeSystem/observation-category";
const INTERPRETATION: &str = "http://terminology.hl7.org/CodeSystem/v3-ObservationInterpretation";
const METHOD: &str = "http://methodConcept";

const REQUIRED: &[&str] = &[
    "identifier.0.value",
    "status",
    "code.coding.0.code",
    "subject.reference",
    "encounter.reference",
];

/// Maps laboratory unit spellings to UCUM
pub fn normalize_unit(unit: &str) -> &str {
    match unit {
        "10E12/L" => "10*6/uL",
        "10E9/L" => "10*3/uL",
        "mE/l" => "m[IU]/L",
        "ug/l" | "µg/l" => "ng/mL",
        other => other,
    }
}

/// Equality comparators carry no information in FHIR
fn comparator(value: Option<&str>) -> Option<&str> {
    text(value).filter(|c| !matches!(*c, "!=" | "=" | "=="))
}

fn interpretation_display(flag: &str) -> &'static str {
    match flag {
        "N" => "Normal",
        "L" => "Low",
        "H" => "High",
        _ => "Unknown",
    }
}

fn quantity(value: f64, unit: Option<&str>, comparator: Option<&str>) -> Value {
    compact_object([
        ("value", json!(value)),
        ("comparator", json!(comparator)),
        ("unit", json!(unit)),
        ("system", json!(UCUM)),
        ("code", json!(unit)),
    ])
}

/// A lab row plus the converter's answer for it, if any
#[derive(Debug, Clone, Copy)]
pub struct LabInput<'a> {
    pub row: &'a LabRow,
    pub converted: Option<&'a LabQuantity>,
}

pub struct LabMapper;

impl LabMapper {
    /// Quantity to send to the unit converter, with the unit already
    /// normalized; `None` for rows the converter cannot handle
    pub fn convertible(row: &LabRow) -> Option<LabQuantity> {
        let loinc = text(row.loinc_code.as_deref()).filter(|c| *c != NO_LOINC)?;
        let unit = text(row.unit.as_deref())?;
        Some(LabQuantity {
            loinc: loinc.to_string(),
            unit: normalize_unit(unit).to_string(),
            value: row.value_num?,
        })
    }
}

impl<'a> ResourceMapper<LabInput<'a>> for LabMapper {
    type Output = MappedResource;

    fn map(
        &self,
        ctx: &MappingContext<'_>,
        input: &LabInput<'a>,
    ) -> Result<MapOutcome<MappedResource>> {
        let row = input.row;
        let encounter = ctx.ids.encounter_key()?;
        let patient = ctx.ids.patient_key()?;
        let id = row.result_id.trim();

        let normalized = Self::convertible(row);
        let effective = input.converted.or(normalized.as_ref());
        let loinc = effective
            .map(|q| q.loinc.as_str())
            .or_else(|| text(row.loinc_code.as_deref()));
        let unit = effective
            .map(|q| q.unit.as_str())
            .or_else(|| text(row.unit.as_deref()));

        let mut observation = MappedResource::new(ResourceType::Observation, fhir_id(id)?)
            .with("meta", json!({ "source": SOURCE_LABORATORY }))
            .with(
                "identifier",
                json!([{
                    "system": ctx.systems.lab_id,
                    "value": id,
                    "assigner": { "reference": ctx.systems.assigner },
                    "type": concept(vec![coding(V2_0203, "MR", None)]),
                }]),
            )
            .with("status", json!("final"))
            .with(
                "category",
                concept(vec![coding(
                    OBSERVATION_CATEGORY,
                    "laboratory",
                    Some("Laboratory"),
                )]),
            )
            .with(
                "code",
                loinc
                    .map(|code| concept(vec![coding(LOINC, code, None)]))
                    .unwrap_or(Value::Null),
            )
            .with_reference("encounter", &encounter)
            .with_reference("subject", &patient)
            .with("effectiveDateTime", opt_datetime(row.collected_at));

        match (effective, row.value_num) {
            (Some(q), _) => observation.set(
                "valueQuantity",
                quantity(q.value, Some(&q.unit), comparator(row.comparator.as_deref())),
            ),
            (None, Some(value)) => observation.set(
                "valueQuantity",
                quantity(value, unit, comparator(row.comparator.as_deref())),
            ),
            (None, None) => {
                observation.set("valueString", json!(text(row.value_text.as_deref())))
            }
        }

        if let (Some(low), Some(high)) = (row.reference_low, row.reference_high) {
            observation.set(
                "referenceRange",
                json!([{
                    "low": quantity(low, unit, None),
                    "high": quantity(high, unit, None),
                }]),
            );
        }

        observation.set(
            "method",
            json!({ "coding": [{
                "system": METHOD,
                "display": row.method_id.as_deref().unwrap_or("None"),
            }] }),
        );

        if let Some(flag) = text(row.interpretation_flag.as_deref()) {
            observation.set(
                "interpretation",
                json!([concept(vec![coding(
                    INTERPRETATION,
                    flag,
                    Some(interpretation_display(flag)),
                )])]),
            );
        }

        Ok(observation.validate(REQUIRED))
    }
}
