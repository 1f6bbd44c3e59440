//! ICD-10-GM diagnosis to Condition

use super::fhir::{coding, concept, fhir_id, meta_source, opt_datetime, text, SOURCE_SAP};
use super::{required, MappingContext, ResourceMapper};
use crate::adapters::source::rows::DiagnosisRow;
use crate::domain::resource::compact_object;
use crate::domain::{MapOutcome, MappedResource, ResourceType, Result};
use serde_json::{json, Value};

pub const ICD_10_GM: &str = "http://fhir.de/CodeSystem/dimdi/icd-10-gm";
const CLINICAL_STATUS: &str = "http://terminology.hl7.org/CodeSystem/condition-clinical";
const HAUPT_KREUZ: &str = "http://fhir.de/StructureDefinition/icd-10-gm-haupt-kreuz";
const AUSRUFEZEICHEN: &str = "http://fhir.de/StructureDefinition/icd-10-gm-ausrufezeichen";
const STERN: &str = "http://fhir.de/StructureDefinition/icd-10-gm-stern";
const SEITENLOKALISATION: &str = "http://fhir.de/CodeSystem/kbv/s_icd_seitenlokalisation";

const REQUIRED: &[&str] = &[
    "code.coding.0.code",
    "subject.reference",
    "encounter.reference",
];

/// A condition with its rank in the encounter's diagnosis list
#[derive(Debug, Clone, PartialEq)]
pub struct RankedCondition {
    pub condition: MappedResource,
    /// 1 for the principal diagnosis, 2 otherwise
    pub rank: u32,
}

pub struct ConditionMapper;

/// `{encounter}_{diagnosis_nr}`
pub fn condition_id(encounter_psn: &str, diagnosis_nr: impl std::fmt::Display) -> String {
    format!("{encounter_psn}_{diagnosis_nr}")
}

fn icd_extension(url: &str, code: &str, version: Option<&str>) -> Value {
    json!({
        "url": url,
        "valueCoding": compact_object([
            ("system", json!(ICD_10_GM)),
            ("version", json!(version)),
            ("code", json!(code)),
        ]),
    })
}

fn laterality_sites(laterality: Option<&str>) -> Value {
    let laterality = match text(laterality) {
        Some(l) => l,
        None => return Value::Null,
    };

    let mut sites = Vec::new();
    if matches!(laterality, "L" | "B") {
        sites.push(concept(vec![coding(SEITENLOKALISATION, "L", Some("links"))]));
    }
    if matches!(laterality, "R" | "B") {
        sites.push(concept(vec![coding(SEITENLOKALISATION, "R", Some("rechts"))]));
    }
    if sites.is_empty() {
        Value::Null
    } else {
        Value::Array(sites)
    }
}

impl ResourceMapper<DiagnosisRow> for ConditionMapper {
    type Output = RankedCondition;

    fn map(
        &self,
        ctx: &MappingContext<'_>,
        row: &DiagnosisRow,
    ) -> Result<MapOutcome<RankedCondition>> {
        let encounter = ctx.ids.encounter_key()?;
        let patient = ctx.ids.patient_key()?;
        let icd_code = required(text(row.icd_code.as_deref()), "icd_code")?;
        let secondary = text(row.supplementary_icd_code.as_deref());
        let version = text(row.icd_version.as_deref());

        let id = condition_id(ctx.ids.encounter_psn()?, row.diagnosis_nr);
        let full_code = match secondary {
            Some(sec) => format!("{icd_code} {sec}"),
            None => icd_code.to_string(),
        };

        let mut icd_coding = compact_object([
            ("system", json!(ICD_10_GM)),
            ("code", json!(full_code)),
            ("version", json!(version)),
        ]);
        if let Some(sec) = secondary {
            let main_code: String = icd_code
                .chars()
                .filter(|c| !matches!(c, '+' | '†'))
                .collect();
            let mut extensions = vec![icd_extension(HAUPT_KREUZ, &main_code, version)];
            if sec.contains('!') {
                extensions.push(icd_extension(AUSRUFEZEICHEN, &sec.replace('!', ""), version));
            }
            if sec.contains('*') {
                extensions.push(icd_extension(STERN, &sec.replace('*', ""), version));
            }
            icd_coding["extension"] = Value::Array(extensions);
        }

        let condition = MappedResource::new(ResourceType::Condition, fhir_id(id.clone())?)
            .with("meta", meta_source(SOURCE_SAP))
            .with(
                "identifier",
                json!([{ "system": ctx.systems.condition_id, "value": id }]),
            )
            .with(
                "clinicalStatus",
                concept(vec![coding(CLINICAL_STATUS, "active", None)]),
            )
            .with("code", concept(vec![icd_coding]))
            .with_reference("encounter", &encounter)
            .with_reference("subject", &patient)
            .with("recordedDate", opt_datetime(row.documented_at))
            .with("bodySite", laterality_sites(row.laterality.as_deref()));

        let rank = if row.principal { 1 } else { 2 };
        Ok(condition
            .validate(REQUIRED)
            .map(|condition| RankedCondition { condition, rank }))
    }
}
