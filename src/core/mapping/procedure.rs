//! OPS procedures, and the drug applications behind OPS chapter 6 codes

use super::fhir::{
    coding, concept, fhir_id, meta_source, opt_datetime, period, text, SNOMED, SOURCE_SAP, UCUM,
};
use super::lookups::OpsDrug;
use super::{required, MappingContext, ResourceMapper};
use crate::adapters::source::rows::ProcedureRow;
use crate::domain::resource::compact_object;
use crate::domain::{MapOutcome, MappedResource, ResourceType, Result};
use serde_json::{json, Value};

pub const OPS: &str = "http://fhir.de/CodeSystem/dimdi/ops";
const ATC: &str = "http://fhir.de/CodeSystem/dimdi/atc";
const ATC_VERSION: &str = "ATC/DDD Version 2020";
const UNII: &str = "http://fdasis.nlm.nih.gov";
const ASK: &str = "http://fhir.de/CodeSystem/ask";
const CAS: &str = "urn:oid:2.16.840.1.113883.6.61";
const SNOMED_BODY_VERSION: &str = "http://snomed.info/sct/900000000000207008/version/20200309";

const REQUIRED: &[&str] = &[
    "code.coding.0.code",
    "subject.reference",
    "encounter.reference",
];
const MEDICATION_REQUIRED: &[&str] = &["code.coding.0.code"];
const STATEMENT_REQUIRED: &[&str] = &[
    "medicationReference.reference",
    "subject.reference",
    "status",
];

pub fn procedure_id(encounter_psn: &str, procedure_nr: impl std::fmt::Display) -> String {
    format!("{encounter_psn}_{procedure_nr}")
}

pub fn medication_id(encounter_psn: &str, procedure_nr: impl std::fmt::Display) -> String {
    format!("{encounter_psn}_{procedure_nr}_med")
}

pub fn medication_statement_id(
    encounter_psn: &str,
    procedure_nr: impl std::fmt::Display,
) -> String {
    format!("{encounter_psn}_{procedure_nr}_med_stat")
}

/// OPS chapter 6 codes describe drug applications
pub fn is_drug_application(ops_code: &str) -> bool {
    ops_code.starts_with('6')
}

fn body_site(code: &str, display: &str) -> Value {
    let mut coding = coding(SNOMED, code, Some(display));
    coding["version"] = json!(SNOMED_BODY_VERSION);
    concept(vec![coding])
}

fn laterality_sites(laterality: Option<&str>) -> Value {
    let Some(laterality) = text(laterality) else {
        return Value::Null;
    };
    let mut sites = Vec::new();
    if matches!(laterality, "L" | "B") {
        sites.push(body_site(
            "31156008",
            "Structure of left half of body (body structure)",
        ));
    }
    if matches!(laterality, "R" | "B") {
        sites.push(body_site(
            "85421007",
            "Structure of right half of body (body structure)",
        ));
    }
    if sites.is_empty() {
        Value::Null
    } else {
        Value::Array(sites)
    }
}

pub struct ProcedureMapper;

impl ResourceMapper<ProcedureRow> for ProcedureMapper {
    type Output = MappedResource;

    fn map(
        &self,
        ctx: &MappingContext<'_>,
        row: &ProcedureRow,
    ) -> Result<MapOutcome<MappedResource>> {
        let encounter = ctx.ids.encounter_key()?;
        let patient = ctx.ids.patient_key()?;
        let ops_code = required(text(row.ops_code.as_deref()), "ops_code")?;
        let id = procedure_id(ctx.ids.encounter_psn()?, row.procedure_nr);

        let procedure = MappedResource::new(ResourceType::Procedure, fhir_id(id.clone())?)
            .with("meta", meta_source(SOURCE_SAP))
            .with(
                "identifier",
                json!([{ "system": ctx.systems.procedure_id, "value": id }]),
            )
            .with("status", json!("completed"))
            .with("category", concept(vec![coding(SNOMED, "387713003", None)]))
            .with(
                "code",
                concept(vec![compact_object([
                    ("system", json!(OPS)),
                    ("code", json!(ops_code)),
                    ("version", json!(text(row.ops_version.as_deref()))),
                ])]),
            )
            .with_reference("encounter", &encounter)
            .with_reference("subject", &patient)
            .with("performedDateTime", opt_datetime(row.begin))
            .with("bodySite", laterality_sites(row.laterality.as_deref()));

        Ok(procedure.validate(REQUIRED))
    }
}

/// Medication and the statement administering it
#[derive(Debug, Clone, PartialEq)]
pub struct MedicationResources {
    pub medication: MappedResource,
    pub statement: MapOutcome<MappedResource>,
}

/// Builds Medication and MedicationStatement for drug applications known
/// to the OPS drug table; any other procedure maps to `None`
pub struct MedicationMapper;

impl MedicationMapper {
    fn ingredients(ctx: &MappingContext<'_>, drug: &OpsDrug) -> Vec<Value> {
        drug.substances()
            .into_iter()
            .filter_map(|substance| match ctx.lookups.substance(substance) {
                Some(codes) => Some(json!({
                    "itemCodeableConcept": concept(vec![
                        coding(UNII, &codes.unii, Some(substance)),
                        coding(ASK, &codes.ask, Some(substance)),
                        coding(CAS, &codes.cas, Some(substance)),
                    ]),
                })),
                None => {
                    tracing::debug!(substance, "No substance codes for ingredient");
                    None
                }
            })
            .collect()
    }

    fn dose(value: Option<f64>, drug: &OpsDrug) -> Value {
        match value {
            Some(value) => compact_object([
                ("value", json!(value)),
                ("unit", json!(drug.ucum_full)),
                ("system", json!(UCUM)),
                ("code", json!(drug.ucum_short)),
            ]),
            None => Value::Null,
        }
    }

    fn dosage(drug: &OpsDrug) -> Value {
        let range = compact_object([
            ("low", Self::dose(drug.dosage_min, drug)),
            ("high", Self::dose(drug.dosage_max, drug)),
        ]);
        json!([compact_object([
            ("text", json!(text(drug.text.as_deref()))),
            ("doseAndRate", json!([{ "doseRange": range }])),
        ])])
    }
}

impl ResourceMapper<ProcedureRow> for MedicationMapper {
    type Output = Option<MedicationResources>;

    fn map(
        &self,
        ctx: &MappingContext<'_>,
        row: &ProcedureRow,
    ) -> Result<MapOutcome<Option<MedicationResources>>> {
        let Some(ops_code) = text(row.ops_code.as_deref()).filter(|c| is_drug_application(c)) else {
            return Ok(MapOutcome::Mapped(None));
        };
        let Some(drug) = ctx.lookups.ops_drug(ops_code) else {
            return Ok(MapOutcome::Mapped(None));
        };

        let encounter = ctx.ids.encounter_key()?;
        let patient = ctx.ids.patient_key()?;
        let encounter_psn = ctx.ids.encounter_psn()?;

        let med_id = medication_id(encounter_psn, row.procedure_nr);
        let mut medication = MappedResource::new(ResourceType::Medication, fhir_id(med_id.clone())?)
            .with("meta", meta_source(SOURCE_SAP))
            .with(
                "identifier",
                json!([{ "system": ctx.systems.medication_id, "value": med_id }]),
            )
            .with(
                "code",
                concept(vec![json!({
                    "system": ATC,
                    "code": drug.atc_code,
                    "version": ATC_VERSION,
                    "display": drug.medication,
                })]),
            )
            .with("status", json!("active"));
        let ingredients = Self::ingredients(ctx, drug);
        if !ingredients.is_empty() {
            medication.set("ingredient", Value::Array(ingredients));
        }

        let medication = match medication.validate(MEDICATION_REQUIRED) {
            MapOutcome::Mapped(medication) => medication,
            MapOutcome::Invalid(reason) => return Ok(MapOutcome::Invalid(reason)),
        };

        let stat_id = medication_statement_id(encounter_psn, row.procedure_nr);
        let status = if row.end.is_some() { "completed" } else { "active" };
        let statement = MappedResource::new(
            ResourceType::MedicationStatement,
            fhir_id(stat_id.clone())?,
        )
        .with("meta", meta_source(SOURCE_SAP))
        .with(
            "identifier",
            json!([{ "system": ctx.systems.medication_statement_id, "value": stat_id }]),
        )
        .with_reference("medicationReference", &medication.key())
        .with_reference("context", &encounter)
        .with_reference("subject", &patient)
        .with("status", json!(status))
        .with("effectivePeriod", period(row.begin, row.end))
        .with("dosage", Self::dosage(drug))
        .validate(STATEMENT_REQUIRED);

        Ok(MapOutcome::Mapped(Some(MedicationResources {
            medication,
            statement,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SystemsConfig;
    use crate::core::mapping::lookups::SubstanceCodes;
    use crate::core::mapping::{LookupTables, Pseudonyms};
    use crate::domain::SyncError;
    use chrono::NaiveDateTime;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn row(ops: &str) -> ProcedureRow {
        ProcedureRow {
            encounter_id: 110,
            patient_id: 110,
            procedure_nr: 7,
            ops_code: Some(ops.to_string()),
            ops_version: Some("2020".to_string()),
            laterality: Some("R".to_string()),
            begin: Some(ts("2020-03-02 10:00:00")),
            end: None,
        }
    }

    fn lookups() -> LookupTables {
        let mut tables = LookupTables::default();
        tables.ops_drugs.insert(
            "6-002.p3".to_string(),
            OpsDrug {
                medication: "Caspofungin-Voriconazol".to_string(),
                atc_code: "J02AX04".to_string(),
                text: Some("150 mg bis unter 200 mg".to_string()),
                ucum_short: Some("mg".to_string()),
                ucum_full: Some("milligram".to_string()),
                dosage_min: Some(150.0),
                dosage_max: Some(200.0),
                combination: true,
            },
        );
        tables.substances.insert(
            "Caspofungin".to_string(),
            SubstanceCodes {
                unii: "F0XDI6ZL63".to_string(),
                ask: "28449".to_string(),
                cas: "162808-62-0".to_string(),
            },
        );
        tables
    }

    fn with_ctx<T>(f: impl FnOnce(&MappingContext<'_>) -> T) -> T {
        let systems = SystemsConfig::default();
        let lookups = lookups();
        let ids = Pseudonyms::both("dic-pid-110", "dic-eid-110");
        f(&MappingContext::new(&systems, &lookups, &ids))
    }

    #[test]
    fn test_maps_procedure() {
        let procedure = with_ctx(|ctx| ProcedureMapper.map(ctx, &row("5-820.00")))
            .unwrap()
            .ok()
            .unwrap();
        let body = procedure.body();

        assert_eq!(body["id"], "dic-eid-110_7");
        assert_eq!(body["code"]["coding"][0]["system"], OPS);
        assert_eq!(body["code"]["coding"][0]["code"], "5-820.00");
        assert_eq!(body["category"]["coding"][0]["code"], "387713003");
        assert_eq!(body["performedDateTime"], "2020-03-02T10:00:00");
        assert_eq!(body["bodySite"].as_array().unwrap().len(), 1);
        assert_eq!(body["bodySite"][0]["coding"][0]["code"], "85421007");
    }

    #[test]
    fn test_missing_ops_code_is_row_error() {
        let mut row = row("x");
        row.ops_code = None;
        let result = with_ctx(|ctx| ProcedureMapper.map(ctx, &row));
        assert!(matches!(result, Err(SyncError::Mapping(_))));
    }

    #[test]
    fn test_non_drug_procedure_has_no_medication() {
        let outcome = with_ctx(|ctx| MedicationMapper.map(ctx, &row("5-820.00"))).unwrap();
        assert_eq!(outcome, MapOutcome::Mapped(None));
    }

    #[test]
    fn test_unknown_drug_code_has_no_medication() {
        let outcome = with_ctx(|ctx| MedicationMapper.map(ctx, &row("6-001.h3"))).unwrap();
        assert_eq!(outcome, MapOutcome::Mapped(None));
    }

    #[test]
    fn test_drug_application_builds_medication_and_statement() {
        let resources = with_ctx(|ctx| MedicationMapper.map(ctx, &row("6-002.p3")))
            .unwrap()
            .ok()
            .flatten()
            .unwrap();
        let medication = resources.medication.body();
        let statement = resources.statement.ok().unwrap();
        let statement = statement.body();

        assert_eq!(medication["id"], "dic-eid-110_7_med");
        assert_eq!(medication["code"]["coding"][0]["code"], "J02AX04");
        // only Caspofungin has substance codes
        assert_eq!(medication["ingredient"].as_array().unwrap().len(), 1);
        assert_eq!(
            medication["ingredient"][0]["itemCodeableConcept"]["coding"][2]["code"],
            "162808-62-0"
        );

        assert_eq!(statement["id"], "dic-eid-110_7_med_stat");
        assert_eq!(statement["medicationReference"]["reference"], "Medication/dic-eid-110_7_med");
        assert_eq!(statement["context"]["reference"], "Encounter/dic-eid-110");
        assert_eq!(statement["status"], "active");
        let range = &statement["dosage"][0]["doseAndRate"][0]["doseRange"];
        assert_eq!(range["low"]["value"], 150.0);
        assert_eq!(range["high"]["code"], "mg");
    }

    #[test]
    fn test_ids_for_cancellation() {
        assert_eq!(procedure_id("e", 3), "e_3");
        assert_eq!(medication_statement_id("e", "3"), "e_3_med_stat");
        assert!(is_drug_application("6-002.p3"));
        assert!(!is_drug_application("5-820.00"));
    }
}
