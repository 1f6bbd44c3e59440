//! Main encounters (Fall) and department sub-encounters (Abteilungsfall)

use super::fhir::{
    coding, concept, fhir_datetime, meta_source, period, sha256_id, text, ACT_CODE, SOURCE_SAP,
    V2_0203,
};
use super::{MappingContext, RankedCondition, ResourceMapper};
use crate::adapters::source::rows::{DepartmentStay, EncounterRow};
use crate::domain::{MapOutcome, MappedResource, ResourceKey, ResourceType, Result};
use serde_json::{json, Value};

const DISCHARGE_DISPOSITION: &str = "http://terminology.hl7.org/CodeSystem/discharge-disposition";
const DIAGNOSIS_ROLE: &str = "http://terminology.hl7.org/CodeSystem/diagnosis-role";
const SERVICE_TYPE: &str = "http://terminology.hl7.org/CodeSystem/service-type";

const REQUIRED: &[&str] = &[
    "identifier.0.value",
    "class.code",
    "subject.reference",
    "period.start",
];
const SUB_REQUIRED: &[&str] = &[
    "identifier.0.value",
    "subject.reference",
    "partOf.reference",
    "serviceType.coding.0.code",
    "period.start",
];

fn inpatient() -> Value {
    coding(ACT_CODE, "IMP", Some("inpatient encounter"))
}

fn status(end: Option<chrono::NaiveDateTime>) -> Value {
    json!(if end.is_some() { "finished" } else { "in-progress" })
}

/// An encounter row together with the conditions mapped for it
#[derive(Debug, Clone, Copy)]
pub struct MainEncounter<'a> {
    pub row: &'a EncounterRow,
    /// Only valid conditions; each becomes a `diagnosis[]` entry
    pub conditions: &'a [RankedCondition],
}

pub struct EncounterMapper;

impl EncounterMapper {
    fn reason_extensions(ctx: &MappingContext<'_>, row: &EncounterRow) -> (Vec<Value>, Value) {
        let systems = ctx.systems;
        let mut extensions = Vec::new();
        let mut hospitalization = Value::Null;

        if let Some(code) = text(row.admission_reason.as_deref()) {
            let display = ctx.lookups.admission_display(code);
            extensions.push(json!({
                "url": systems.admission_reason_url,
                "valueCoding": coding(&systems.admission_reason, code, display.as_deref()),
            }));
        }

        if let Some(code) = text(row.discharge_reason.as_deref()) {
            let (display, reason) = ctx.lookups.discharge(code);
            extensions.push(json!({
                "url": systems.discharge_reason_url,
                "valueCodeableConcept": concept(vec![coding(
                    &systems.discharge_reason,
                    code,
                    display.as_deref(),
                )]),
            }));
            if let Some(reason) = reason {
                hospitalization = json!({
                    "dischargeDisposition": concept(vec![coding(
                        DISCHARGE_DISPOSITION,
                        &reason.disposition_code,
                        Some(&reason.disposition_display),
                    )]),
                });
            }
        }

        (extensions, hospitalization)
    }
}

impl<'a> ResourceMapper<MainEncounter<'a>> for EncounterMapper {
    type Output = MappedResource;

    fn map(
        &self,
        ctx: &MappingContext<'_>,
        input: &MainEncounter<'a>,
    ) -> Result<MapOutcome<MappedResource>> {
        let row = input.row;
        let key = ctx.ids.encounter_key()?;
        let patient = ctx.ids.patient_key()?;
        let (extensions, hospitalization) = Self::reason_extensions(ctx, row);

        let mut encounter = MappedResource::new(key.resource_type, key.id.clone())
            .with("meta", meta_source(SOURCE_SAP))
            .with(
                "identifier",
                json!([{
                    "use": "usual",
                    "system": ctx.systems.encounter_id,
                    "value": key.id.as_str(),
                    "assigner": { "reference": ctx.systems.assigner },
                    "type": concept(vec![coding(V2_0203, "VN", None)]),
                }]),
            )
            .with("class", inpatient())
            .with("status", status(row.discharge))
            .with_reference("subject", &patient)
            .with("period", period(row.admission, row.discharge));

        if !extensions.is_empty() {
            encounter.set("extension", Value::Array(extensions));
        }
        encounter.set("hospitalization", hospitalization);

        if !input.conditions.is_empty() {
            let use_billing = concept(vec![coding(DIAGNOSIS_ROLE, "billing", None)]);
            let diagnoses: Vec<Value> = input
                .conditions
                .iter()
                .map(|ranked| {
                    json!({
                        "condition": { "reference": ranked.condition.key().reference() },
                        "rank": ranked.rank,
                        "use": use_billing,
                    })
                })
                .collect();
            encounter.set("diagnosis", Value::Array(diagnoses));
            for (i, ranked) in input.conditions.iter().enumerate() {
                let index = i.to_string();
                encounter.record_reference(
                    &["diagnosis", &index, "condition", "reference"],
                    &ranked.condition.key(),
                );
            }
        }

        Ok(encounter.validate(REQUIRED))
    }
}

/// A department sub-encounter and the locations it visited
#[derive(Debug, Clone, PartialEq)]
pub struct SubEncounter {
    pub encounter: MappedResource,
    pub locations: Vec<MappedResource>,
    /// Unit stays whose Location could not be built
    pub invalid_locations: usize,
}

pub struct SubEncounterMapper;

impl SubEncounterMapper {
    fn location(ctx: &MappingContext<'_>, unit_name: &str) -> Result<MapOutcome<MappedResource>> {
        let id = sha256_id(&[unit_name])?;
        Ok(MappedResource::new(ResourceType::Location, id.clone())
            .with(
                "identifier",
                json!([{
                    "use": "usual",
                    "system": ctx.systems.location_id,
                    "value": id.as_str()
                }]),
            )
            .with("name", json!(text(Some(unit_name))))
            .validate(&["name"]))
    }
}

impl ResourceMapper<DepartmentStay> for SubEncounterMapper {
    type Output = SubEncounter;

    fn map(
        &self,
        ctx: &MappingContext<'_>,
        stay: &DepartmentStay,
    ) -> Result<MapOutcome<SubEncounter>> {
        let parent = ctx.ids.encounter_key()?;
        let patient = ctx.ids.patient_key()?;
        let begin = stay.begin();
        let end = stay.end();

        let begin_part = begin.map(|ts| ts.to_string()).unwrap_or_default();
        let end_part = end.map(|ts| ts.to_string()).unwrap_or_default();
        let id = sha256_id(&[
            parent.id.as_str(),
            patient.id.as_str(),
            &stay.department_code,
            &begin_part,
            &end_part,
        ])?;

        let mut locations = Vec::new();
        let mut stays = Vec::new();
        let mut invalid_locations = 0;
        for unit in &stay.units {
            match Self::location(ctx, &unit.unit_name)? {
                MapOutcome::Mapped(location) => {
                    let status = if unit.end.is_some() { "completed" } else { "active" };
                    stays.push((
                        location.key(),
                        json!({
                            "status": status,
                            "period": period(Some(unit.begin), unit.end),
                            "location": { "reference": location.key().reference() },
                        }),
                    ));
                    locations.push(location);
                }
                MapOutcome::Invalid(reason) => {
                    tracing::warn!(encounter = %parent.id, %reason, "Skipping invalid location");
                    invalid_locations += 1;
                }
            }
        }

        let service_code = text(Some(&stay.department_code));
        let mut encounter = MappedResource::new(ResourceType::Encounter, id.clone())
            .with("meta", meta_source(SOURCE_SAP))
            .with(
                "identifier",
                json!([{
                    "use": "usual",
                    "system": ctx.systems.subencounter_id,
                    "value": id.as_str()
                }]),
            )
            .with("status", status(end))
            .with("class", inpatient())
            .with_reference("subject", &patient)
            .with_reference("partOf", &parent)
            .with(
                "serviceType",
                service_code
                    .map(|code| {
                        concept(vec![coding(
                            SERVICE_TYPE,
                            code,
                            ctx.lookups.department_name(code),
                        )])
                    })
                    .unwrap_or(Value::Null),
            )
            .with("period", period(begin, end));

        if !stays.is_empty() {
            let refs: Vec<ResourceKey> = stays.iter().map(|(k, _)| k.clone()).collect();
            encounter.set(
                "location",
                Value::Array(stays.into_iter().map(|(_, v)| v).collect()),
            );
            for (i, target) in refs.iter().enumerate() {
                let index = i.to_string();
                encounter.record_reference(&["location", &index, "location", "reference"], target);
            }
        }

        Ok(encounter.validate(SUB_REQUIRED).map(|encounter| SubEncounter {
            encounter,
            locations,
            invalid_locations,
        }))
    }
}

/// Start of a sub-encounter as written to its period, for log lines
pub fn stay_label(stay: &DepartmentStay) -> String {
    match stay.begin() {
        Some(begin) => format!("{}@{}", stay.department_code, fhir_datetime(begin)),
        None => stay.department_code.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::source::rows::{DiagnosisRow, UnitStay};
    use crate::config::SystemsConfig;
    use crate::core::mapping::{ConditionMapper, LookupTables, Pseudonyms};
    use chrono::NaiveDateTime;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn row() -> EncounterRow {
        EncounterRow {
            encounter_id: 110,
            patient_id: 110,
            admission_reason: Some("0107".to_string()),
            discharge_reason: Some("079".to_string()),
            admission: Some(ts("2020-03-01 08:00:00")),
            discharge: Some(ts("2020-03-10 12:00:00")),
            ventilation_hours: Some(50.0),
            diagnoses: Vec::new(),
            departments: Vec::new(),
        }
    }

    fn stay() -> DepartmentStay {
        DepartmentStay {
            department_code: "0100".to_string(),
            units: vec![
                UnitStay {
                    unit_name: "ST01".to_string(),
                    begin: ts("2020-03-01 08:00:00"),
                    end: Some(ts("2020-03-05 08:00:00")),
                },
                UnitStay {
                    unit_name: "ST02".to_string(),
                    begin: ts("2020-03-05 08:00:00"),
                    end: None,
                },
            ],
        }
    }

    fn fixtures() -> (SystemsConfig, LookupTables, Pseudonyms) {
        (
            SystemsConfig::default(),
            LookupTables::default(),
            Pseudonyms::both("dic-pid-110", "dic-eid-110"),
        )
    }

    #[test]
    fn test_maps_main_encounter_with_reasons() {
        let (systems, lookups, ids) = fixtures();
        let ctx = MappingContext::new(&systems, &lookups, &ids);
        let row = row();
        let outcome = EncounterMapper
            .map(&ctx, &MainEncounter { row: &row, conditions: &[] })
            .unwrap();
        let encounter = outcome.ok().unwrap();
        let body = encounter.body();

        assert_eq!(body["id"], "dic-eid-110");
        assert_eq!(body["status"], "finished");
        assert_eq!(body["class"]["code"], "IMP");
        assert_eq!(body["identifier"][0]["type"]["coding"][0]["code"], "VN");
        assert_eq!(body["period"]["start"], "2020-03-01T08:00:00");
        assert_eq!(body["extension"].as_array().unwrap().len(), 2);
        assert_eq!(
            body["extension"][0]["valueCoding"]["display"],
            "Krankenhausbehandlung, vollstationär - Notfall"
        );
        assert_eq!(
            body["hospitalization"]["dischargeDisposition"]["coding"][0]["code"],
            "exp"
        );
        assert!(body.get("diagnosis").is_none());
    }

    #[test]
    fn test_open_encounter_is_in_progress() {
        let (systems, lookups, ids) = fixtures();
        let ctx = MappingContext::new(&systems, &lookups, &ids);
        let row = EncounterRow {
            discharge: None,
            discharge_reason: None,
            ..row()
        };
        let encounter = EncounterMapper
            .map(&ctx, &MainEncounter { row: &row, conditions: &[] })
            .unwrap()
            .ok()
            .unwrap();

        assert_eq!(encounter.body()["status"], "in-progress");
        assert!(encounter.body().get("hospitalization").is_none());
    }

    #[test]
    fn test_ranked_diagnoses_are_referenced() {
        let (systems, lookups, ids) = fixtures();
        let ctx = MappingContext::new(&systems, &lookups, &ids);
        let diagnosis = DiagnosisRow {
            encounter_id: 110,
            patient_id: 110,
            diagnosis_nr: 1,
            icd_code: Some("U07.1".to_string()),
            principal: true,
            ..Default::default()
        };
        let ranked = ConditionMapper.map(&ctx, &diagnosis).unwrap().ok().unwrap();
        let row = row();
        let conditions = [ranked];

        let encounter = EncounterMapper
            .map(&ctx, &MainEncounter { row: &row, conditions: &conditions })
            .unwrap()
            .ok()
            .unwrap();

        assert_eq!(
            encounter.body()["diagnosis"][0]["condition"]["reference"],
            "Condition/dic-eid-110_1"
        );
        assert_eq!(encounter.body()["diagnosis"][0]["rank"], 1);
        assert_eq!(encounter.body()["diagnosis"][0]["use"]["coding"][0]["code"], "billing");
        assert!(encounter
            .references()
            .iter()
            .any(|r| r.path == ["diagnosis", "0", "condition", "reference"]));
    }

    #[test]
    fn test_missing_admission_is_invalid() {
        let (systems, lookups, ids) = fixtures();
        let ctx = MappingContext::new(&systems, &lookups, &ids);
        let row = EncounterRow {
            admission: None,
            ..row()
        };
        let outcome = EncounterMapper
            .map(&ctx, &MainEncounter { row: &row, conditions: &[] })
            .unwrap();
        assert!(!outcome.is_valid());
    }

    #[test]
    fn test_sub_encounter_with_locations() {
        let (systems, lookups, ids) = fixtures();
        let ctx = MappingContext::new(&systems, &lookups, &ids);
        let sub = SubEncounterMapper.map(&ctx, &stay()).unwrap().ok().unwrap();
        let body = sub.encounter.body();

        assert_eq!(body["id"].as_str().unwrap().len(), 64);
        assert_eq!(body["partOf"]["reference"], "Encounter/dic-eid-110");
        assert_eq!(body["serviceType"]["coding"][0]["display"], "Innere Medizin");
        assert_eq!(body["status"], "in-progress");
        assert_eq!(body["location"][0]["status"], "completed");
        assert_eq!(body["location"][1]["status"], "active");
        assert_eq!(sub.locations.len(), 2);
        assert_eq!(sub.invalid_locations, 0);
        assert_eq!(sub.locations[0].body()["name"], "ST01");
        assert_eq!(
            body["location"][0]["location"]["reference"],
            sub.locations[0].key().reference()
        );
        // subject, partOf and one per location
        assert_eq!(sub.encounter.references().len(), 4);
    }

    #[test]
    fn test_sub_encounter_id_is_stable() {
        let (systems, lookups, ids) = fixtures();
        let ctx = MappingContext::new(&systems, &lookups, &ids);
        let a = SubEncounterMapper.map(&ctx, &stay()).unwrap().ok().unwrap();
        let b = SubEncounterMapper.map(&ctx, &stay()).unwrap().ok().unwrap();
        assert_eq!(a.encounter.id(), b.encounter.id());

        let mut other = stay();
        other.department_code = "1500".to_string();
        let c = SubEncounterMapper.map(&ctx, &other).unwrap().ok().unwrap();
        assert_ne!(a.encounter.id(), c.encounter.id());
    }

    #[test]
    fn test_blank_unit_name_is_invalid_location() {
        let (systems, lookups, ids) = fixtures();
        let ctx = MappingContext::new(&systems, &lookups, &ids);
        let mut stay = stay();
        stay.units[1].unit_name = " ".to_string();
        let sub = SubEncounterMapper.map(&ctx, &stay).unwrap().ok().unwrap();

        assert_eq!(sub.locations.len(), 1);
        assert_eq!(sub.invalid_locations, 1);
    }

    #[test]
    fn test_department_without_units_is_invalid() {
        let (systems, lookups, ids) = fixtures();
        let ctx = MappingContext::new(&systems, &lookups, &ids);
        let stay = DepartmentStay {
            department_code: "0100".to_string(),
            units: Vec::new(),
        };
        assert!(!SubEncounterMapper.map(&ctx, &stay).unwrap().is_valid());
        assert_eq!(stay_label(&stay), "0100");
    }
}
