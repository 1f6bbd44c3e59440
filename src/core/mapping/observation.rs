//! Encounter-level observations: ventilation, intercurrent dialysis and ICU days
//!
//! Ids are derived from the encounter pseudonym only, so a cancellation can
//! address them without the row that produced them.

use super::fhir::{coding, fhir_id, meta_source, period, round2, LOINC, SOURCE_SAP, UCUM};
use super::{MappingContext, ResourceMapper};
use crate::adapters::source::rows::{EncounterRow, TransferRow};
use crate::domain::{MapOutcome, MappedResource, ResourceType, Result};
use chrono::NaiveDateTime;
use serde_json::{json, Value};

pub const VENTILATION_SUFFIX: &str = "vent";
pub const DIALYSIS_SUFFIX: &str = "dia";
pub const ICU_SUFFIX: &str = "icu";

const MIRACUM_OBSERVATIONS: &str = "https://miracum.org/fhir/CodeSystem/core/observations";

const REQUIRED: &[&str] = &[
    "identifier.0.value",
    "status",
    "code.coding.0.code",
    "subject.reference",
    "encounter.reference",
];

pub fn ventilation_id(encounter_psn: &str) -> String {
    format!("{encounter_psn}_{VENTILATION_SUFFIX}")
}

pub fn dialysis_id(encounter_psn: &str) -> String {
    format!("{encounter_psn}_{DIALYSIS_SUFFIX}")
}

pub fn icu_id(encounter_psn: &str) -> String {
    format!("{encounter_psn}_{ICU_SUFFIX}")
}

fn days(value: f64) -> Value {
    json!({ "value": round2(value), "unit": "d", "system": UCUM, "code": "d" })
}

/// Observation skeleton shared by the three encounter observations
fn encounter_observation(
    ctx: &MappingContext<'_>,
    id: String,
    code: Value,
    text: &str,
    admission: Option<NaiveDateTime>,
    discharge: Option<NaiveDateTime>,
) -> Result<MappedResource> {
    let encounter = ctx.ids.encounter_key()?;
    let patient = ctx.ids.patient_key()?;

    // the period ends only once the encounter has started
    let end = admission.and(discharge);
    let status = if end.is_some() { "final" } else { "preliminary" };

    Ok(MappedResource::new(ResourceType::Observation, fhir_id(id.clone())?)
        .with("meta", meta_source(SOURCE_SAP))
        .with(
            "identifier",
            json!([{ "system": ctx.systems.p21_observation_id, "value": id }]),
        )
        .with("status", json!(status))
        .with("code", json!({ "coding": [code], "text": text }))
        .with_reference("encounter", &encounter)
        .with_reference("subject", &patient)
        .with("effectivePeriod", period(admission, end)))
}

/// Days on ventilator, one per main encounter
pub struct VentilationMapper;

impl ResourceMapper<EncounterRow> for VentilationMapper {
    type Output = MappedResource;

    fn map(
        &self,
        ctx: &MappingContext<'_>,
        row: &EncounterRow,
    ) -> Result<MapOutcome<MappedResource>> {
        let observation = encounter_observation(
            ctx,
            ventilation_id(ctx.ids.encounter_psn()?),
            coding(LOINC, "74201-5", Some("Days on Ventilator")),
            "Days on Ventilator",
            row.admission,
            row.discharge,
        )?
        .with(
            "valueQuantity",
            row.ventilation_hours
                .map(|hours| days(hours.trunc() / 24.0))
                .unwrap_or(Value::Null),
        );

        Ok(observation.validate(REQUIRED))
    }
}

/// Count of intercurrent dialyses
pub struct DialysisMapper;

impl ResourceMapper<TransferRow> for DialysisMapper {
    type Output = MappedResource;

    fn map(
        &self,
        ctx: &MappingContext<'_>,
        row: &TransferRow,
    ) -> Result<MapOutcome<MappedResource>> {
        let observation = encounter_observation(
            ctx,
            dialysis_id(ctx.ids.encounter_psn()?),
            coding(
                MIRACUM_OBSERVATIONS,
                "intercurrent-dialysis",
                Some("Intercurrent dialysis"),
            ),
            "Intercurrent dialysis",
            row.admission,
            row.discharge,
        )?
        .with("valueInteger", json!(row.intercurrent_dialyses));

        Ok(observation.validate(REQUIRED))
    }
}

/// Days in intensive care
pub struct IcuMapper;

impl ResourceMapper<TransferRow> for IcuMapper {
    type Output = MappedResource;

    fn map(
        &self,
        ctx: &MappingContext<'_>,
        row: &TransferRow,
    ) -> Result<MapOutcome<MappedResource>> {
        let mut code = coding(LOINC, "74200-7", Some("Days in intensive care unit"));
        code["version"] = json!("2.46");

        let observation = encounter_observation(
            ctx,
            icu_id(ctx.ids.encounter_psn()?),
            code,
            "Days in intensive care unit",
            row.admission,
            row.discharge,
        )?
        .with(
            "valueQuantity",
            row.icu_days.map(days).unwrap_or(Value::Null),
        );

        Ok(observation.validate(REQUIRED))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SystemsConfig;
    use crate::core::mapping::{LookupTables, Pseudonyms};

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn with_ctx<T>(f: impl FnOnce(&MappingContext<'_>) -> T) -> T {
        let systems = SystemsConfig::default();
        let lookups = LookupTables::default();
        let ids = Pseudonyms::both("dic-pid-110", "dic-eid-110");
        f(&MappingContext::new(&systems, &lookups, &ids))
    }

    fn transfer() -> TransferRow {
        TransferRow {
            encounter_id: 110,
            patient_id: 110,
            icu_days: Some(3.456),
            intercurrent_dialyses: Some(2),
            admission: Some(ts("2020-03-01 08:00:00")),
            discharge: None,
        }
    }

    #[test]
    fn test_ventilation_days() {
        let row = EncounterRow {
            encounter_id: 110,
            patient_id: 110,
            admission: Some(ts("2020-03-01 08:00:00")),
            discharge: Some(ts("2020-03-10 08:00:00")),
            ventilation_hours: Some(50.7),
            ..Default::default()
        };
        let obs = with_ctx(|ctx| VentilationMapper.map(ctx, &row))
            .unwrap()
            .ok()
            .unwrap();
        let body = obs.body();

        assert_eq!(body["id"], "dic-eid-110_vent");
        assert_eq!(body["code"]["coding"][0]["code"], "74201-5");
        assert_eq!(body["valueQuantity"]["value"], 2.08);
        assert_eq!(body["status"], "final");
        assert_eq!(body["effectivePeriod"]["end"], "2020-03-10T08:00:00");
    }

    #[test]
    fn test_ventilation_without_hours_has_no_value() {
        let row = EncounterRow {
            encounter_id: 110,
            patient_id: 110,
            ..Default::default()
        };
        let obs = with_ctx(|ctx| VentilationMapper.map(ctx, &row))
            .unwrap()
            .ok()
            .unwrap();

        assert!(obs.body().get("valueQuantity").is_none());
        assert!(obs.body().get("effectivePeriod").is_none());
        assert_eq!(obs.body()["status"], "preliminary");
    }

    #[test]
    fn test_dialysis_and_icu_share_encounter_period() {
        let row = transfer();
        let (dia, icu) = with_ctx(|ctx| {
            (
                DialysisMapper.map(ctx, &row).unwrap().ok().unwrap(),
                IcuMapper.map(ctx, &row).unwrap().ok().unwrap(),
            )
        });

        assert_eq!(dia.id().as_str(), "dic-eid-110_dia");
        assert_eq!(dia.body()["valueInteger"], 2);
        assert_eq!(dia.body()["status"], "preliminary");
        assert_eq!(icu.id().as_str(), "dic-eid-110_icu");
        assert_eq!(icu.body()["valueQuantity"]["value"], 3.46);
        assert_eq!(icu.body()["code"]["coding"][0]["version"], "2.46");
        assert_eq!(dia.body()["effectivePeriod"], icu.body()["effectivePeriod"]);
    }

    #[test]
    fn test_mapped_observations_match_their_read_back_category() {
        use crate::core::sync::stats::ReadBackCategory;

        let row = transfer();
        let encounter = EncounterRow {
            encounter_id: 110,
            patient_id: 110,
            ventilation_hours: Some(12.0),
            ..Default::default()
        };
        let (vent, dia, icu) = with_ctx(|ctx| {
            (
                VentilationMapper.map(ctx, &encounter).unwrap().ok().unwrap(),
                DialysisMapper.map(ctx, &row).unwrap().ok().unwrap(),
                IcuMapper.map(ctx, &row).unwrap().ok().unwrap(),
            )
        });

        for (category, obs) in [
            (ReadBackCategory::Ventilation, &vent),
            (ReadBackCategory::Dialysis, &dia),
            (ReadBackCategory::Icu, &icu),
        ] {
            assert_eq!(obs.body()["meta"]["source"], SOURCE_SAP);
            assert!(category.matches(ResourceType::Observation, obs.body()));
        }
        assert!(!ReadBackCategory::Icu.matches(ResourceType::Observation, dia.body()));
    }

    #[test]
    fn test_discharge_without_admission_is_not_final() {
        let row = TransferRow {
            admission: None,
            discharge: Some(ts("2020-03-10 08:00:00")),
            ..transfer()
        };
        let icu = with_ctx(|ctx| IcuMapper.map(ctx, &row)).unwrap().ok().unwrap();
        assert_eq!(icu.body()["status"], "preliminary");
        assert!(icu.body().get("effectivePeriod").is_none());
    }

    #[test]
    fn test_cancel_ids_match_mapped_ids() {
        assert_eq!(ventilation_id("e1"), "e1_vent");
        assert_eq!(dialysis_id("e1"), "e1_dia");
        assert_eq!(icu_id("e1"), "e1_icu");
    }
}
