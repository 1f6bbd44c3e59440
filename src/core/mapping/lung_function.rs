//! Lung-function examinations to DiagnosticReport plus grouped Observations
//!
//! Measurements are grouped by examination type. Plethysmography and
//! spirometry use the bronchodilation-specific codes only when both a pre
//! and a post measurement exist; a lone pre measurement uses the single
//! codes under the bare group key (`B_`, `SP_`).

use super::fhir::{
    coding, concept, fhir_datetime, opt_datetime, sha256_id, text, LOINC, SNOMED, UCUM,
};
use super::lookups::{LungFunctionGroup, LungFunctionParameter, LungFunctionPhase};
use super::{LookupTables, MappingContext, ResourceMapper};
use crate::adapters::source::rows::LungFunctionRow;
use crate::domain::resource::compact_object;
use crate::domain::{MapOutcome, MappedResource, ResourceType, Result};
use serde_json::{json, Value};

pub const SOURCE_LUNG_FUNCTION: &str = "#lufu-cwd";

const OPS_CLASSIFICATION: &str = "https://www.dimdi.de/static/de/klassifikationen/ops";
const I2B2: &str = "http://mdr.miracum.org";
const OBSERVATION_CATEGORY: &str = "http://terminology.hl7.org/CodeSystem/observation-category";

const REPORT_REQUIRED: &[&str] = &[
    "identifier.0.value",
    "code.coding.0.code",
    "effectiveDateTime",
    "subject.reference",
    "encounter.reference",
];
const OBSERVATION_REQUIRED: &[&str] = &[
    "code.coding.0.code",
    "component.0.code.coding.0.code",
    "subject.reference",
];

/// The report and the observations of one examination
#[derive(Debug, Clone, PartialEq)]
pub struct LungFunctionResources {
    pub report: MappedResource,
    pub observations: Vec<MapOutcome<MappedResource>>,
}

/// Which code set a group of measurements is coded with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Coding {
    /// Bronchodilation-specific codes
    Phased,
    /// Codes for a single measurement
    Single,
}

/// A group of measured parameters that becomes one Observation
#[derive(Debug)]
struct MeasuredGroup<'t> {
    key: String,
    coding: Coding,
    parameters: Vec<&'t LungFunctionParameter>,
}

pub struct LungFunctionMapper;

impl LungFunctionMapper {
    fn measured<'t>(
        ctx: &MappingContext<'t>,
        row: &LungFunctionRow,
        group: LungFunctionGroup,
        phase: LungFunctionPhase,
    ) -> Vec<&'t LungFunctionParameter> {
        let lookups: &'t LookupTables = ctx.lookups;
        lookups
            .lung_function
            .iter()
            .filter(|p| p.group == group && p.phase == phase)
            .filter(|p| row.measurement(&p.column).is_some_and(f64::is_finite))
            .collect()
    }

    fn groups<'t>(ctx: &MappingContext<'t>, row: &LungFunctionRow) -> Vec<MeasuredGroup<'t>> {
        let mut groups = Vec::new();

        for group in [LungFunctionGroup::Plethysmography, LungFunctionGroup::Spirometry] {
            let prefix = group.prefix();
            let pre = Self::measured(ctx, row, group, LungFunctionPhase::Pre);
            let post = Self::measured(ctx, row, group, LungFunctionPhase::Post);

            match (pre.is_empty(), post.is_empty()) {
                (false, true) => groups.push(MeasuredGroup {
                    key: format!("{prefix}_"),
                    coding: Coding::Single,
                    parameters: pre,
                }),
                (false, false) => groups.push(MeasuredGroup {
                    key: format!("{prefix}_PRE"),
                    coding: Coding::Phased,
                    parameters: pre,
                }),
                _ => {}
            }
            if !post.is_empty() {
                groups.push(MeasuredGroup {
                    key: format!("{prefix}_POST"),
                    coding: Coding::Phased,
                    parameters: post,
                });
            }
        }

        let diffusion = Self::measured(
            ctx,
            row,
            LungFunctionGroup::Diffusion,
            LungFunctionPhase::None,
        );
        if !diffusion.is_empty() {
            groups.push(MeasuredGroup {
                key: format!("{}_", LungFunctionGroup::Diffusion.prefix()),
                coding: Coding::Single,
                parameters: diffusion,
            });
        }

        groups
    }

    fn component(
        row: &LungFunctionRow,
        parameter: &LungFunctionParameter,
        set: Coding,
    ) -> Option<Value> {
        let value = row.measurement(&parameter.column)?;
        let (loinc, display, i2b2) = match set {
            Coding::Phased => (&parameter.loinc, &parameter.loinc_display, &parameter.i2b2),
            Coding::Single => (
                &parameter.loinc_single,
                &parameter.loinc_single_display,
                &parameter.i2b2_single,
            ),
        };

        let mut codings = Vec::new();
        if let Some(code) = loinc {
            let mut loinc = coding(LOINC, code, display.as_deref());
            loinc["version"] = json!("2.46");
            codings.push(loinc);
        }
        if let Some(code) = i2b2 {
            codings.push(json!({ "system": I2B2, "code": code, "version": "0.01" }));
        }
        if codings.is_empty() {
            return None;
        }

        let quantity = |value: f64| {
            json!({
                "value": value,
                "unit": parameter.unit,
                "system": UCUM,
                "code": parameter.unit
            })
        };
        let target = parameter
            .target_column
            .as_deref()
            .and_then(|column| row.measurement(column));

        Some(compact_object([
            ("code", concept(codings)),
            ("valueQuantity", quantity(value)),
            (
                "referenceRange",
                target
                    .map(|t| json!([{ "low": quantity(t), "high": quantity(t) }]))
                    .unwrap_or(Value::Null),
            ),
        ]))
    }

    fn observation(
        ctx: &MappingContext<'_>,
        row: &LungFunctionRow,
        report_parts: &[&str],
        group: &MeasuredGroup<'_>,
    ) -> Result<Option<MapOutcome<MappedResource>>> {
        let components: Vec<Value> = group
            .parameters
            .iter()
            .filter_map(|p| Self::component(row, p, group.coding))
            .collect();
        if components.is_empty() {
            return Ok(None);
        }

        let mut parts = report_parts.to_vec();
        parts.push(&group.key);
        let id = sha256_id(&parts)?;
        let code = ctx
            .lookups
            .lung_function_group(&group.key)
            .map(|g| concept(vec![coding(SNOMED, &g.code, Some(&g.display))]))
            .unwrap_or(Value::Null);

        let observation = MappedResource::new(ResourceType::Observation, id.clone())
            .with("meta", json!({ "source": SOURCE_LUNG_FUNCTION }))
            .with(
                "identifier",
                json!([{ "system": ctx.systems.lufu_id, "value": id.as_str() }]),
            )
            .with("status", json!("final"))
            .with(
                "category",
                json!([concept(vec![coding(OBSERVATION_CATEGORY, "exam", None)])]),
            )
            .with("code", code)
            .with_reference("encounter", &ctx.ids.encounter_key()?)
            .with_reference("subject", &ctx.ids.patient_key()?)
            .with("effectiveDateTime", opt_datetime(row.examined_at))
            .with("component", Value::Array(components));

        Ok(Some(observation.validate(OBSERVATION_REQUIRED)))
    }

    /// `Beurteilung`, `Anmerkung` and `Empfehlung` joined into one text
    pub fn conclusion(row: &LungFunctionRow) -> Option<String> {
        let mut conclusion = String::new();
        if let Some(assessment) = text(row.assessment.as_deref()) {
            conclusion.push_str(&format!("Beurteilung: {assessment}"));
        }
        if let Some(remark) = text(row.remark.as_deref()) {
            conclusion.push_str(&format!("|\n Anmerkung: {remark}"));
        }
        if let Some(recommendation) = text(row.recommendation.as_deref()) {
            conclusion.push_str(&format!(" |\n Empfehlung: {recommendation}"));
        }
        (!conclusion.is_empty()).then_some(conclusion)
    }
}

impl ResourceMapper<LungFunctionRow> for LungFunctionMapper {
    type Output = LungFunctionResources;

    fn map(
        &self,
        ctx: &MappingContext<'_>,
        row: &LungFunctionRow,
    ) -> Result<MapOutcome<LungFunctionResources>> {
        let encounter = ctx.ids.encounter_key()?;
        let patient = ctx.ids.patient_key()?;
        let examined = row.examined_at.map(fhir_datetime).unwrap_or_default();
        let report_parts = [
            encounter.id.as_str(),
            patient.id.as_str(),
            row.examination_id.as_str(),
            examined.as_str(),
        ];

        let mut observations = Vec::new();
        for group in Self::groups(ctx, row) {
            if let Some(outcome) = Self::observation(ctx, row, &report_parts, &group)? {
                observations.push(outcome);
            }
        }

        let report_id = sha256_id(&report_parts)?;
        let mut report = MappedResource::new(ResourceType::DiagnosticReport, report_id)
            .with(
                "meta",
                json!({ "source": SOURCE_LUNG_FUNCTION }),
            )
            .with(
                "identifier",
                json!([{
                    "use": "official",
                    "system": ctx.systems.lufu_id,
                    "value": text(Some(&row.examination_id)),
                }]),
            )
            .with("status", json!("final"))
            .with(
                "code",
                concept(vec![coding(
                    OPS_CLASSIFICATION,
                    "1-71",
                    Some("Pneumologische Funktionsuntersuchungen"),
                )]),
            )
            .with_reference("subject", &patient)
            .with_reference("encounter", &encounter)
            .with("effectiveDateTime", opt_datetime(row.examined_at))
            .with("conclusion", json!(Self::conclusion(row)));

        let results: Vec<_> = observations
            .iter()
            .filter_map(|o| match o {
                MapOutcome::Mapped(obs) => Some(obs.key()),
                MapOutcome::Invalid(_) => None,
            })
            .collect();
        if !results.is_empty() {
            report.set(
                "result",
                Value::Array(
                    results
                        .iter()
                        .map(|key| json!({ "reference": key.reference() }))
                        .collect(),
                ),
            );
            for (i, key) in results.iter().enumerate() {
                let index = i.to_string();
                report.record_reference(&["result", &index, "reference"], key);
            }
        }

        Ok(report
            .validate(REPORT_REQUIRED)
            .map(|report| LungFunctionResources {
                report,
                observations,
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SystemsConfig;
    use crate::core::mapping::{LookupTables, Pseudonyms};
    use chrono::NaiveDateTime;
    use std::collections::BTreeMap;

    fn row(measurements: &[(&str, f64)]) -> LungFunctionRow {
        LungFunctionRow {
            examination_id: "4711".to_string(),
            encounter_id: 110,
            patient_id: 110,
            examined_at: NaiveDateTime::parse_from_str("2020-03-03 09:15:00", "%Y-%m-%d %H:%M:%S")
                .ok(),
            sent_at: None,
            assessment: Some("Leichte Obstruktion".to_string()),
            remark: None,
            recommendation: Some("Kontrolle in 6 Monaten".to_string()),
            measurements: measurements
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    fn map(row: &LungFunctionRow) -> MapOutcome<LungFunctionResources> {
        let systems = SystemsConfig::default();
        let lookups = LookupTables::default();
        let ids = Pseudonyms::both("dic-pid-110", "dic-eid-110");
        LungFunctionMapper
            .map(&MappingContext::new(&systems, &lookups, &ids), row)
            .unwrap()
    }

    fn group_codes(resources: &LungFunctionResources) -> Vec<String> {
        resources
            .observations
            .iter()
            .filter_map(|o| o.clone().ok())
            .map(|o| o.body()["code"]["coding"][0]["code"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_pre_only_spirometry_uses_single_codes() {
        let resources = map(&row(&[("bp_vc_actual", 3.9), ("bp_vc_target", 4.2)]))
            .ok()
            .unwrap();

        assert_eq!(resources.observations.len(), 1);
        let obs = resources.observations[0].clone().ok().unwrap();
        let component = &obs.body()["component"][0];
        assert_eq!(obs.body()["code"]["coding"][0]["code"], "127783003");
        assert_eq!(component["code"]["coding"][0]["code"], "19866-3");
        assert_eq!(component["code"]["coding"][1]["code"], "LCS-MRCM:pul:vc:best");
        assert_eq!(component["valueQuantity"]["value"], 3.9);
        assert_eq!(component["referenceRange"][0]["low"]["value"], 4.2);
        assert_eq!(component["referenceRange"][0]["high"]["value"], 4.2);
    }

    #[test]
    fn test_pre_and_post_split_into_two_observations() {
        let resources = map(&row(&[("bp_fev1_actual", 2.1), ("bpl_fev1_actual", 2.4)]))
            .ok()
            .unwrap();

        assert_eq!(group_codes(&resources), vec!["127783003", "767906009"]);
        let pre = resources.observations[0].clone().ok().unwrap();
        let post = resources.observations[1].clone().ok().unwrap();
        assert_eq!(pre.body()["component"][0]["code"]["coding"][0]["code"], "20157-4");
        assert_eq!(post.body()["component"][0]["code"]["coding"][0]["code"], "20155-8");
        assert_ne!(pre.id(), post.id());
    }

    #[test]
    fn test_report_references_observations() {
        let resources = map(&row(&[("bp_tlc_actual", 6.1), ("bp_dlcosb_actual", 8.3)]))
            .ok()
            .unwrap();
        let body = resources.report.body();

        assert_eq!(resources.observations.len(), 2);
        assert_eq!(body["code"]["coding"][0]["code"], "1-71");
        assert_eq!(body["identifier"][0]["value"], "4711");
        assert_eq!(body["result"].as_array().unwrap().len(), 2);
        assert_eq!(
            body["conclusion"],
            "Beurteilung: Leichte Obstruktion |\n Empfehlung: Kontrolle in 6 Monaten"
        );
        assert_eq!(body["meta"]["source"], SOURCE_LUNG_FUNCTION);
        // subject, encounter and two results
        assert_eq!(resources.report.references().len(), 4);
    }

    #[test]
    fn test_no_measurements_yields_report_only() {
        let resources = map(&row(&[])).ok().unwrap();
        assert!(resources.observations.is_empty());
        assert!(resources.report.body().get("result").is_none());
    }

    #[test]
    fn test_parameter_without_codes_is_skipped() {
        // post inspiratory capacity only has an i2b2 code
        let resources = map(&row(&[("bpl_ic_actual", 2.0)])).ok().unwrap();
        let obs = resources.observations[0].clone().ok().unwrap();
        assert_eq!(obs.body()["component"][0]["code"]["coding"][0]["system"], I2B2);
    }

    #[test]
    fn test_report_ids_are_stable() {
        let a = map(&row(&[("bp_vc_actual", 3.9)])).ok().unwrap();
        let b = map(&row(&[("bp_vc_actual", 3.9)])).ok().unwrap();
        assert_eq!(a.report.id(), b.report.id());
        assert_eq!(a.report.id().as_str().len(), 64);
    }

    #[test]
    fn test_missing_examination_time_is_invalid() {
        let mut row = row(&[("bp_vc_actual", 3.9)]);
        row.examined_at = None;
        assert!(!map(&row).is_valid());
    }
}
