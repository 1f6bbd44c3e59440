//! Typed warehouse rows
//!
//! One struct per upsert side and one per cancellation side. Optional
//! columns stay `Option`; whether a missing value is fatal is decided by the
//! mappers.

use chrono::{NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;

/// `dwh.rf_med_cov_patient`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PatientRow {
    pub patient_id: i64,
    pub insurance_id: Option<String>,
    pub sex: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub deceased: bool,
    pub city: Option<String>,
    pub street: Option<String>,
    pub country: Option<String>,
    pub postal_code: Option<String>,
    pub family_name: Option<String>,
    pub given_name: Option<String>,
}

/// `stg_sap.q_npat`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatientCancel {
    pub patnr: String,
}

/// `dwh.rf_med_cov_encounter`, enriched with its diagnoses and department stays
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EncounterRow {
    pub encounter_id: i64,
    pub patient_id: i64,
    pub admission_reason: Option<String>,
    pub discharge_reason: Option<String>,
    pub admission: Option<NaiveDateTime>,
    pub discharge: Option<NaiveDateTime>,
    pub ventilation_hours: Option<f64>,
    pub diagnoses: Vec<DiagnosisRow>,
    pub departments: Vec<DepartmentStay>,
}

/// Consecutive unit stays of an encounter within one §301 department
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DepartmentStay {
    pub department_code: String,
    /// Ordered by begin
    pub units: Vec<UnitStay>,
}

impl DepartmentStay {
    pub fn begin(&self) -> Option<NaiveDateTime> {
        self.units.first().map(|u| u.begin)
    }

    pub fn end(&self) -> Option<NaiveDateTime> {
        self.units.last().and_then(|u| u.end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitStay {
    pub unit_name: String,
    pub begin: NaiveDateTime,
    pub end: Option<NaiveDateTime>,
}

/// `stg_sap.q_nfal`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncounterCancel {
    pub falnr: String,
}

/// Encounter-level values of a transfer (`rf_med_cov_transfer` joined with
/// its encounter)
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TransferRow {
    pub encounter_id: i64,
    pub patient_id: i64,
    pub icu_days: Option<f64>,
    pub intercurrent_dialyses: Option<i64>,
    pub admission: Option<NaiveDateTime>,
    pub discharge: Option<NaiveDateTime>,
}

/// `stg_sap.q_nbew`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferCancel {
    pub falnr: String,
    pub lfdnr: Option<String>,
}

/// `dwh.rf_med_cov_diagnosis`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DiagnosisRow {
    pub encounter_id: i64,
    pub patient_id: i64,
    pub diagnosis_nr: i64,
    pub icd_code: Option<String>,
    pub supplementary_icd_code: Option<String>,
    pub icd_version: Option<String>,
    pub laterality: Option<String>,
    pub principal: bool,
    pub documented_at: Option<NaiveDateTime>,
}

/// `stg_sap.q_ndia`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosisCancel {
    pub falnr: String,
    pub lfdnr: String,
}

/// `dwh.rf_med_cov_procedure`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProcedureRow {
    pub encounter_id: i64,
    pub patient_id: i64,
    pub procedure_nr: i64,
    pub ops_code: Option<String>,
    pub ops_version: Option<String>,
    pub laterality: Option<String>,
    pub begin: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
}

/// `stg_sap.q_nicp`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcedureCancel {
    pub falnr: String,
    pub lnric: String,
    /// OPS code of the canceled procedure
    pub icpml: Option<String>,
}

impl ProcedureCancel {
    /// Drug applications (OPS chapter 6) were mapped to a MedicationStatement
    pub fn is_drug_application(&self) -> bool {
        self.icpml.as_deref().is_some_and(|c| c.starts_with('6'))
    }
}

/// `dwh.f_med_lab_result`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LabRow {
    pub result_id: String,
    pub encounter_id: i64,
    pub patient_id: i64,
    pub loinc_code: Option<String>,
    pub value_num: Option<f64>,
    pub value_text: Option<String>,
    pub comparator: Option<String>,
    pub unit: Option<String>,
    pub reference_low: Option<f64>,
    pub reference_high: Option<f64>,
    pub method_id: Option<String>,
    pub interpretation_flag: Option<String>,
    pub collected_at: Option<NaiveDateTime>,
}

/// A closed examination of `dwh.f_med_din_lungenfunktion`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LungFunctionRow {
    pub examination_id: String,
    pub encounter_id: i64,
    pub patient_id: i64,
    pub examined_at: Option<NaiveDateTime>,
    pub sent_at: Option<NaiveDateTime>,
    pub assessment: Option<String>,
    pub remark: Option<String>,
    pub recommendation: Option<String>,
    /// Measured values by source column, e.g. `bp_vc_actual`
    pub measurements: BTreeMap<String, f64>,
}

impl LungFunctionRow {
    pub fn measurement(&self, column: &str) -> Option<f64> {
        self.measurements.get(column).copied()
    }
}
