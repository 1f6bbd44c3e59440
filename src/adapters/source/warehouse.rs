//! Warehouse change source
//!
//! Every entity is read with one query that FULL OUTER JOINs the current
//! state rows modified in the window with the SAP cancellation log entries
//! (`stdat`) of the same window. A joined row with a cancellation timestamp
//! is a cancellation, whatever the upsert side holds.

use super::rows::{
    DepartmentStay, DiagnosisCancel, DiagnosisRow, EncounterCancel, EncounterRow, LabRow,
    LungFunctionRow, PatientCancel, PatientRow, ProcedureCancel, ProcedureRow, TransferCancel,
    TransferRow, UnitStay,
};
use super::traits::{
    ChangeSource, DiagnosisChange, EncounterChange, LabChange, LungFunctionChange, Page,
    PatientChange, ProcedureChange, TransferChange,
};
use crate::adapters::postgresql::PostgreSQLClient;
use crate::domain::{ChangeRecord, EntityKind, Result, SyncError, Window};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use regex::Regex;
use std::sync::Arc;
use tokio_postgres::types::FromSql;
use tokio_postgres::Row;

const PATIENT_CHANGES: &str = r#"
WITH ups AS (
    SELECT patient_id::bigint AS patient_id,
           patient_insurance_identifier::text AS insurance_id,
           patient_sex::text AS sex,
           patient_birthdate::date AS birth_date,
           patient_deceased_flag::text AS deceased_flag,
           patient_address_city::text AS city,
           patient_address_street::text AS street,
           patient_address_countrycode::text AS country,
           patient_address_zipcode::text AS postal_code,
           patient_lastname::text AS family_name,
           patient_firstname::text AS given_name
    FROM dwh.rf_med_cov_patient
    WHERE patient_last_update >= $1::timestamp AND patient_last_update < $2::timestamp),
del AS (
    SELECT stdat::timestamp AS stdat, patnr::text AS patnr
    FROM stg_sap.q_npat
    WHERE stdat >= $1::timestamp AND stdat < $2::timestamp)
SELECT ups.*, del.stdat, del.patnr
FROM ups
FULL OUTER JOIN del ON ups.patient_id = del.patnr::bigint
ORDER BY del.stdat DESC NULLS FIRST, COALESCE(ups.patient_id, del.patnr::bigint)
LIMIT $3 OFFSET $4"#;

const ENCOUNTER_CHANGES: &str = r#"
WITH ups AS (
    SELECT encounter_id::bigint AS encounter_id,
           patient_id::bigint AS patient_id,
           admission_event_reason::text AS admission_reason,
           discharge_event_reason::text AS discharge_reason,
           admission_timestamp::timestamp AS admission,
           discharge_timestamp::timestamp AS discharge,
           ventilation_hours::float8 AS ventilation_hours
    FROM dwh.rf_med_cov_encounter
    WHERE encounter_last_update >= $1::timestamp AND encounter_last_update < $2::timestamp),
del AS (
    SELECT stdat::timestamp AS stdat, falnr::text AS falnr
    FROM stg_sap.q_nfal
    WHERE stdat >= $1::timestamp AND stdat < $2::timestamp)
SELECT ups.*, del.stdat, del.falnr
FROM ups
FULL OUTER JOIN del ON ups.encounter_id = del.falnr::bigint
ORDER BY del.stdat DESC NULLS FIRST, COALESCE(ups.encounter_id, del.falnr::bigint)
LIMIT $3 OFFSET $4"#;

const ENCOUNTER_DIAGNOSES: &str = r#"
SELECT encounter_id::bigint AS encounter_id,
       patient_id::bigint AS patient_id,
       diagnosis_nr::bigint AS diagnosis_nr,
       icd_code::text AS icd_code,
       supplementary_icd_code::text AS supplementary_icd_code,
       icd_id::text AS icd_version,
       diagnosis_laterality::text AS laterality,
       COALESCE(principal_diagnosis_flag::int = 1, FALSE) AS principal,
       diagnosis_documentation_timestamp::timestamp AS documented_at
FROM dwh.rf_med_cov_diagnosis
WHERE encounter_id = $1
ORDER BY diagnosis_nr"#;

const ENCOUNTER_DEPARTMENTS: &str = r#"
SELECT unit.dept_p301_code::text AS department_code,
       unit.unit_name::text AS unit_name,
       trans.event_begin_timestamp::timestamp AS begin_at,
       trans.event_end_timestamp::timestamp AS end_at
FROM dwh.rf_med_cov_transfer trans
JOIN dwh.rd_med_cov_unit unit ON unit.unit_id = trans.event_unit_id
WHERE trans.encounter_id = $1 AND trans.event_begin_timestamp IS NOT NULL
ORDER BY unit.dept_p301_code, trans.event_begin_timestamp"#;

const TRANSFER_CHANGES: &str = r#"
WITH nbew AS (
    SELECT DISTINCT falnr, lfdnr
    FROM stg_sap.q_nbew
    WHERE GREATEST(updat, erdat) >= $1::timestamp AND GREATEST(updat, erdat) < $2::timestamp),
ups AS (
    SELECT trans.encounter_id::bigint AS encounter_id,
           trans.event_nr::bigint AS event_nr,
           enc.patient_id::bigint AS patient_id,
           enc.icu_days::float8 AS icu_days,
           enc.intercurrent_dialyses::bigint AS intercurrent_dialyses,
           enc.admission_timestamp::timestamp AS admission,
           enc.discharge_timestamp::timestamp AS discharge
    FROM dwh.rf_med_cov_transfer trans
    JOIN nbew ON trans.encounter_id = nbew.falnr::bigint AND trans.event_nr = nbew.lfdnr::bigint
    JOIN dwh.rf_med_cov_encounter enc ON enc.encounter_id = trans.encounter_id),
del AS (
    SELECT stdat::timestamp AS stdat, falnr::text AS falnr, lfdnr::text AS lfdnr
    FROM stg_sap.q_nbew
    WHERE stdat >= $1::timestamp AND stdat < $2::timestamp)
SELECT * FROM (
    SELECT DISTINCT ups.encounter_id, ups.patient_id, ups.icu_days, ups.intercurrent_dialyses,
           ups.admission, ups.discharge, del.stdat, del.falnr, del.lfdnr
    FROM ups
    FULL OUTER JOIN del
    ON ups.encounter_id = del.falnr::bigint AND ups.event_nr = del.lfdnr::bigint) changes
ORDER BY stdat DESC NULLS FIRST, COALESCE(encounter_id, falnr::bigint), lfdnr
LIMIT $3 OFFSET $4"#;

const DIAGNOSIS_CHANGES: &str = r#"
WITH ndia AS (
    SELECT DISTINCT falnr, lfdnr
    FROM stg_sap.q_ndia
    WHERE GREATEST(updat, erdat) >= $1::timestamp AND GREATEST(updat, erdat) < $2::timestamp),
ups AS (
    SELECT diag.encounter_id::bigint AS encounter_id,
           diag.patient_id::bigint AS patient_id,
           diag.diagnosis_nr::bigint AS diagnosis_nr,
           diag.icd_code::text AS icd_code,
           diag.supplementary_icd_code::text AS supplementary_icd_code,
           diag.icd_id::text AS icd_version,
           diag.diagnosis_laterality::text AS laterality,
           COALESCE(diag.principal_diagnosis_flag::int = 1, FALSE) AS principal,
           diag.diagnosis_documentation_timestamp::timestamp AS documented_at
    FROM dwh.rf_med_cov_diagnosis diag
    JOIN ndia ON diag.encounter_id = ndia.falnr::bigint AND diag.diagnosis_nr = ndia.lfdnr::bigint),
del AS (
    SELECT stdat::timestamp AS stdat, falnr::text AS falnr, lfdnr::text AS lfdnr
    FROM stg_sap.q_ndia
    WHERE stdat >= $1::timestamp AND stdat < $2::timestamp)
SELECT ups.*, del.stdat, del.falnr, del.lfdnr
FROM ups
FULL OUTER JOIN del
ON ups.encounter_id = del.falnr::bigint AND ups.diagnosis_nr = del.lfdnr::bigint
ORDER BY del.stdat DESC NULLS FIRST,
         COALESCE(ups.encounter_id, del.falnr::bigint),
         COALESCE(ups.diagnosis_nr, del.lfdnr::bigint)
LIMIT $3 OFFSET $4"#;

const PROCEDURE_CHANGES: &str = r#"
WITH nicp AS (
    SELECT DISTINCT falnr, lnric
    FROM stg_sap.q_nicp
    WHERE updat >= $1::timestamp AND updat < $2::timestamp),
ups AS (
    SELECT proc.encounter_id::bigint AS encounter_id,
           proc.patient_id::bigint AS patient_id,
           proc.procedure_nr::bigint AS procedure_nr,
           proc.ops_code::text AS ops_code,
           proc.ops_id::text AS ops_version,
           proc.procedure_laterality::text AS laterality,
           proc.procedure_begin_timestamp::timestamp AS begin_at,
           proc.procedure_end_timestamp::timestamp AS end_at
    FROM dwh.rf_med_cov_procedure proc
    JOIN nicp ON proc.encounter_id = nicp.falnr::bigint AND proc.procedure_nr = nicp.lnric::bigint),
del AS (
    SELECT stdat::timestamp AS stdat, falnr::text AS falnr, lnric::text AS lnric,
           icpml::text AS icpml
    FROM stg_sap.q_nicp
    WHERE stdat >= $1::timestamp AND stdat < $2::timestamp)
SELECT ups.*, del.stdat, del.falnr, del.lnric, del.icpml
FROM ups
FULL OUTER JOIN del
ON ups.encounter_id = del.falnr::bigint AND ups.procedure_nr = del.lnric::bigint
ORDER BY del.stdat DESC NULLS FIRST,
         COALESCE(ups.encounter_id, del.falnr::bigint),
         COALESCE(ups.procedure_nr, del.lnric::bigint)
LIMIT $3 OFFSET $4"#;

const LAB_RESULTS: &str = r#"
SELECT result_id::text AS result_id,
       encounter_id::bigint AS encounter_id,
       patient_id::bigint AS patient_id,
       loinc_code::text AS loinc_code,
       result_value_num::float8 AS value_num,
       result_value::text AS value_text,
       result_value_comparator::text AS comparator,
       result_unit::text AS unit,
       result_reference_low::float8 AS reference_low,
       result_reference_high::float8 AS reference_high,
       method_id::text AS method_id,
       result_interpretation_flag::text AS interpretation_flag,
       collection_timestamp::timestamp AS collected_at
FROM dwh.f_med_lab_result
WHERE collection_timestamp >= $1::timestamp AND collection_timestamp < $2::timestamp
  AND loinc_code <> 'noLoinc'
ORDER BY encounter_id, result_id
LIMIT $3 OFFSET $4"#;

/// Change source over the `dwh` and `stg_sap` schemas
pub struct WarehouseSource {
    client: Arc<PostgreSQLClient>,
}

impl WarehouseSource {
    pub fn new(client: Arc<PostgreSQLClient>) -> Self {
        Self { client }
    }

    async fn page(&self, sql: &str, window: &Window, page: Page) -> Result<Vec<Row>> {
        let start = window.start();
        let end = window.end();
        let limit = page.limit as i64;
        let offset = page.offset as i64;
        self.client
            .query(sql, &[&start, &end, &limit, &offset])
            .await
    }

    async fn encounter_diagnoses(&self, encounter_id: i64) -> Result<Vec<DiagnosisRow>> {
        self.client
            .query(ENCOUNTER_DIAGNOSES, &[&encounter_id])
            .await?
            .iter()
            .map(read_diagnosis)
            .collect()
    }

    async fn encounter_departments(&self, encounter_id: i64) -> Result<Vec<DepartmentStay>> {
        let rows = self
            .client
            .query(ENCOUNTER_DEPARTMENTS, &[&encounter_id])
            .await?;

        let mut departments: Vec<DepartmentStay> = Vec::new();
        for row in &rows {
            let department_code: String = column(row, "department_code")?;
            let unit = UnitStay {
                unit_name: column(row, "unit_name")?,
                begin: column(row, "begin_at")?,
                end: column(row, "end_at")?,
            };
            match departments.last_mut() {
                Some(stay) if stay.department_code == department_code => stay.units.push(unit),
                _ => departments.push(DepartmentStay {
                    department_code,
                    units: vec![unit],
                }),
            }
        }
        Ok(departments)
    }
}

#[async_trait]
impl ChangeSource for WarehouseSource {
    fn name(&self) -> &'static str {
        "warehouse"
    }

    async fn test_connection(&self) -> Result<()> {
        self.client.test_connection().await
    }

    async fn patients(&self, window: &Window, page: Page) -> Result<Vec<PatientChange>> {
        self.page(PATIENT_CHANGES, window, page)
            .await?
            .iter()
            .map(|row| {
                classify(
                    EntityKind::Patient,
                    row,
                    |row| {
                        let patient = read_patient(row)?;
                        Ok((patient.patient_id.to_string(), patient))
                    },
                    |row| {
                        let patnr: String = column(row, "patnr")?;
                        Ok((patnr.clone(), PatientCancel { patnr }))
                    },
                )
            })
            .collect()
    }

    async fn encounters(&self, window: &Window, page: Page) -> Result<Vec<EncounterChange>> {
        let rows = self.page(ENCOUNTER_CHANGES, window, page).await?;

        let mut changes = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut change = classify(
                EntityKind::Encounter,
                row,
                |row| {
                    let encounter = read_encounter(row)?;
                    Ok((encounter.encounter_id.to_string(), encounter))
                },
                |row| {
                    let falnr: String = column(row, "falnr")?;
                    Ok((falnr.clone(), EncounterCancel { falnr }))
                },
            )?;
            if let crate::domain::Change::Upsert(encounter) = &mut change.change {
                encounter.diagnoses = self.encounter_diagnoses(encounter.encounter_id).await?;
                encounter.departments =
                    self.encounter_departments(encounter.encounter_id).await?;
            }
            changes.push(change);
        }
        Ok(changes)
    }

    async fn transfers(&self, window: &Window, page: Page) -> Result<Vec<TransferChange>> {
        self.page(TRANSFER_CHANGES, window, page)
            .await?
            .iter()
            .map(|row| {
                classify(
                    EntityKind::Transfer,
                    row,
                    |row| {
                        let transfer = TransferRow {
                            encounter_id: column(row, "encounter_id")?,
                            patient_id: column(row, "patient_id")?,
                            icu_days: column(row, "icu_days")?,
                            intercurrent_dialyses: column(row, "intercurrent_dialyses")?,
                            admission: column(row, "admission")?,
                            discharge: column(row, "discharge")?,
                        };
                        Ok((transfer.encounter_id.to_string(), transfer))
                    },
                    |row| {
                        let falnr: String = column(row, "falnr")?;
                        let lfdnr: Option<String> = column(row, "lfdnr")?;
                        Ok((falnr.clone(), TransferCancel { falnr, lfdnr }))
                    },
                )
            })
            .collect()
    }

    async fn diagnoses(&self, window: &Window, page: Page) -> Result<Vec<DiagnosisChange>> {
        self.page(DIAGNOSIS_CHANGES, window, page)
            .await?
            .iter()
            .map(|row| {
                classify(
                    EntityKind::Diagnosis,
                    row,
                    |row| {
                        let diagnosis = read_diagnosis(row)?;
                        Ok((
                            format!("{}/{}", diagnosis.encounter_id, diagnosis.diagnosis_nr),
                            diagnosis,
                        ))
                    },
                    |row| {
                        let falnr: String = column(row, "falnr")?;
                        let lfdnr: String = column(row, "lfdnr")?;
                        Ok((format!("{falnr}/{lfdnr}"), DiagnosisCancel { falnr, lfdnr }))
                    },
                )
            })
            .collect()
    }

    async fn procedures(&self, window: &Window, page: Page) -> Result<Vec<ProcedureChange>> {
        self.page(PROCEDURE_CHANGES, window, page)
            .await?
            .iter()
            .map(|row| {
                classify(
                    EntityKind::Procedure,
                    row,
                    |row| {
                        let procedure = ProcedureRow {
                            encounter_id: column(row, "encounter_id")?,
                            patient_id: column(row, "patient_id")?,
                            procedure_nr: column(row, "procedure_nr")?,
                            ops_code: column(row, "ops_code")?,
                            ops_version: column(row, "ops_version")?,
                            laterality: column(row, "laterality")?,
                            begin: column(row, "begin_at")?,
                            end: column(row, "end_at")?,
                        };
                        Ok((
                            format!("{}/{}", procedure.encounter_id, procedure.procedure_nr),
                            procedure,
                        ))
                    },
                    |row| {
                        let falnr: String = column(row, "falnr")?;
                        let lnric: String = column(row, "lnric")?;
                        Ok((
                            format!("{falnr}/{lnric}"),
                            ProcedureCancel {
                                falnr,
                                lnric,
                                icpml: column(row, "icpml")?,
                            },
                        ))
                    },
                )
            })
            .collect()
    }

    async fn lab_results(&self, window: &Window, page: Page) -> Result<Vec<LabChange>> {
        self.page(LAB_RESULTS, window, page)
            .await?
            .iter()
            .map(|row| {
                let lab = LabRow {
                    result_id: column(row, "result_id")?,
                    encounter_id: column(row, "encounter_id")?,
                    patient_id: column(row, "patient_id")?,
                    loinc_code: column(row, "loinc_code")?,
                    value_num: column(row, "value_num")?,
                    value_text: column(row, "value_text")?,
                    comparator: column(row, "comparator")?,
                    unit: column(row, "unit")?,
                    reference_low: column(row, "reference_low")?,
                    reference_high: column(row, "reference_high")?,
                    method_id: column(row, "method_id")?,
                    interpretation_flag: column(row, "interpretation_flag")?,
                    collected_at: column(row, "collected_at")?,
                };
                Ok(ChangeRecord::upsert(
                    EntityKind::LabResult,
                    lab.result_id.clone(),
                    lab,
                ))
            })
            .collect()
    }

    async fn lung_function(
        &self,
        window: &Window,
        page: Page,
        columns: &[String],
    ) -> Result<Vec<LungFunctionChange>> {
        let sql = lung_function_query(columns)?;
        self.page(&sql, window, page)
            .await?
            .iter()
            .map(|row| {
                let mut examination = LungFunctionRow {
                    examination_id: column(row, "examination_id")?,
                    encounter_id: column(row, "encounter_id")?,
                    patient_id: column(row, "patient_id")?,
                    examined_at: column(row, "examined_at")?,
                    sent_at: column(row, "sent_at")?,
                    assessment: column(row, "assessment")?,
                    remark: column(row, "remark")?,
                    recommendation: column(row, "recommendation")?,
                    ..Default::default()
                };
                for name in columns {
                    if let Some(value) = column::<Option<f64>>(row, name)? {
                        examination.measurements.insert(name.clone(), value);
                    }
                }
                Ok(ChangeRecord::upsert(
                    EntityKind::LungFunction,
                    examination.examination_id.clone(),
                    examination,
                ))
            })
            .collect()
    }
}

/// Builds the lung-function query for the configured measurement columns
fn lung_function_query(columns: &[String]) -> Result<String> {
    let identifier = Regex::new(r"^[a-z_][a-z0-9_]*$")
        .map_err(|e| SyncError::Other(format!("Invalid identifier pattern: {e}")))?;

    let mut measurements = String::new();
    for name in columns {
        if !identifier.is_match(name) {
            return Err(SyncError::Configuration(format!(
                "Invalid lung-function column name: {name}"
            )));
        }
        measurements.push_str(&format!(",\n       lufu.{name}::float8 AS {name}"));
    }

    Ok(format!(
        r#"
SELECT lufu.untersuchung_id::text AS examination_id,
       lufu.encounter_id::bigint AS encounter_id,
       enc.patient_id::bigint AS patient_id,
       (lufu.untersuchungsdatum::date + lufu.untersuchungsuhrzeit::time) AS examined_at,
       lufu.sendedatum::timestamp AS sent_at,
       lufu.beurteilung::text AS assessment,
       lufu.anmerkung::text AS remark,
       lufu.empfehlung::text AS recommendation{measurements}
FROM dwh.f_med_din_lungenfunktion lufu
JOIN dwh.rf_med_cov_encounter enc ON enc.encounter_id = lufu.encounter_id::bigint
WHERE lufu.sendedatum >= $1::timestamp AND lufu.sendedatum < $2::timestamp
  AND lufu.untersuchung_status = 'geschlossen'
ORDER BY lufu.untersuchung_id
LIMIT $3 OFFSET $4"#
    ))
}

fn classify<U, C>(
    entity: EntityKind,
    row: &Row,
    read_upsert: impl FnOnce(&Row) -> Result<(String, U)>,
    read_cancel: impl FnOnce(&Row) -> Result<(String, C)>,
) -> Result<ChangeRecord<U, C>> {
    match column::<Option<NaiveDateTime>>(row, "stdat")? {
        Some(canceled_at) => {
            let (source_id, payload) = read_cancel(row)?;
            Ok(ChangeRecord::cancel(entity, source_id, canceled_at, payload))
        }
        None => {
            let (source_id, upsert) = read_upsert(row)?;
            Ok(ChangeRecord::upsert(entity, source_id, upsert))
        }
    }
}

fn column<'a, T: FromSql<'a>>(row: &'a Row, name: &str) -> Result<T> {
    row.try_get(name)
        .map_err(|e| SyncError::Database(format!("Failed to read column '{name}': {e}")))
}

fn read_patient(row: &Row) -> Result<PatientRow> {
    let deceased: Option<String> = column(row, "deceased_flag")?;
    Ok(PatientRow {
        patient_id: column(row, "patient_id")?,
        insurance_id: column(row, "insurance_id")?,
        sex: column(row, "sex")?,
        birth_date: column(row, "birth_date")?,
        deceased: deceased.as_deref().is_some_and(is_truthy_flag),
        city: column(row, "city")?,
        street: column(row, "street")?,
        country: column(row, "country")?,
        postal_code: column(row, "postal_code")?,
        family_name: column(row, "family_name")?,
        given_name: column(row, "given_name")?,
    })
}

fn read_encounter(row: &Row) -> Result<EncounterRow> {
    Ok(EncounterRow {
        encounter_id: column(row, "encounter_id")?,
        patient_id: column(row, "patient_id")?,
        admission_reason: column(row, "admission_reason")?,
        discharge_reason: column(row, "discharge_reason")?,
        admission: column(row, "admission")?,
        discharge: column(row, "discharge")?,
        ventilation_hours: column(row, "ventilation_hours")?,
        diagnoses: Vec::new(),
        departments: Vec::new(),
    })
}

fn read_diagnosis(row: &Row) -> Result<DiagnosisRow> {
    Ok(DiagnosisRow {
        encounter_id: column(row, "encounter_id")?,
        patient_id: column(row, "patient_id")?,
        diagnosis_nr: column(row, "diagnosis_nr")?,
        icd_code: column(row, "icd_code")?,
        supplementary_icd_code: column(row, "supplementary_icd_code")?,
        icd_version: column(row, "icd_version")?,
        laterality: column(row, "laterality")?,
        principal: column(row, "principal")?,
        documented_at: column(row, "documented_at")?,
    })
}

/// SAP flags arrive as `X`, `1`, `true` and similar
fn is_truthy_flag(flag: &str) -> bool {
    !matches!(
        flag.trim().to_ascii_lowercase().as_str(),
        "" | "0" | "n" | "no" | "f" | "false"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_windows_are_half_open_in_every_query() {
        for sql in [
            PATIENT_CHANGES,
            ENCOUNTER_CHANGES,
            TRANSFER_CHANGES,
            DIAGNOSIS_CHANGES,
            PROCEDURE_CHANGES,
            LAB_RESULTS,
        ] {
            assert!(sql.contains(">= $1::timestamp"), "{sql}");
            assert!(sql.contains("< $2::timestamp"), "{sql}");
            assert!(!sql.contains("> $1"), "{sql}");
            assert!(sql.contains("LIMIT $3 OFFSET $4"), "{sql}");
        }
    }

    #[test]
    fn test_change_queries_put_upserts_first() {
        for sql in [
            PATIENT_CHANGES,
            ENCOUNTER_CHANGES,
            TRANSFER_CHANGES,
            DIAGNOSIS_CHANGES,
            PROCEDURE_CHANGES,
        ] {
            assert!(sql.contains("FULL OUTER JOIN"), "{sql}");
            assert!(sql.contains("stdat DESC NULLS FIRST"), "{sql}");
        }
    }

    #[test]
    fn test_lung_function_query_lists_columns() {
        let sql =
            lung_function_query(&["bp_vc_actual".to_string(), "bp_vc_target".to_string()])
                .unwrap();
        assert!(sql.contains("lufu.bp_vc_actual::float8 AS bp_vc_actual"));
        assert!(sql.contains("lufu.bp_vc_target::float8 AS bp_vc_target"));
        assert!(sql.contains("untersuchung_status = 'geschlossen'"));
    }

    #[test]
    fn test_lung_function_query_rejects_injection() {
        let result = lung_function_query(&["bp_vc_actual; DROP TABLE x".to_string()]);
        assert!(matches!(result, Err(SyncError::Configuration(_))));
    }

    #[test]
    fn test_truthy_flags() {
        assert!(is_truthy_flag("X"));
        assert!(is_truthy_flag("1"));
        assert!(is_truthy_flag("true"));
        assert!(!is_truthy_flag(""));
        assert!(!is_truthy_flag("0"));
        assert!(!is_truthy_flag("N"));
    }
}
