//! In-memory change source
//!
//! Holds current-state rows and cancellation log entries with their
//! modification timestamps and answers page requests with the same join,
//! ordering and paging rules as the warehouse queries. Used for local runs
//! and tests.

use super::rows::{
    DiagnosisCancel, DiagnosisRow, EncounterCancel, EncounterRow, LabRow, LungFunctionRow,
    PatientCancel, PatientRow, ProcedureCancel, ProcedureRow, TransferCancel, TransferRow,
};
use super::traits::{
    ChangeSource, DiagnosisChange, EncounterChange, LabChange, LungFunctionChange, Page,
    PatientChange, ProcedureChange, TransferChange,
};
use crate::domain::{ChangeRecord, EntityKind, Result, Window};
use async_trait::async_trait;
use chrono::NaiveDateTime;

type Key = (i64, i64);

#[derive(Debug, Clone)]
struct Stamped<T> {
    at: NaiveDateTime,
    key: Key,
    source_id: String,
    row: T,
}

#[derive(Debug, Default)]
pub struct MemorySource {
    patients: Vec<Stamped<PatientRow>>,
    patient_cancels: Vec<Stamped<PatientCancel>>,
    encounters: Vec<Stamped<EncounterRow>>,
    encounter_cancels: Vec<Stamped<EncounterCancel>>,
    transfers: Vec<Stamped<TransferRow>>,
    transfer_cancels: Vec<Stamped<TransferCancel>>,
    diagnoses: Vec<Stamped<DiagnosisRow>>,
    diagnosis_cancels: Vec<Stamped<DiagnosisCancel>>,
    procedures: Vec<Stamped<ProcedureRow>>,
    procedure_cancels: Vec<Stamped<ProcedureCancel>>,
    lab_results: Vec<LabRow>,
    lung_function: Vec<LungFunctionRow>,
}

/// Current-state tables hold one row per key
fn put<T>(rows: &mut Vec<Stamped<T>>, item: Stamped<T>) {
    match rows.iter_mut().find(|r| r.key == item.key) {
        Some(existing) => *existing = item,
        None => rows.push(item),
    }
}

fn pair_id(a: i64, b: i64) -> String {
    format!("{a}/{b}")
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_patient(mut self, modified_at: NaiveDateTime, row: PatientRow) -> Self {
        put(
            &mut self.patients,
            Stamped {
                at: modified_at,
                key: (row.patient_id, 0),
                source_id: row.patient_id.to_string(),
                row,
            },
        );
        self
    }

    pub fn cancel_patient(mut self, stdat: NaiveDateTime, patnr: i64) -> Self {
        self.patient_cancels.push(Stamped {
            at: stdat,
            key: (patnr, 0),
            source_id: patnr.to_string(),
            row: PatientCancel {
                patnr: patnr.to_string(),
            },
        });
        self
    }

    /// The row carries its diagnoses and department stays
    pub fn with_encounter(mut self, modified_at: NaiveDateTime, row: EncounterRow) -> Self {
        put(
            &mut self.encounters,
            Stamped {
                at: modified_at,
                key: (row.encounter_id, 0),
                source_id: row.encounter_id.to_string(),
                row,
            },
        );
        self
    }

    pub fn cancel_encounter(mut self, stdat: NaiveDateTime, falnr: i64) -> Self {
        self.encounter_cancels.push(Stamped {
            at: stdat,
            key: (falnr, 0),
            source_id: falnr.to_string(),
            row: EncounterCancel {
                falnr: falnr.to_string(),
            },
        });
        self
    }

    pub fn with_transfer(
        mut self,
        modified_at: NaiveDateTime,
        event_nr: i64,
        row: TransferRow,
    ) -> Self {
        put(
            &mut self.transfers,
            Stamped {
                at: modified_at,
                key: (row.encounter_id, event_nr),
                source_id: row.encounter_id.to_string(),
                row,
            },
        );
        self
    }

    pub fn cancel_transfer(mut self, stdat: NaiveDateTime, falnr: i64, lfdnr: i64) -> Self {
        self.transfer_cancels.push(Stamped {
            at: stdat,
            key: (falnr, lfdnr),
            source_id: falnr.to_string(),
            row: TransferCancel {
                falnr: falnr.to_string(),
                lfdnr: Some(lfdnr.to_string()),
            },
        });
        self
    }

    pub fn with_diagnosis(mut self, modified_at: NaiveDateTime, row: DiagnosisRow) -> Self {
        put(
            &mut self.diagnoses,
            Stamped {
                at: modified_at,
                key: (row.encounter_id, row.diagnosis_nr),
                source_id: pair_id(row.encounter_id, row.diagnosis_nr),
                row,
            },
        );
        self
    }

    pub fn cancel_diagnosis(mut self, stdat: NaiveDateTime, falnr: i64, lfdnr: i64) -> Self {
        self.diagnosis_cancels.push(Stamped {
            at: stdat,
            key: (falnr, lfdnr),
            source_id: pair_id(falnr, lfdnr),
            row: DiagnosisCancel {
                falnr: falnr.to_string(),
                lfdnr: lfdnr.to_string(),
            },
        });
        self
    }

    pub fn with_procedure(mut self, modified_at: NaiveDateTime, row: ProcedureRow) -> Self {
        put(
            &mut self.procedures,
            Stamped {
                at: modified_at,
                key: (row.encounter_id, row.procedure_nr),
                source_id: pair_id(row.encounter_id, row.procedure_nr),
                row,
            },
        );
        self
    }

    pub fn cancel_procedure(
        mut self,
        stdat: NaiveDateTime,
        falnr: i64,
        lnric: i64,
        icpml: &str,
    ) -> Self {
        self.procedure_cancels.push(Stamped {
            at: stdat,
            key: (falnr, lnric),
            source_id: pair_id(falnr, lnric),
            row: ProcedureCancel {
                falnr: falnr.to_string(),
                lnric: lnric.to_string(),
                icpml: Some(icpml.to_string()),
            },
        });
        self
    }

    /// Windowed by `collected_at`
    pub fn with_lab_result(mut self, row: LabRow) -> Self {
        self.lab_results.push(row);
        self
    }

    /// A closed examination, windowed by `sent_at`
    pub fn with_lung_function(mut self, row: LungFunctionRow) -> Self {
        self.lung_function.push(row);
        self
    }
}

/// FULL OUTER JOIN of window upserts and window cancellations
///
/// Unmatched upserts come first ordered by key, followed by one cancellation
/// per joined row, newest first.
fn join<U: Clone, C: Clone>(
    entity: EntityKind,
    upserts: &[Stamped<U>],
    cancels: &[Stamped<C>],
    window: &Window,
) -> Vec<(Key, ChangeRecord<U, C>)> {
    let upserts: Vec<&Stamped<U>> = upserts.iter().filter(|u| window.contains(u.at)).collect();
    let cancels: Vec<&Stamped<C>> = cancels.iter().filter(|c| window.contains(c.at)).collect();

    let mut live: Vec<(Key, ChangeRecord<U, C>)> = upserts
        .iter()
        .filter(|u| !cancels.iter().any(|c| c.key == u.key))
        .map(|u| {
            (
                u.key,
                ChangeRecord::upsert(entity, u.source_id.clone(), u.row.clone()),
            )
        })
        .collect();
    live.sort_by_key(|(key, _)| *key);

    let mut canceled: Vec<(NaiveDateTime, Key, ChangeRecord<U, C>)> = Vec::new();
    for cancel in &cancels {
        let matches = upserts.iter().filter(|u| u.key == cancel.key).count().max(1);
        for _ in 0..matches {
            canceled.push((
                cancel.at,
                cancel.key,
                ChangeRecord::cancel(
                    entity,
                    cancel.source_id.clone(),
                    cancel.at,
                    cancel.row.clone(),
                ),
            ));
        }
    }
    canceled.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

    live.extend(canceled.into_iter().map(|(_, key, record)| (key, record)));
    live
}

fn paged<T>(items: impl IntoIterator<Item = T>, page: Page) -> Vec<T> {
    items
        .into_iter()
        .skip(page.offset)
        .take(page.limit)
        .collect()
}

fn records<U, C>(joined: Vec<(Key, ChangeRecord<U, C>)>, page: Page) -> Vec<ChangeRecord<U, C>> {
    paged(joined.into_iter().map(|(_, record)| record), page)
}

#[async_trait]
impl ChangeSource for MemorySource {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn test_connection(&self) -> Result<()> {
        Ok(())
    }

    async fn patients(&self, window: &Window, page: Page) -> Result<Vec<PatientChange>> {
        let joined = join(EntityKind::Patient, &self.patients, &self.patient_cancels, window);
        Ok(records(joined, page))
    }

    async fn encounters(&self, window: &Window, page: Page) -> Result<Vec<EncounterChange>> {
        let joined = join(
            EntityKind::Encounter,
            &self.encounters,
            &self.encounter_cancels,
            window,
        );
        Ok(records(joined, page))
    }

    async fn transfers(&self, window: &Window, page: Page) -> Result<Vec<TransferChange>> {
        let joined = join(
            EntityKind::Transfer,
            &self.transfers,
            &self.transfer_cancels,
            window,
        );

        // the event number is not selected, so equal encounter rows collapse
        let mut distinct: Vec<(Key, TransferChange)> = Vec::with_capacity(joined.len());
        for (key, record) in joined {
            let duplicate = distinct.iter().any(|(_, seen)| {
                seen.operation() == record.operation() && seen.change == record.change
            });
            if !duplicate {
                distinct.push((key, record));
            }
        }
        Ok(records(distinct, page))
    }

    async fn diagnoses(&self, window: &Window, page: Page) -> Result<Vec<DiagnosisChange>> {
        let joined = join(
            EntityKind::Diagnosis,
            &self.diagnoses,
            &self.diagnosis_cancels,
            window,
        );
        Ok(records(joined, page))
    }

    async fn procedures(&self, window: &Window, page: Page) -> Result<Vec<ProcedureChange>> {
        let joined = join(
            EntityKind::Procedure,
            &self.procedures,
            &self.procedure_cancels,
            window,
        );
        Ok(records(joined, page))
    }

    async fn lab_results(&self, window: &Window, page: Page) -> Result<Vec<LabChange>> {
        let mut rows: Vec<&LabRow> = self
            .lab_results
            .iter()
            .filter(|r| r.collected_at.is_some_and(|at| window.contains(at)))
            .filter(|r| r.loinc_code.as_deref().is_some_and(|c| c != "noLoinc"))
            .collect();
        rows.sort_by(|a, b| {
            a.encounter_id
                .cmp(&b.encounter_id)
                .then_with(|| a.result_id.cmp(&b.result_id))
        });

        Ok(paged(
            rows.into_iter().map(|r| {
                ChangeRecord::upsert(EntityKind::LabResult, r.result_id.clone(), r.clone())
            }),
            page,
        ))
    }

    async fn lung_function(
        &self,
        window: &Window,
        page: Page,
        columns: &[String],
    ) -> Result<Vec<LungFunctionChange>> {
        let mut rows: Vec<&LungFunctionRow> = self
            .lung_function
            .iter()
            .filter(|r| r.sent_at.is_some_and(|at| window.contains(at)))
            .collect();
        rows.sort_by(|a, b| a.examination_id.cmp(&b.examination_id));

        Ok(paged(
            rows.into_iter().map(|r| {
                let mut row = r.clone();
                row.measurements.retain(|name, _| columns.contains(name));
                ChangeRecord::upsert(EntityKind::LungFunction, row.examination_id.clone(), row)
            }),
            page,
        ))
    }
}
