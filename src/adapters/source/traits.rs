//! Change source abstraction

use super::rows::{
    DiagnosisCancel, DiagnosisRow, EncounterCancel, EncounterRow, LabRow, LungFunctionRow,
    PatientCancel, PatientRow, ProcedureCancel, ProcedureRow, TransferCancel, TransferRow,
};
use crate::domain::{ChangeRecord, Result, Window};
use async_trait::async_trait;
use std::convert::Infallible;

pub type PatientChange = ChangeRecord<PatientRow, PatientCancel>;
pub type EncounterChange = ChangeRecord<EncounterRow, EncounterCancel>;
pub type TransferChange = ChangeRecord<TransferRow, TransferCancel>;
pub type DiagnosisChange = ChangeRecord<DiagnosisRow, DiagnosisCancel>;
pub type ProcedureChange = ChangeRecord<ProcedureRow, ProcedureCancel>;
/// Lab results have no cancellation log
pub type LabChange = ChangeRecord<LabRow, Infallible>;
pub type LungFunctionChange = ChangeRecord<LungFunctionRow, Infallible>;

/// A slice of the ordered change sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

impl Page {
    pub fn first(limit: usize) -> Self {
        Self { offset: 0, limit }
    }

    pub fn next(&self) -> Self {
        Self {
            offset: self.offset + self.limit,
            limit: self.limit,
        }
    }
}

/// Extracts classified changes per entity
///
/// Every method returns one page of the window's change sequence. The
/// sequence lists upserts first, then cancellations newest first, each
/// group ordered by natural key, so consecutive pages never overlap.
#[async_trait]
pub trait ChangeSource: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    async fn test_connection(&self) -> Result<()>;

    async fn patients(&self, window: &Window, page: Page) -> Result<Vec<PatientChange>>;

    /// Encounter upserts arrive with their diagnoses and department stays
    async fn encounters(&self, window: &Window, page: Page) -> Result<Vec<EncounterChange>>;

    async fn transfers(&self, window: &Window, page: Page) -> Result<Vec<TransferChange>>;

    async fn diagnoses(&self, window: &Window, page: Page) -> Result<Vec<DiagnosisChange>>;

    async fn procedures(&self, window: &Window, page: Page) -> Result<Vec<ProcedureChange>>;

    async fn lab_results(&self, window: &Window, page: Page) -> Result<Vec<LabChange>>;

    /// `columns` are the measurement columns to read for every examination
    async fn lung_function(
        &self,
        window: &Window,
        page: Page,
        columns: &[String],
    ) -> Result<Vec<LungFunctionChange>>;
}
