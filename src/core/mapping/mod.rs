//! Source row to FHIR resource mappers
//!
//! Every mapper is a pure function of the row, the pseudonyms resolved for
//! it and the immutable [`LookupTables`]. A mapper returns
//! [`MapOutcome::Invalid`] when the produced resource misses a required
//! field, and `Err(SyncError::Mapping)` when the row itself lacks data the
//! mapper cannot do without. Both are counted invalid by the pass.
//!
//! ```rust
//! use fhir_inc_sync::adapters::source::rows::PatientRow;
//! use fhir_inc_sync::config::SystemsConfig;
//! use fhir_inc_sync::core::mapping::{
//!     LookupTables, MappingContext, PatientMapper, Pseudonyms, ResourceMapper,
//! };
//!
//! # fn example() -> fhir_inc_sync::domain::Result<()> {
//! let systems = SystemsConfig::default();
//! let lookups = LookupTables::default();
//! let ids = Pseudonyms::patient("dic-pid-110");
//! let ctx = MappingContext::new(&systems, &lookups, &ids);
//!
//! let row = PatientRow { patient_id: 110, sex: Some("w".into()), ..Default::default() };
//! let outcome = PatientMapper.map(&ctx, &row)?;
//! assert!(!outcome.is_valid()); // no birth date
//! # Ok(())
//! # }
//! ```

pub mod condition;
pub mod encounter;
pub mod fhir;
pub mod lab;
pub mod lookups;
pub mod lung_function;
pub mod observation;
pub mod patient;
pub mod procedure;

pub use condition::{ConditionMapper, RankedCondition};
pub use encounter::{EncounterMapper, MainEncounter, SubEncounter, SubEncounterMapper};
pub use lab::{LabInput, LabMapper};
pub use lookups::LookupTables;
pub use lung_function::{LungFunctionMapper, LungFunctionResources};
pub use observation::{DialysisMapper, IcuMapper, VentilationMapper};
pub use patient::PatientMapper;
pub use procedure::{MedicationMapper, MedicationResources, ProcedureMapper};

use crate::config::SystemsConfig;
use crate::domain::{MapOutcome, ResourceKey, ResourceType, Result, SyncError};

/// Pseudonyms resolved for one source row
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pseudonyms {
    pub patient: Option<String>,
    pub encounter: Option<String>,
}

impl Pseudonyms {
    pub fn patient(psn: impl Into<String>) -> Self {
        Self {
            patient: Some(psn.into()),
            encounter: None,
        }
    }

    pub fn both(patient: impl Into<String>, encounter: impl Into<String>) -> Self {
        Self {
            patient: Some(patient.into()),
            encounter: Some(encounter.into()),
        }
    }

    pub fn patient_psn(&self) -> Result<&str> {
        self.patient
            .as_deref()
            .ok_or_else(|| SyncError::Mapping("Patient pseudonym was not resolved".to_string()))
    }

    pub fn encounter_psn(&self) -> Result<&str> {
        self.encounter
            .as_deref()
            .ok_or_else(|| SyncError::Mapping("Encounter pseudonym was not resolved".to_string()))
    }

    pub fn patient_key(&self) -> Result<ResourceKey> {
        ResourceKey::parse(ResourceType::Patient, self.patient_psn()?).map_err(SyncError::Mapping)
    }

    pub fn encounter_key(&self) -> Result<ResourceKey> {
        ResourceKey::parse(ResourceType::Encounter, self.encounter_psn()?)
            .map_err(SyncError::Mapping)
    }
}

/// Everything a mapper may read besides the row
#[derive(Debug, Clone, Copy)]
pub struct MappingContext<'a> {
    pub systems: &'a SystemsConfig,
    pub lookups: &'a LookupTables,
    pub ids: &'a Pseudonyms,
}

impl<'a> MappingContext<'a> {
    pub fn new(systems: &'a SystemsConfig, lookups: &'a LookupTables, ids: &'a Pseudonyms) -> Self {
        Self {
            systems,
            lookups,
            ids,
        }
    }
}

/// Maps one input to FHIR resources
pub trait ResourceMapper<R> {
    type Output;

    fn map(&self, ctx: &MappingContext<'_>, input: &R) -> Result<MapOutcome<Self::Output>>;
}

/// Required source field, or a row-level mapping error
pub(crate) fn required<'v, T: ?Sized>(value: Option<&'v T>, what: &str) -> Result<&'v T> {
    value.ok_or_else(|| SyncError::Mapping(format!("Source row has no {what}")))
}
