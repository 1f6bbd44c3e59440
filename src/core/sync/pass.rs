//! Entity passes
//!
//! A pass drains one entity's change feed for the window, maps upserts,
//! turns cancellations into cancellation requests, delivers the resulting
//! bundle in one call and reads the counts back from the sink.

use super::feed::ChangeFeed;
use super::stats::{PassStats, ReadBackCategory};
use crate::adapters::gpas::IdentifierResolver;
use crate::adapters::loinc::{LabQuantity, UnitConverter};
use crate::adapters::sink::ResourceSink;
use crate::adapters::source::rows::{EncounterRow, LabRow};
use crate::adapters::source::ChangeSource;
use crate::config::SystemsConfig;
use crate::core::bundle::Bundle;
use crate::core::mapping::condition::condition_id;
use crate::core::mapping::encounter::stay_label;
use crate::core::mapping::observation::{dialysis_id, icu_id, ventilation_id};
use crate::core::mapping::procedure::{medication_statement_id, procedure_id};
use crate::core::mapping::{
    ConditionMapper, DialysisMapper, EncounterMapper, IcuMapper, LabInput, LabMapper,
    LookupTables, LungFunctionMapper, MainEncounter, MappingContext, MedicationMapper,
    PatientMapper, ProcedureMapper, Pseudonyms, ResourceMapper, SubEncounterMapper,
    VentilationMapper,
};
use crate::domain::{
    Change, ChangeRecord, EntityKind, FhirId, MapOutcome, MappedResource, ResourceType, Result,
    SyncError, Window,
};
use crate::{log_pass_complete, log_pass_start, log_page_processing};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

const PATIENT: ReadBackCategory = ReadBackCategory::Resource(ResourceType::Patient);
const ENCOUNTER: ReadBackCategory = ReadBackCategory::Resource(ResourceType::Encounter);
const CONDITION: ReadBackCategory = ReadBackCategory::Resource(ResourceType::Condition);
const LOCATION: ReadBackCategory = ReadBackCategory::Resource(ResourceType::Location);
const PROCEDURE: ReadBackCategory = ReadBackCategory::Resource(ResourceType::Procedure);
const MEDICATION: ReadBackCategory = ReadBackCategory::Resource(ResourceType::Medication);
const MEDICATION_STATEMENT: ReadBackCategory =
    ReadBackCategory::Resource(ResourceType::MedicationStatement);
const DIAGNOSTIC_REPORT: ReadBackCategory =
    ReadBackCategory::Resource(ResourceType::DiagnosticReport);
const VENTILATION: ReadBackCategory = ReadBackCategory::Ventilation;

/// The passes of a run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PassKind {
    Patients,
    Encounters,
    Transfers,
    Conditions,
    Procedures,
    Lab,
    LungFunction,
}

impl PassKind {
    pub const ALL: [PassKind; 7] = [
        PassKind::Patients,
        PassKind::Encounters,
        PassKind::Transfers,
        PassKind::Conditions,
        PassKind::Procedures,
        PassKind::Lab,
        PassKind::LungFunction,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PassKind::Patients => "patients",
            PassKind::Encounters => "encounters",
            PassKind::Transfers => "transfers",
            PassKind::Conditions => "conditions",
            PassKind::Procedures => "procedures",
            PassKind::Lab => "lab",
            PassKind::LungFunction => "lung_function",
        }
    }

    pub fn entity(&self) -> EntityKind {
        match self {
            PassKind::Patients => EntityKind::Patient,
            PassKind::Encounters => EntityKind::Encounter,
            PassKind::Transfers => EntityKind::Transfer,
            PassKind::Conditions => EntityKind::Diagnosis,
            PassKind::Procedures => EntityKind::Procedure,
            PassKind::Lab => EntityKind::LabResult,
            PassKind::LungFunction => EntityKind::LungFunction,
        }
    }

    /// Categories the pass produces and reads back, in report order
    pub fn categories(&self) -> &'static [ReadBackCategory] {
        match self {
            PassKind::Patients => &[PATIENT],
            PassKind::Encounters => &[
                CONDITION,
                ENCOUNTER,
                ReadBackCategory::SubEncounter,
                LOCATION,
                VENTILATION,
            ],
            PassKind::Transfers => &[ReadBackCategory::Dialysis, ReadBackCategory::Icu],
            PassKind::Conditions => &[CONDITION],
            PassKind::Procedures => &[PROCEDURE, MEDICATION, MEDICATION_STATEMENT],
            PassKind::Lab => &[ReadBackCategory::Lab],
            PassKind::LungFunction => &[ReadBackCategory::LungFunction, DIAGNOSTIC_REPORT],
        }
    }
}

impl fmt::Display for PassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a pass reads from
#[derive(Clone)]
pub struct PassContext {
    pub source: Arc<dyn ChangeSource>,
    pub resolver: Arc<dyn IdentifierResolver>,
    pub converter: Option<Arc<dyn UnitConverter>>,
    pub sink: Arc<dyn ResourceSink + Send + Sync>,
    pub systems: Arc<SystemsConfig>,
    pub lookups: Arc<LookupTables>,
    pub window: Window,
    pub chunk_size: usize,
    pub lab_chunk_size: usize,
    pub resolver_concurrency: usize,
    pub dry_run: bool,
}

/// Source ids a row needs pseudonyms for
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct RawIds {
    patient: Option<String>,
    encounter: Option<String>,
}

impl RawIds {
    fn patient(patient: impl fmt::Display) -> Self {
        Self {
            patient: Some(source_key(patient)),
            encounter: None,
        }
    }

    fn encounter(encounter: impl fmt::Display) -> Self {
        Self {
            patient: None,
            encounter: Some(source_key(encounter)),
        }
    }

    fn both(patient: impl fmt::Display, encounter: impl fmt::Display) -> Self {
        Self {
            patient: Some(source_key(patient)),
            encounter: Some(source_key(encounter)),
        }
    }
}

/// Canonical form of a source key
///
/// SAP keys on the cancellation side are zero-padded text while the
/// warehouse keys are integers; both must resolve to the same pseudonym.
pub fn source_key(raw: impl fmt::Display) -> String {
    let raw = raw.to_string();
    let trimmed = raw.trim();
    match trimmed.parse::<i64>() {
        Ok(n) => n.to_string(),
        Err(_) => trimmed.to_string(),
    }
}

async fn resolve_ids(resolver: &dyn IdentifierResolver, raw: RawIds) -> Result<Pseudonyms> {
    let patient = match raw.patient {
        Some(id) => Some(resolver.resolve_patient(&id).await?),
        None => None,
    };
    let encounter = match raw.encounter {
        Some(id) => Some(resolver.resolve_encounter(&id).await?),
        None => None,
    };
    Ok(Pseudonyms { patient, encounter })
}

/// A missing source field counts the row invalid, anything else aborts
fn recover<T>(result: Result<MapOutcome<T>>) -> Result<MapOutcome<T>> {
    match result {
        Err(SyncError::Mapping(reason)) => Ok(MapOutcome::Invalid(reason)),
        other => other,
    }
}

/// Runs one pass and returns its statistics
///
/// # Errors
///
/// Extraction, resolution, conversion and delivery failures abort the pass.
/// Rows that cannot be mapped are counted invalid and do not.
pub async fn run_pass(ctx: &PassContext, pass: PassKind) -> Result<PassStats> {
    let start_time = Instant::now();
    log_pass_start!(pass, ctx.window);

    let mut run = PassRun::new(ctx, pass);
    match pass {
        PassKind::Patients => run.patients().await?,
        PassKind::Encounters => run.encounters().await?,
        PassKind::Transfers => run.transfers().await?,
        PassKind::Conditions => run.conditions().await?,
        PassKind::Procedures => run.procedures().await?,
        PassKind::Lab => run.lab().await?,
        PassKind::LungFunction => run.lung_function().await?,
    }

    let mut stats = run.deliver().await?;
    stats.duration = start_time.elapsed();
    log_pass_complete!(
        pass,
        stats.entries_delivered,
        stats.cancellations_delivered,
        stats.duration
    );
    stats.log_summary();
    Ok(stats)
}

struct PassRun<'a> {
    ctx: &'a PassContext,
    stats: PassStats,
    bundle: Bundle,
    /// Source ids of cancellations already turned into requests
    canceled: HashSet<String>,
}

impl<'a> PassRun<'a> {
    fn new(ctx: &'a PassContext, pass: PassKind) -> Self {
        let mut stats = PassStats::new(pass);
        stats.dry_run = ctx.dry_run;
        Self {
            ctx,
            stats,
            bundle: Bundle::new(),
            canceled: HashSet::new(),
        }
    }

    fn pass(&self) -> PassKind {
        self.stats.pass
    }

    fn fetched(&self, feed: &mut ChangeFeed, rows: usize) {
        feed.advance(rows);
        log_page_processing!(self.pass(), feed.pages_read(), rows);
    }

    /// Keeps upserts and the first cancellation per source id
    fn dedup_cancels<U, C>(&mut self, records: Vec<ChangeRecord<U, C>>) -> Vec<ChangeRecord<U, C>> {
        let mut kept = Vec::with_capacity(records.len());
        for record in records {
            if matches!(record.change, Change::Cancel { .. })
                && !self.canceled.insert(record.source_id.clone())
            {
                tracing::debug!(
                    pass = %self.pass(),
                    source_id = %record.source_id,
                    "Skipping repeated cancellation"
                );
                continue;
            }
            kept.push(record);
        }
        kept
    }

    /// Resolves the pseudonyms of a page, keeping row order
    async fn resolve<T>(
        &self,
        items: Vec<T>,
        raw_ids: impl Fn(&T) -> RawIds,
    ) -> Result<Vec<(T, Pseudonyms)>> {
        let resolver = self.ctx.resolver.as_ref();
        let requests: Vec<RawIds> = items.iter().map(raw_ids).collect();
        let resolved: Vec<Result<Pseudonyms>> = stream::iter(requests)
            .map(|raw| resolve_ids(resolver, raw))
            .buffered(self.ctx.resolver_concurrency.max(1))
            .collect()
            .await;

        items
            .into_iter()
            .zip(resolved)
            .map(|(item, ids)| ids.map(|ids| (item, ids)))
            .collect()
    }

    fn mapping_context<'m>(&'m self, ids: &'m Pseudonyms) -> MappingContext<'m> {
        MappingContext::new(&self.ctx.systems, &self.ctx.lookups, ids)
    }

    /// Counts a mapped resource and adds it to the bundle when valid
    fn accept(&mut self, category: ReadBackCategory, outcome: MapOutcome<MappedResource>) {
        match outcome {
            MapOutcome::Mapped(resource) => {
                self.stats.category_mut(category).record_valid(1);
                self.bundle.add_resources([resource]);
            }
            MapOutcome::Invalid(reason) => self.reject(category, &reason),
        }
    }

    fn reject(&mut self, category: ReadBackCategory, reason: &str) {
        self.stats.category_mut(category).record_invalid(1);
        tracing::debug!(
            pass = %self.pass(),
            category = %category,
            reason = %reason,
            "Discarding invalid resource"
        );
    }

    fn cancel(&mut self, category: ReadBackCategory, id: String) -> Result<()> {
        let id = FhirId::new(id).map_err(SyncError::Validation)?;
        self.bundle.request_cancellation(category.resource_type(), id);
        self.stats.category_mut(category).record_cancellations(1);
        Ok(())
    }

    async fn patients(&mut self) -> Result<()> {
        let mut feed = ChangeFeed::new(self.ctx.chunk_size);
        while let Some(page) = feed.next_page() {
            let records = self.ctx.source.patients(&self.ctx.window, page).await?;
            self.fetched(&mut feed, records.len());
            let records = self.dedup_cancels(records);

            let resolved = self
                .resolve(records, |r| match &r.change {
                    Change::Upsert(row) => RawIds::patient(row.patient_id),
                    Change::Cancel { payload, .. } => RawIds::patient(&payload.patnr),
                })
                .await?;

            for (record, ids) in resolved {
                match record.change {
                    Change::Upsert(row) => {
                        let outcome =
                            recover(PatientMapper.map(&self.mapping_context(&ids), &row))?;
                        self.accept(PATIENT, outcome);
                    }
                    Change::Cancel { .. } => {
                        self.cancel(PATIENT, ids.patient_psn()?.to_string())?;
                    }
                }
            }
        }
        Ok(())
    }

    async fn encounters(&mut self) -> Result<()> {
        let mut feed = ChangeFeed::new(self.ctx.chunk_size);
        while let Some(page) = feed.next_page() {
            let records = self.ctx.source.encounters(&self.ctx.window, page).await?;
            self.fetched(&mut feed, records.len());
            let records = self.dedup_cancels(records);

            let resolved = self
                .resolve(records, |r| match &r.change {
                    Change::Upsert(row) => RawIds::both(row.patient_id, row.encounter_id),
                    Change::Cancel { payload, .. } => RawIds::encounter(&payload.falnr),
                })
                .await?;

            for (record, ids) in resolved {
                match record.change {
                    Change::Upsert(row) => self.encounter(&row, &ids)?,
                    Change::Cancel { .. } => {
                        let encounter = ids.encounter_psn()?.to_string();
                        self.cancel(VENTILATION, ventilation_id(&encounter))?;
                        self.cancel(ENCOUNTER, encounter)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Maps an encounter with its conditions, department stays and
    /// ventilation; an invalid encounter takes its dependents with it
    fn encounter(&mut self, row: &EncounterRow, ids: &Pseudonyms) -> Result<()> {
        let ctx = self.mapping_context(ids);

        let mut conditions = Vec::with_capacity(row.diagnoses.len());
        let mut invalid_conditions = Vec::new();
        for diagnosis in &row.diagnoses {
            match recover(ConditionMapper.map(&ctx, diagnosis))? {
                MapOutcome::Mapped(condition) => conditions.push(condition),
                MapOutcome::Invalid(reason) => invalid_conditions.push(reason),
            }
        }

        let mut subs = Vec::with_capacity(row.departments.len());
        let mut invalid_subs = Vec::new();
        for stay in &row.departments {
            match recover(SubEncounterMapper.map(&ctx, stay))? {
                MapOutcome::Mapped(sub) => subs.push(sub),
                MapOutcome::Invalid(reason) => {
                    invalid_subs.push(format!("{}: {reason}", stay_label(stay)))
                }
            }
        }

        let ventilation = recover(VentilationMapper.map(&ctx, row))?;
        let main = recover(EncounterMapper.map(
            &ctx,
            &MainEncounter {
                row,
                conditions: &conditions,
            },
        ))?;

        for reason in &invalid_conditions {
            self.reject(CONDITION, reason);
        }
        for reason in &invalid_subs {
            self.reject(ReadBackCategory::SubEncounter, reason);
        }
        self.accept(VENTILATION, ventilation);

        let locations: usize = subs.iter().map(|s| s.locations.len()).sum();
        let invalid_locations: usize = subs.iter().map(|s| s.invalid_locations).sum();
        self.stats
            .category_mut(LOCATION)
            .record_invalid(invalid_locations as u64);

        match main {
            MapOutcome::Mapped(encounter) => {
                self.stats.category_mut(ENCOUNTER).record_valid(1);
                self.stats
                    .category_mut(CONDITION)
                    .record_valid(conditions.len() as u64);
                self.stats
                    .category_mut(ReadBackCategory::SubEncounter)
                    .record_valid(subs.len() as u64);
                self.stats
                    .category_mut(LOCATION)
                    .record_valid(locations as u64);

                self.bundle.add_resources([encounter]);
                self.bundle
                    .add_resources(conditions.into_iter().map(|c| c.condition));
                for sub in subs {
                    self.bundle.add_resources([sub.encounter]);
                    self.bundle.add_resources(sub.locations);
                }
            }
            MapOutcome::Invalid(reason) => {
                self.reject(ENCOUNTER, &reason);
                self.stats
                    .category_mut(CONDITION)
                    .record_invalid(conditions.len() as u64);
                self.stats
                    .category_mut(ReadBackCategory::SubEncounter)
                    .record_invalid(subs.len() as u64);
                self.stats
                    .category_mut(LOCATION)
                    .record_invalid(locations as u64);
            }
        }
        Ok(())
    }

    async fn transfers(&mut self) -> Result<()> {
        let mut feed = ChangeFeed::new(self.ctx.chunk_size);
        while let Some(page) = feed.next_page() {
            let records = self.ctx.source.transfers(&self.ctx.window, page).await?;
            self.fetched(&mut feed, records.len());
            let records = self.dedup_cancels(records);

            let resolved = self
                .resolve(records, |r| match &r.change {
                    Change::Upsert(row) => RawIds::both(row.patient_id, row.encounter_id),
                    Change::Cancel { payload, .. } => RawIds::encounter(&payload.falnr),
                })
                .await?;

            for (record, ids) in resolved {
                match record.change {
                    Change::Upsert(row) => {
                        let ctx = self.mapping_context(&ids);
                        let dialysis = recover(DialysisMapper.map(&ctx, &row))?;
                        let icu = recover(IcuMapper.map(&ctx, &row))?;
                        self.accept(ReadBackCategory::Dialysis, dialysis);
                        self.accept(ReadBackCategory::Icu, icu);
                    }
                    Change::Cancel { .. } => {
                        let encounter = ids.encounter_psn()?.to_string();
                        self.cancel(ReadBackCategory::Dialysis, dialysis_id(&encounter))?;
                        self.cancel(ReadBackCategory::Icu, icu_id(&encounter))?;
                    }
                }
            }
        }
        Ok(())
    }

    async fn conditions(&mut self) -> Result<()> {
        let mut feed = ChangeFeed::new(self.ctx.chunk_size);
        while let Some(page) = feed.next_page() {
            let records = self.ctx.source.diagnoses(&self.ctx.window, page).await?;
            self.fetched(&mut feed, records.len());
            let records = self.dedup_cancels(records);

            let resolved = self
                .resolve(records, |r| match &r.change {
                    Change::Upsert(row) => RawIds::both(row.patient_id, row.encounter_id),
                    Change::Cancel { payload, .. } => RawIds::encounter(&payload.falnr),
                })
                .await?;

            for (record, ids) in resolved {
                match record.change {
                    Change::Upsert(row) => {
                        let outcome =
                            recover(ConditionMapper.map(&self.mapping_context(&ids), &row))?;
                        self.accept(CONDITION, outcome.map(|ranked| ranked.condition));
                    }
                    Change::Cancel { payload, .. } => {
                        let id = condition_id(ids.encounter_psn()?, source_key(&payload.lfdnr));
                        self.cancel(CONDITION, id)?;
                    }
                }
            }
        }
        Ok(())
    }

    async fn procedures(&mut self) -> Result<()> {
        let mut feed = ChangeFeed::new(self.ctx.chunk_size);
        while let Some(page) = feed.next_page() {
            let records = self.ctx.source.procedures(&self.ctx.window, page).await?;
            self.fetched(&mut feed, records.len());
            let records = self.dedup_cancels(records);

            let resolved = self
                .resolve(records, |r| match &r.change {
                    Change::Upsert(row) => RawIds::both(row.patient_id, row.encounter_id),
                    Change::Cancel { payload, .. } => RawIds::encounter(&payload.falnr),
                })
                .await?;

            for (record, ids) in resolved {
                match record.change {
                    Change::Upsert(row) => {
                        let ctx = self.mapping_context(&ids);
                        let procedure = recover(ProcedureMapper.map(&ctx, &row))?;
                        let medication = recover(MedicationMapper.map(&ctx, &row))?;

                        self.accept(PROCEDURE, procedure);
                        match medication {
                            MapOutcome::Mapped(Some(resources)) => {
                                self.accept(MEDICATION, MapOutcome::Mapped(resources.medication));
                                self.accept(MEDICATION_STATEMENT, resources.statement);
                            }
                            MapOutcome::Mapped(None) => {}
                            MapOutcome::Invalid(reason) => self.reject(MEDICATION, &reason),
                        }
                    }
                    Change::Cancel { payload, .. } => {
                        let encounter = ids.encounter_psn()?;
                        let nr = source_key(&payload.lnric);
                        if payload.is_drug_application() {
                            let id = medication_statement_id(encounter, &nr);
                            self.cancel(MEDICATION_STATEMENT, id)?;
                        } else {
                            let id = procedure_id(encounter, &nr);
                            self.cancel(PROCEDURE, id)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Asks the conversion service for a row's quantity, if configured
    async fn convert(&self, row: &LabRow) -> Result<Option<LabQuantity>> {
        let (Some(converter), Some(quantity)) =
            (self.ctx.converter.as_ref(), LabMapper::convertible(row))
        else {
            return Ok(None);
        };
        converter.convert(&quantity).await
    }

    async fn lab(&mut self) -> Result<()> {
        let mut feed = ChangeFeed::new(self.ctx.lab_chunk_size);
        while let Some(page) = feed.next_page() {
            let records = self.ctx.source.lab_results(&self.ctx.window, page).await?;
            self.fetched(&mut feed, records.len());

            let rows: Vec<LabRow> = records
                .into_iter()
                .map(|record| match record.change {
                    Change::Upsert(row) => row,
                    Change::Cancel { payload, .. } => match payload {},
                })
                .collect();
            let resolved = self
                .resolve(rows, |row| RawIds::both(row.patient_id, row.encounter_id))
                .await?;

            for (row, ids) in resolved {
                let converted = self.convert(&row).await?;
                let input = LabInput {
                    row: &row,
                    converted: converted.as_ref(),
                };
                let outcome = recover(LabMapper.map(&self.mapping_context(&ids), &input))?;
                self.accept(ReadBackCategory::Lab, outcome);
            }
        }
        Ok(())
    }

    async fn lung_function(&mut self) -> Result<()> {
        let columns = self.ctx.lookups.lung_function_columns();
        let mut feed = ChangeFeed::new(self.ctx.chunk_size);
        while let Some(page) = feed.next_page() {
            let records = self
                .ctx
                .source
                .lung_function(&self.ctx.window, page, &columns)
                .await?;
            self.fetched(&mut feed, records.len());

            let rows: Vec<_> = records
                .into_iter()
                .map(|record| match record.change {
                    Change::Upsert(row) => row,
                    Change::Cancel { payload, .. } => match payload {},
                })
                .collect();
            let resolved = self
                .resolve(rows, |row| RawIds::both(row.patient_id, row.encounter_id))
                .await?;

            for (row, ids) in resolved {
                let outcome = recover(LungFunctionMapper.map(&self.mapping_context(&ids), &row))?;
                match outcome {
                    MapOutcome::Mapped(resources) => {
                        self.accept(DIAGNOSTIC_REPORT, MapOutcome::Mapped(resources.report));
                        for observation in resources.observations {
                            self.accept(ReadBackCategory::LungFunction, observation);
                        }
                    }
                    MapOutcome::Invalid(reason) => self.reject(DIAGNOSTIC_REPORT, &reason),
                }
            }
        }
        Ok(())
    }

    /// Delivers the bundle and fills in the read-back counts
    async fn deliver(mut self) -> Result<PassStats> {
        let sink = &self.ctx.sink;
        let since = sink.read_back_marker().await?;

        tracing::info!(
            pass = %self.pass(),
            sink = sink.name(),
            entries = self.bundle.len(),
            cancellations = self.bundle.cancellation_count(),
            "Delivering bundle"
        );
        let delivery = sink.deliver(&self.bundle, self.ctx.dry_run).await?;
        self.stats.entries_delivered = delivery.entries_sent;
        self.stats.cancellations_delivered = delivery.cancellations_applied;
        self.stats.rows_affected = delivery.rows_affected;
        self.stats.dry_run = delivery.dry_run;

        if !delivery.dry_run {
            for category in self.pass().categories() {
                let counts = sink.read_back(*category, since).await?;
                self.stats.category_mut(*category).set_read_back(counts);
            }
        }
        Ok(self.stats)
    }
}
