//! Change records and sync windows
//!
//! The extractor turns every joined source row into a [`ChangeRecord`]
//! tagged as either an upsert or a cancellation. Records live only for the
//! duration of a page and are never persisted.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Half-open time window `[start, end)`
///
/// Adjacent windows never share a record: a timestamp equal to `end` belongs
/// to the next window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    start: NaiveDateTime,
    end: NaiveDateTime,
}

impl Window {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Result<Self, String> {
        if start >= end {
            return Err(format!(
                "Window start ({start}) must be before window end ({end})"
            ));
        }
        Ok(Self { start, end })
    }

    /// Window from midnight of `start` to midnight of `end`
    pub fn from_dates(start: NaiveDate, end: NaiveDate) -> Result<Self, String> {
        Self::new(start.and_time(chrono::NaiveTime::MIN), end.and_time(chrono::NaiveTime::MIN))
    }

    /// Parses two `YYYY-MM-DD` dates
    ///
    /// ```
    /// use fhir_inc_sync::domain::change::Window;
    ///
    /// let window = Window::parse_dates("2020-12-12", "2020-12-14").unwrap();
    /// assert!(Window::parse_dates("2020-12-14", "2020-12-12").is_err());
    /// # let _ = window;
    /// ```
    pub fn parse_dates(start: &str, end: &str) -> Result<Self, String> {
        let parse = |s: &str| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map_err(|e| format!("Invalid date '{s}', expected YYYY-MM-DD: {e}"))
        };
        Self::from_dates(parse(start)?, parse(end)?)
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn end(&self) -> NaiveDateTime {
        self.end
    }

    pub fn contains(&self, ts: NaiveDateTime) -> bool {
        ts >= self.start && ts < self.end
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Source entity behind a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Patient,
    Encounter,
    Transfer,
    Diagnosis,
    Procedure,
    LabResult,
    LungFunction,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Patient => "patient",
            EntityKind::Encounter => "encounter",
            EntityKind::Transfer => "transfer",
            EntityKind::Diagnosis => "diagnosis",
            EntityKind::Procedure => "procedure",
            EntityKind::LabResult => "lab_result",
            EntityKind::LungFunction => "lung_function",
        }
    }

    /// Whether the entity has a cancellation log on the source side
    pub fn has_cancellations(&self) -> bool {
        !matches!(self, EntityKind::LabResult | EntityKind::LungFunction)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Upsert,
    Cancel,
}

/// Payload of a change: the upsert row or the cancellation row
#[derive(Debug, Clone, PartialEq)]
pub enum Change<U, C> {
    Upsert(U),
    Cancel {
        canceled_at: NaiveDateTime,
        payload: C,
    },
}

/// A classified source row
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRecord<U, C> {
    pub entity: EntityKind,
    /// Natural key on the source side, used for de-duplicating cancellations
    pub source_id: String,
    pub change: Change<U, C>,
}

impl<U, C> ChangeRecord<U, C> {
    pub fn upsert(entity: EntityKind, source_id: impl Into<String>, row: U) -> Self {
        Self {
            entity,
            source_id: source_id.into(),
            change: Change::Upsert(row),
        }
    }

    pub fn cancel(
        entity: EntityKind,
        source_id: impl Into<String>,
        canceled_at: NaiveDateTime,
        payload: C,
    ) -> Self {
        Self {
            entity,
            source_id: source_id.into(),
            change: Change::Cancel {
                canceled_at,
                payload,
            },
        }
    }

    pub fn operation(&self) -> Operation {
        match self.change {
            Change::Upsert(_) => Operation::Upsert,
            Change::Cancel { .. } => Operation::Cancel,
        }
    }

    pub fn cancel_timestamp(&self) -> Option<NaiveDateTime> {
        match &self.change {
            Change::Upsert(_) => None,
            Change::Cancel { canceled_at, .. } => Some(*canceled_at),
        }
    }
}
