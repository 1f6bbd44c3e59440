//! Reconciliation statistics
//!
//! Each pass counts what its mappers produced and, after delivery, what the
//! sink reports back for the same categories. The two halves together are
//! what operators compare to spot lost or duplicated records.

use super::pass::PassKind;
use crate::domain::resource::get_json_path;
use crate::domain::ResourceType;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::time::Duration;

pub const VENTILATION_CODE: &str = "74201-5";
pub const DIALYSIS_CODE: &str = "intercurrent-dialysis";
pub const ICU_CODE: &str = "74200-7";
pub const LAB_SOURCE: &str = "#laboratory";
pub const LUNG_FUNCTION_SOURCE: &str = "#lufu-cwd";

const CODE_PATH: &[&str] = &["code", "coding", "0", "code"];
const SOURCE_PATH: &[&str] = &["meta", "source"];
const PART_OF_PATH: &[&str] = &["partOf", "reference"];

/// How a category narrows down the rows of its resource type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubtypeFilter {
    /// `data #>> path = value`
    Equals {
        path: &'static [&'static str],
        value: &'static str,
    },
    /// `data #>> path IS NOT NULL`
    Present { path: &'static [&'static str] },
}

impl SubtypeFilter {
    pub fn matches(&self, body: &Value) -> bool {
        match self {
            SubtypeFilter::Equals { path, value } => {
                get_json_path(body, *path).and_then(Value::as_str) == Some(*value)
            }
            SubtypeFilter::Present { path } => {
                get_json_path(body, *path).is_some_and(|v| !v.is_null())
            }
        }
    }
}

/// A countable group of resources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadBackCategory {
    Resource(ResourceType),
    SubEncounter,
    Ventilation,
    Dialysis,
    Icu,
    Lab,
    LungFunction,
}

impl ReadBackCategory {
    pub fn resource_type(&self) -> ResourceType {
        match self {
            ReadBackCategory::Resource(t) => *t,
            ReadBackCategory::SubEncounter => ResourceType::Encounter,
            _ => ResourceType::Observation,
        }
    }

    pub fn subtype_filter(&self) -> Option<SubtypeFilter> {
        match self {
            ReadBackCategory::Resource(_) => None,
            ReadBackCategory::SubEncounter => Some(SubtypeFilter::Present { path: PART_OF_PATH }),
            ReadBackCategory::Ventilation => Some(SubtypeFilter::Equals {
                path: CODE_PATH,
                value: VENTILATION_CODE,
            }),
            ReadBackCategory::Dialysis => Some(SubtypeFilter::Equals {
                path: CODE_PATH,
                value: DIALYSIS_CODE,
            }),
            ReadBackCategory::Icu => Some(SubtypeFilter::Equals {
                path: CODE_PATH,
                value: ICU_CODE,
            }),
            ReadBackCategory::Lab => Some(SubtypeFilter::Equals {
                path: SOURCE_PATH,
                value: LAB_SOURCE,
            }),
            ReadBackCategory::LungFunction => Some(SubtypeFilter::Equals {
                path: SOURCE_PATH,
                value: LUNG_FUNCTION_SOURCE,
            }),
        }
    }

    /// Whether a stored resource belongs to this category
    pub fn matches(&self, resource_type: ResourceType, body: &Value) -> bool {
        resource_type == self.resource_type()
            && self.subtype_filter().map_or(true, |f| f.matches(body))
    }
}

impl fmt::Display for ReadBackCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadBackCategory::Resource(t) => write!(f, "{t}"),
            ReadBackCategory::SubEncounter => f.write_str("Subencounter"),
            ReadBackCategory::Ventilation => f.write_str("Observation (ventilation)"),
            ReadBackCategory::Dialysis => f.write_str("Observation (dialysis)"),
            ReadBackCategory::Icu => f.write_str("Observation (ICU days)"),
            ReadBackCategory::Lab => f.write_str("Observation (laboratory)"),
            ReadBackCategory::LungFunction => f.write_str("Observation (lufu)"),
        }
    }
}

/// Rows touched since a marker, split by deletion state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReadBackCounts {
    pub upserted: u64,
    pub removed: u64,
}

/// Counters for one category within one pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategoryCounts {
    pub attempted: u64,
    pub valid: u64,
    pub invalid: u64,
    pub cancellation_requests: u64,
    /// Filled from the sink after delivery; `None` when it cannot tell
    pub upserted: Option<u64>,
    pub removed: Option<u64>,
}

impl CategoryCounts {
    pub fn record_valid(&mut self, n: u64) {
        self.valid += n;
        self.attempted += n;
    }

    pub fn record_invalid(&mut self, n: u64) {
        self.invalid += n;
        self.attempted += n;
    }

    /// Moves `n` previously valid resources to invalid
    pub fn reclassify_invalid(&mut self, n: u64) {
        let n = n.min(self.valid);
        self.valid -= n;
        self.invalid += n;
    }

    pub fn record_cancellations(&mut self, n: u64) {
        self.cancellation_requests += n;
    }

    pub fn set_read_back(&mut self, counts: Option<ReadBackCounts>) {
        self.upserted = counts.map(|c| c.upserted);
        self.removed = counts.map(|c| c.removed);
    }
}

/// Statistics of one pass
#[derive(Debug, Clone, Serialize)]
pub struct PassStats {
    pub pass: PassKind,
    /// Categories in the order the pass reports them
    pub categories: Vec<(ReadBackCategory, CategoryCounts)>,
    pub entries_delivered: usize,
    pub cancellations_delivered: usize,
    pub rows_affected: u64,
    pub dry_run: bool,
    #[serde(skip)]
    pub duration: Duration,
}

impl PassStats {
    /// Creates empty counters for every category the pass reports
    pub fn new(pass: PassKind) -> Self {
        Self {
            pass,
            categories: pass
                .categories()
                .iter()
                .map(|c| (*c, CategoryCounts::default()))
                .collect(),
            entries_delivered: 0,
            cancellations_delivered: 0,
            rows_affected: 0,
            dry_run: false,
            duration: Duration::ZERO,
        }
    }

    pub fn category(&self, category: ReadBackCategory) -> Option<&CategoryCounts> {
        self.categories
            .iter()
            .find(|(c, _)| *c == category)
            .map(|(_, counts)| counts)
    }

    /// Counters for `category`, added at the end if the pass did not list it
    pub fn category_mut(&mut self, category: ReadBackCategory) -> &mut CategoryCounts {
        let index = match self.categories.iter().position(|(c, _)| *c == category) {
            Some(index) => index,
            None => {
                self.categories.push((category, CategoryCounts::default()));
                self.categories.len() - 1
            }
        };
        &mut self.categories[index].1
    }

    pub fn total_valid(&self) -> u64 {
        self.categories.iter().map(|(_, c)| c.valid).sum()
    }

    pub fn total_invalid(&self) -> u64 {
        self.categories.iter().map(|(_, c)| c.invalid).sum()
    }

    pub fn total_cancellation_requests(&self) -> u64 {
        self.categories
            .iter()
            .map(|(_, c)| c.cancellation_requests)
            .sum()
    }

    /// Logs the result lines of the pass
    pub fn log_summary(&self) {
        tracing::info!(pass = %self.pass, "Results:");

        for (category, counts) in &self.categories {
            tracing::info!(
                pass = %self.pass,
                category = %category,
                attempted = counts.attempted,
                "Created {} {} resources in total",
                counts.attempted,
                category
            );
            if counts.invalid > 0 {
                tracing::warn!(
                    pass = %self.pass,
                    category = %category,
                    invalid = counts.invalid,
                    "Detected {} invalid {} resources being discarded",
                    counts.invalid,
                    category
                );
            } else {
                tracing::info!(
                    pass = %self.pass,
                    category = %category,
                    "Detected NO invalid {} resources",
                    category
                );
            }
            if counts.cancellation_requests > 0 {
                tracing::info!(
                    pass = %self.pass,
                    category = %category,
                    requests = counts.cancellation_requests,
                    "Created {} requests to delete {} resources",
                    counts.cancellation_requests,
                    category
                );
            }
        }

        for (category, counts) in &self.categories {
            if let (Some(upserted), Some(removed)) = (counts.upserted, counts.removed) {
                tracing::info!(
                    pass = %self.pass,
                    category = %category,
                    upserted,
                    "Upserted {} {} resources",
                    upserted,
                    category
                );
                tracing::info!(
                    pass = %self.pass,
                    category = %category,
                    removed,
                    "Removed {} {} resources",
                    removed,
                    category
                );
            }
        }
    }
}
