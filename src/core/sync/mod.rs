//! Sync orchestration
//!
//! # Modules
//!
//! - [`feed`] - Page cursor over a change source
//! - [`pass`] - One pass per entity: extract, resolve, map, accumulate, deliver
//! - [`stats`] - Per-pass counters and sink read-back
//! - [`summary`] - Run summary and error reporting
//! - [`coordinator`] - Runs the enabled passes over one window

pub mod coordinator;
pub mod feed;
pub mod pass;
pub mod stats;
pub mod summary;

pub use coordinator::{enabled_passes, SyncCoordinator};
pub use feed::ChangeFeed;
pub use pass::{run_pass, PassContext, PassKind};
pub use stats::{CategoryCounts, PassStats, ReadBackCategory, ReadBackCounts};
pub use summary::{RunSummary, SyncErrorType, SyncRunError};
