//! Cancellation cascades
//!
//! A canceled resource is soft-deleted, and the resources that point at it
//! are either soft-deleted too or have the reference replaced by `UNKNOWN`,
//! following [`DEPENDENCY_TABLE`].

pub mod dependency;
pub mod reconciler;

pub use dependency::{
    edges_from, CascadeAction, DependencyEdge, DEPENDENCY_TABLE, UNKNOWN_REFERENCE,
};
pub use reconciler::{CascadePlan, CascadeReconciler, CascadeStep, CANCELLATION_ORDER};
