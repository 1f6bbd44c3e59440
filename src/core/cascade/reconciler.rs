//! Cascade planner
//!
//! Turns the cancellations of a bundle into ordered [`CascadeStep`]s. Plans
//! are pure data; the sink executes them inside its delivery transaction.

use super::dependency::{edges_from, CascadeAction};
use crate::core::bundle::Bundle;
use crate::domain::{FhirId, ResourceKey, ResourceType};
use std::collections::HashSet;

/// Order in which cancellations of a bundle are planned
pub const CANCELLATION_ORDER: [ResourceType; 6] = [
    ResourceType::Encounter,
    ResourceType::Patient,
    ResourceType::Condition,
    ResourceType::Procedure,
    ResourceType::MedicationStatement,
    ResourceType::Observation,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CascadeStep {
    /// Mark the canceled resource itself as deleted
    SoftDelete { key: ResourceKey },
    /// Soft-delete every `child` whose `path` equals `reference`
    SoftDeleteReferencing {
        child: ResourceType,
        path: &'static [&'static str],
        reference: String,
    },
    /// Overwrite `path` with `UNKNOWN` on every `child` whose `path` equals `reference`
    NullifyReference {
        child: ResourceType,
        path: &'static [&'static str],
        reference: String,
    },
    /// Overwrite `array[i].element_path` where that element equals `reference`
    NullifyArrayEntry {
        child: ResourceType,
        array: &'static str,
        element_path: &'static [&'static str],
        reference: String,
    },
}

/// All steps triggered by one cancellation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadePlan {
    pub trigger: ResourceKey,
    pub steps: Vec<CascadeStep>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CascadeReconciler;

impl CascadeReconciler {
    pub fn new() -> Self {
        Self
    }

    /// Plans the cancellation of a single resource
    ///
    /// ```
    /// use fhir_inc_sync::core::cascade::{CascadeReconciler, CascadeStep};
    /// use fhir_inc_sync::domain::{ResourceKey, ResourceType};
    ///
    /// let key = ResourceKey::parse(ResourceType::Procedure, "e1_1").unwrap();
    /// let plan = CascadeReconciler::new().plan(&key);
    /// assert_eq!(plan.steps, vec![CascadeStep::SoftDelete { key }]);
    /// ```
    pub fn plan(&self, key: &ResourceKey) -> CascadePlan {
        let reference = key.reference();
        let mut steps = vec![CascadeStep::SoftDelete { key: key.clone() }];

        let edges: Vec<_> = edges_from(key.resource_type).collect();

        steps.extend(
            edges
                .iter()
                .filter(|e| e.action == CascadeAction::CascadeDelete)
                .map(|e| CascadeStep::SoftDeleteReferencing {
                    child: e.child,
                    path: e.reference_path,
                    reference: reference.clone(),
                }),
        );
        steps.extend(
            edges
                .iter()
                .filter(|e| e.action == CascadeAction::NullifyReference)
                .map(|e| CascadeStep::NullifyReference {
                    child: e.child,
                    path: e.reference_path,
                    reference: reference.clone(),
                }),
        );
        steps.extend(edges.iter().filter_map(|e| match e.action {
            CascadeAction::NullifyArrayEntry { array } => Some(CascadeStep::NullifyArrayEntry {
                child: e.child,
                array,
                element_path: e.reference_path,
                reference: reference.clone(),
            }),
            _ => None,
        }));

        CascadePlan {
            trigger: key.clone(),
            steps,
        }
    }

    /// Plans every cancellation of `bundle`
    ///
    /// Types follow [`CANCELLATION_ORDER`], then any remaining type in
    /// priority order. Repeated ids within a type are planned once.
    pub fn plan_bundle(&self, bundle: &Bundle) -> Vec<CascadePlan> {
        let cancellations = bundle.cancellations();
        let rest = cancellations
            .keys()
            .copied()
            .filter(|t| !CANCELLATION_ORDER.contains(t));

        CANCELLATION_ORDER
            .into_iter()
            .chain(rest)
            .flat_map(|resource_type| {
                let mut seen: HashSet<&FhirId> = HashSet::new();
                bundle
                    .cancellations_of(resource_type)
                    .iter()
                    .filter(move |id| seen.insert(*id))
                    .map(move |id| self.plan(&ResourceKey::new(resource_type, id.clone())))
            })
            .collect()
    }
}
