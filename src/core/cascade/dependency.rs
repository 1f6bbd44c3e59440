//! Cross-resource dependency table
//!
//! Which resources hold references to which, and what happens to the holder
//! when the referenced resource is canceled.

use crate::domain::ResourceType;

/// Value written in place of a reference whose target was canceled
pub const UNKNOWN_REFERENCE: &str = "UNKNOWN";

/// What a cancellation of the parent does to a child
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadeAction {
    /// Soft-delete every child that references the parent
    CascadeDelete,
    /// Replace the child's reference with [`UNKNOWN_REFERENCE`]
    NullifyReference,
    /// Replace the reference inside the matching element of `array` only
    NullifyArrayEntry { array: &'static str },
}

/// One edge: `child.reference_path` points at a `parent`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DependencyEdge {
    pub parent: ResourceType,
    pub child: ResourceType,
    /// Path of the reference string; relative to the array element for
    /// [`CascadeAction::NullifyArrayEntry`]
    pub reference_path: &'static [&'static str],
    pub action: CascadeAction,
}

const ENCOUNTER_REF: &[&str] = &["encounter", "reference"];
const CONTEXT_REF: &[&str] = &["context", "reference"];
const SUBJECT_REF: &[&str] = &["subject", "reference"];
const CONDITION_REF: &[&str] = &["condition", "reference"];

const fn edge(
    parent: ResourceType,
    child: ResourceType,
    reference_path: &'static [&'static str],
    action: CascadeAction,
) -> DependencyEdge {
    DependencyEdge {
        parent,
        child,
        reference_path,
        action,
    }
}

/// Every dependency the reconciler knows about
pub static DEPENDENCY_TABLE: &[DependencyEdge] = &[
    edge(
        ResourceType::Encounter,
        ResourceType::Condition,
        ENCOUNTER_REF,
        CascadeAction::NullifyReference,
    ),
    edge(
        ResourceType::Encounter,
        ResourceType::Procedure,
        ENCOUNTER_REF,
        CascadeAction::NullifyReference,
    ),
    edge(
        ResourceType::Encounter,
        ResourceType::Observation,
        ENCOUNTER_REF,
        CascadeAction::NullifyReference,
    ),
    edge(
        ResourceType::Encounter,
        ResourceType::DiagnosticReport,
        ENCOUNTER_REF,
        CascadeAction::NullifyReference,
    ),
    edge(
        ResourceType::Encounter,
        ResourceType::MedicationStatement,
        CONTEXT_REF,
        CascadeAction::NullifyReference,
    ),
    edge(ResourceType::Patient, ResourceType::Condition, SUBJECT_REF, CascadeAction::CascadeDelete),
    edge(ResourceType::Patient, ResourceType::Procedure, SUBJECT_REF, CascadeAction::CascadeDelete),
    edge(
        ResourceType::Patient,
        ResourceType::Observation,
        SUBJECT_REF,
        CascadeAction::CascadeDelete,
    ),
    edge(
        ResourceType::Patient,
        ResourceType::Encounter,
        SUBJECT_REF,
        CascadeAction::NullifyReference,
    ),
    edge(
        ResourceType::Patient,
        ResourceType::MedicationStatement,
        SUBJECT_REF,
        CascadeAction::NullifyReference,
    ),
    edge(
        ResourceType::Condition,
        ResourceType::Encounter,
        CONDITION_REF,
        CascadeAction::NullifyArrayEntry { array: "diagnosis" },
    ),
];

/// Edges whose parent is `parent`, in table order
pub fn edges_from(parent: ResourceType) -> impl Iterator<Item = &'static DependencyEdge> {
    DEPENDENCY_TABLE.iter().filter(move |e| e.parent == parent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leaf_types_have_no_dependents() {
        for leaf in [
            ResourceType::Procedure,
            ResourceType::MedicationStatement,
            ResourceType::Observation,
            ResourceType::Location,
        ] {
            assert_eq!(edges_from(leaf).count(), 0, "{leaf} should be a leaf");
        }
    }

    #[test]
    fn test_patient_edges() {
        let deletes: Vec<ResourceType> = edges_from(ResourceType::Patient)
            .filter(|e| e.action == CascadeAction::CascadeDelete)
            .map(|e| e.child)
            .collect();
        assert_eq!(
            deletes,
            vec![
                ResourceType::Condition,
                ResourceType::Procedure,
                ResourceType::Observation
            ]
        );
    }

    #[test]
    fn test_medication_statement_uses_context() {
        let edge = edges_from(ResourceType::Encounter)
            .find(|e| e.child == ResourceType::MedicationStatement)
            .unwrap();
        assert_eq!(edge.reference_path, &["context", "reference"]);
    }

    #[test]
    fn test_edges_never_point_to_self() {
        assert!(DEPENDENCY_TABLE.iter().all(|e| e.parent != e.child));
    }
}
