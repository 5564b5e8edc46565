//! Definition error taxonomy.
//!
//! Every variant names the offending declared id(s) so that a batch of
//! errors can be reported to the author in one pass.

use crate::id::DeclaredId;
use crate::kind::ResourceKind;
use serde::Serialize;

/// Core result type
pub type CoreResult<T> = Result<T, DefinitionError>;

/// Error found while registering, resolving, or planning definitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum DefinitionError {
    /// Two definitions declare the same id
    #[error("duplicate identifier `{id}`: declared as {kind} but already registered as {existing}")]
    DuplicateIdentifier {
        /// The repeated id
        id: DeclaredId,
        /// Kind of the rejected declaration
        kind: ResourceKind,
        /// Kind of the earlier declaration
        existing: ResourceKind,
    },

    /// A reference names an id that was never declared
    #[error("`{node}`.{field} references unknown identifier `{id}`")]
    UnknownIdentifier {
        /// Definition holding the reference
        node: DeclaredId,
        /// Reference field, e.g. `sources[1]`
        field: String,
        /// The unresolved id
        id: DeclaredId,
    },

    /// A reference names an id of the wrong kind
    #[error("`{node}`.{field} must reference a {expected}, but `{id}` is a {found}")]
    ReferenceKindMismatch {
        /// Definition holding the reference
        node: DeclaredId,
        /// Reference field
        field: String,
        /// The referenced id
        id: DeclaredId,
        /// Kind the field requires
        expected: ResourceKind,
        /// Kind actually registered under `id`
        found: ResourceKind,
    },

    /// A structural invariant of a single definition is violated
    #[error("invalid definition `{node}`.{field}: {reason}")]
    InvalidDefinition {
        /// Offending definition
        node: DeclaredId,
        /// Offending field
        field: String,
        /// What is wrong
        reason: String,
    },

    /// A graph edge connects kinds that cannot depend on each other
    #[error("{to_kind} `{to}` cannot depend on {from_kind} `{from}`")]
    IllegalEdge {
        /// Upstream definition
        from: DeclaredId,
        /// Upstream kind
        from_kind: ResourceKind,
        /// Dependent definition
        to: DeclaredId,
        /// Dependent kind
        to_kind: ResourceKind,
    },

    /// The dependency relation has a cycle
    #[error("cyclic dependency: {}", format_cycle(.cycle))]
    CyclicDependency {
        /// Closed walk, in edge order; the last node depends on the first
        cycle: Vec<DeclaredId>,
    },
}

impl DefinitionError {
    /// Stable reason code
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::DuplicateIdentifier { .. } => "duplicate_identifier",
            Self::UnknownIdentifier { .. } => "unknown_identifier",
            Self::ReferenceKindMismatch { .. } => "reference_kind_mismatch",
            Self::InvalidDefinition { .. } => "invalid_definition",
            Self::IllegalEdge { .. } => "illegal_edge",
            Self::CyclicDependency { .. } => "cyclic_dependency",
        }
    }

    /// Declared ids of the definitions this error is about
    #[must_use]
    pub fn node_ids(&self) -> Vec<&DeclaredId> {
        match self {
            Self::DuplicateIdentifier { id, .. } => vec![id],
            Self::UnknownIdentifier { node, .. }
            | Self::ReferenceKindMismatch { node, .. }
            | Self::InvalidDefinition { node, .. } => vec![node],
            Self::IllegalEdge { from, to, .. } => vec![from, to],
            Self::CyclicDependency { cycle } => cycle.iter().collect(),
        }
    }
}

fn format_cycle(cycle: &[DeclaredId]) -> String {
    let mut walk: Vec<&str> = cycle.iter().map(DeclaredId::as_str).collect();
    if let Some(first) = cycle.first() {
        walk.push(first.as_str());
    }
    walk.join(" -> ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DefinitionError::UnknownIdentifier {
            node: DeclaredId::from("f1"),
            field: "table".to_string(),
            id: DeclaredId::from("missing"),
        };
        assert_eq!(
            format!("{}", err),
            "`f1`.table references unknown identifier `missing`"
        );
    }

    #[test]
    fn test_cycle_display_closes_walk() {
        let err = DefinitionError::CyclicDependency {
            cycle: vec![DeclaredId::from("t1"), DeclaredId::from("t2")],
        };
        assert_eq!(format!("{}", err), "cyclic dependency: t1 -> t2 -> t1");
        assert_eq!(err.node_ids().len(), 2);
    }

    #[test]
    fn test_kind_mismatch_display() {
        let err = DefinitionError::ReferenceKindMismatch {
            node: DeclaredId::from("t1"),
            field: "source".to_string(),
            id: DeclaredId::from("f1"),
            expected: ResourceKind::Source,
            found: ResourceKind::Feature,
        };
        let s = format!("{}", err);
        assert!(s.contains("must reference a source"));
        assert!(s.contains("is a feature"));
        assert_eq!(err.code(), "reference_kind_mismatch");
    }

    #[test]
    fn test_serialize_carries_code() {
        let err = DefinitionError::InvalidDefinition {
            node: DeclaredId::from("t2"),
            field: "sources".to_string(),
            reason: "derived table needs at least one source".to_string(),
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "invalid_definition");
        assert_eq!(json["node"], "t2");
    }

    #[test]
    fn test_error_equality() {
        let err1 = DefinitionError::CyclicDependency { cycle: vec![DeclaredId::from("a")] };
        let err2 = DefinitionError::CyclicDependency { cycle: vec![DeclaredId::from("a")] };
        assert_eq!(err1, err2);
    }
}
