//! Resolved nodes.
//!
//! A resolved node is a definition whose references have all been replaced by
//! registry handles. All node kinds share one tagged type so the graph and
//! planner can treat them uniformly.

use crate::definition::Aggregation;
use featurestack_core::{DeclaredId, Handle, ResourceKind};
use serde::Serialize;

/// A definition with every reference resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedNode {
    /// Registry handle
    pub handle: Handle,
    /// Declared id
    pub id: DeclaredId,
    /// Kind-specific payload
    pub payload: NodePayload,
}

/// A reference from one node to another
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Field holding the reference, e.g. `over[0]`
    pub field: String,
    /// Referenced node
    pub target: Handle,
}

impl ResolvedNode {
    /// Kind of the node
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        self.payload.kind()
    }

    /// Resource name
    #[must_use]
    pub fn name(&self) -> &str {
        match &self.payload {
            NodePayload::Entity { name, .. } | NodePayload::Source { name } => name,
            NodePayload::Table(t) => &t.name,
            NodePayload::Feature(f) => &f.name,
            NodePayload::FeatureSet(s) => &s.name,
        }
    }

    /// Every outgoing reference, in field order
    #[must_use]
    pub fn references(&self) -> Vec<Reference> {
        let mut refs = Vec::new();
        let mut push = |field: String, target: Handle| refs.push(Reference { field, target });

        match &self.payload {
            NodePayload::Entity { .. } | NodePayload::Source { .. } => {}
            NodePayload::Table(table) => {
                match &table.lineage {
                    TableLineage::Raw { source, .. } => push("source.source".to_string(), *source),
                    TableLineage::Derived { sources, .. } => {
                        for (i, h) in sources.iter().enumerate() {
                            push(format!("sources[{}]", i), *h);
                        }
                    }
                }
                if let Some(event) = &table.event {
                    for (i, binding) in event.entities.iter().enumerate() {
                        push(format!("event.entities[{}]", i), binding.entity);
                    }
                }
            }
            NodePayload::Feature(feature) => {
                match &feature.lineage {
                    FeatureLineage::Table(h) => push("table".to_string(), *h),
                    FeatureLineage::Over(over) => {
                        for (i, h) in over.iter().enumerate() {
                            push(format!("over[{}]", i), *h);
                        }
                    }
                }
                if let Some(entity) = feature.entity {
                    push("entity".to_string(), entity);
                }
            }
            NodePayload::FeatureSet(set) => {
                for (i, h) in set.features.iter().enumerate() {
                    push(format!("features[{}]", i), *h);
                }
                push("entity".to_string(), set.entity);
            }
        }

        refs
    }
}

/// Kind-specific payload of a resolved node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodePayload {
    /// Entity
    Entity {
        /// Resource name
        name: String,
        /// Human description
        description: String,
        /// Default grouping column
        default_column: Option<String>,
    },
    /// Existing source, looked up by name
    Source {
        /// External source name
        name: String,
    },
    /// Table
    Table(ResolvedTable),
    /// Feature
    Feature(ResolvedFeature),
    /// Feature set
    FeatureSet(ResolvedFeatureSet),
}

impl NodePayload {
    /// Kind of the payload
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        match self {
            Self::Entity { .. } => ResourceKind::Entity,
            Self::Source { .. } => ResourceKind::Source,
            Self::Table(_) => ResourceKind::Table,
            Self::Feature(_) => ResourceKind::Feature,
            Self::FeatureSet(_) => ResourceKind::FeatureSet,
        }
    }
}

/// Resolved table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedTable {
    /// Resource name
    pub name: String,
    /// Human description
    pub description: String,
    /// Raw or derived lineage
    pub lineage: TableLineage,
    /// Event descriptor
    pub event: Option<ResolvedEvent>,
}

/// Lineage of a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableLineage {
    /// Physical table inside a source
    Raw {
        /// Source node
        source: Handle,
        /// Physical table name
        table_name: String,
    },
    /// SQL view over other tables
    Derived {
        /// Upstream tables, in author order
        sources: Vec<Handle>,
        /// Opaque SQL expression
        expression: String,
    },
}

/// Resolved event descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedEvent {
    /// Entity key columns, in author order
    pub entities: Vec<EntityBinding>,
    /// Timestamp column
    pub timestamp_column: String,
}

/// An entity bound to the column holding its key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityBinding {
    /// Entity node
    pub entity: Handle,
    /// Key column
    pub column: String,
}

/// Resolved feature
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedFeature {
    /// Resource name
    pub name: String,
    /// Human description
    pub description: String,
    /// Aggregation
    pub aggregation: Option<Aggregation>,
    /// Opaque select expression
    pub select: String,
    /// Opaque post-aggregation expression
    pub post_aggregation: Option<String>,
    /// Time window in days
    pub days: Option<u32>,
    /// Table or feature lineage
    pub lineage: FeatureLineage,
    /// Owning entity
    pub entity: Option<Handle>,
}

/// Lineage of a feature; exactly one kind is present
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureLineage {
    /// Aggregated directly from a table
    Table(Handle),
    /// Derived over other features
    Over(Vec<Handle>),
}

/// Resolved feature set
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedFeatureSet {
    /// Resource name
    pub name: String,
    /// Human description
    pub description: String,
    /// Scoping entity
    pub entity: Handle,
    /// Members in author order, duplicates kept
    pub features: Vec<Handle>,
}
