//! Backend-facing resource attributes.
//!
//! A resolved node refers to its dependencies by handle. Before a node is
//! handed to the backend every handle is swapped for the id the backend
//! assigned to that dependency.

use featurestack_core::{BackendId, Handle, ResourceKind};
use featurestack_plan::{Aggregation, FeatureLineage, NodePayload, ResolvedNode, TableLineage};
use serde::Serialize;

/// Attributes of a resource as the backend sees them
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceAttributes {
    /// Entity
    Entity {
        /// Resource name
        name: String,
        /// Human description
        description: String,
        /// Default grouping column
        default_column: Option<String>,
    },
    /// Existing source
    Source {
        /// External source name
        name: String,
    },
    /// Table or view
    Table {
        /// Resource name
        name: String,
        /// Human description
        description: String,
        /// Source and physical table, for raw tables
        source: Option<SourceTable>,
        /// Upstream tables, for views
        sources: Vec<BackendId>,
        /// View expression
        expression: Option<String>,
        /// Event descriptor
        event: Option<EventAttributes>,
    },
    /// Feature
    Feature {
        /// Resource name
        name: String,
        /// Human description
        description: String,
        /// Aggregation
        aggregation: Option<Aggregation>,
        /// Select expression
        select: String,
        /// Post-aggregation expression
        post_aggregation: Option<String>,
        /// Time window in days
        days: Option<u32>,
        /// Table the feature aggregates
        table: Option<BackendId>,
        /// Features this one is derived over
        over: Vec<BackendId>,
        /// Owning entity
        entity: Option<BackendId>,
    },
    /// Feature set
    FeatureSet {
        /// Resource name
        name: String,
        /// Human description
        description: String,
        /// Scoping entity
        entity: BackendId,
        /// Member features in author order
        features: Vec<BackendId>,
    },
}

/// Physical table inside a source
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceTable {
    /// Source backend id
    pub source: BackendId,
    /// Physical table name
    pub table_name: String,
}

/// Event descriptor with entity ids substituted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventAttributes {
    /// Entity backend id and key column pairs
    pub entities: Vec<(BackendId, String)>,
    /// Timestamp column
    pub timestamp_column: String,
}

impl ResourceAttributes {
    /// Build the attributes of a node.
    ///
    /// `lookup` maps a dependency handle to its backend id.
    ///
    /// # Errors
    ///
    /// Returns the first handle `lookup` has no id for
    pub fn resolve<F>(node: &ResolvedNode, lookup: F) -> Result<Self, Handle>
    where
        F: Fn(Handle) -> Option<BackendId>,
    {
        let id = |handle: Handle| lookup(handle).ok_or(handle);
        let ids = |handles: &[Handle]| handles.iter().map(|h| id(*h)).collect::<Result<Vec<_>, _>>();

        let attributes = match &node.payload {
            NodePayload::Entity {
                name,
                description,
                default_column,
            } => Self::Entity {
                name: name.clone(),
                description: description.clone(),
                default_column: default_column.clone(),
            },
            NodePayload::Source { name } => Self::Source { name: name.clone() },
            NodePayload::Table(table) => {
                let (source, sources, expression) = match &table.lineage {
                    TableLineage::Raw { source, table_name } => (
                        Some(SourceTable {
                            source: id(*source)?,
                            table_name: table_name.clone(),
                        }),
                        Vec::new(),
                        None,
                    ),
                    TableLineage::Derived { sources, expression } => {
                        (None, ids(sources)?, Some(expression.clone()))
                    }
                };
                let event = match &table.event {
                    Some(event) => Some(EventAttributes {
                        entities: event
                            .entities
                            .iter()
                            .map(|b| Ok((id(b.entity)?, b.column.clone())))
                            .collect::<Result<Vec<_>, Handle>>()?,
                        timestamp_column: event.timestamp_column.clone(),
                    }),
                    None => None,
                };
                Self::Table {
                    name: table.name.clone(),
                    description: table.description.clone(),
                    source,
                    sources,
                    expression,
                    event,
                }
            }
            NodePayload::Feature(feature) => {
                let (table, over) = match &feature.lineage {
                    FeatureLineage::Table(table) => (Some(id(*table)?), Vec::new()),
                    FeatureLineage::Over(over) => (None, ids(over)?),
                };
                Self::Feature {
                    name: feature.name.clone(),
                    description: feature.description.clone(),
                    aggregation: feature.aggregation,
                    select: feature.select.clone(),
                    post_aggregation: feature.post_aggregation.clone(),
                    days: feature.days,
                    table,
                    over,
                    entity: feature.entity.map(id).transpose()?,
                }
            }
            NodePayload::FeatureSet(set) => Self::FeatureSet {
                name: set.name.clone(),
                description: set.description.clone(),
                entity: id(set.entity)?,
                features: ids(&set.features)?,
            },
        };

        Ok(attributes)
    }

    /// Kind of resource described
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        match self {
            Self::Entity { .. } => ResourceKind::Entity,
            Self::Source { .. } => ResourceKind::Source,
            Self::Table { .. } => ResourceKind::Table,
            Self::Feature { .. } => ResourceKind::Feature,
            Self::FeatureSet { .. } => ResourceKind::FeatureSet,
        }
    }

    /// Resource name
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Entity { name, .. }
            | Self::Source { name }
            | Self::Table { name, .. }
            | Self::Feature { name, .. }
            | Self::FeatureSet { name, .. } => name,
        }
    }
}
