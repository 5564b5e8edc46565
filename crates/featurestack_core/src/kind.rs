//! Resource kinds and the legal dependency relation between them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a declared definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Business key domain
    Entity,
    /// Externally managed raw data source, looked up by name
    Source,
    /// Raw table or derived view
    Table,
    /// Computed feature
    Feature,
    /// Named group of features scoped to one entity
    FeatureSet,
}

impl ResourceKind {
    /// All kinds, in declaration-document order
    pub const ALL: [ResourceKind; 5] = [
        Self::Entity,
        Self::Source,
        Self::Table,
        Self::Feature,
        Self::FeatureSet,
    ];

    /// Stable lowercase name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Entity => "entity",
            Self::Source => "source",
            Self::Table => "table",
            Self::Feature => "feature",
            Self::FeatureSet => "feature_set",
        }
    }

    /// Whether a definition of this kind may depend on one of `upstream` kind.
    ///
    /// Entities and sources are roots and depend on nothing.
    #[must_use]
    pub const fn may_depend_on(&self, upstream: ResourceKind) -> bool {
        matches!(
            (self, upstream),
            (Self::Table, Self::Source)
                | (Self::Table, Self::Table)
                | (Self::Table, Self::Entity)
                | (Self::Feature, Self::Table)
                | (Self::Feature, Self::Feature)
                | (Self::Feature, Self::Entity)
                | (Self::FeatureSet, Self::Feature)
                | (Self::FeatureSet, Self::Entity)
        )
    }

    /// Whether this kind is always a graph root
    #[must_use]
    pub const fn is_root(&self) -> bool {
        matches!(self, Self::Entity | Self::Source)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
