//! Declarative definition records.
//!
//! These are the loosely-referencing records an author writes. References
//! are plain [`DeclaredId`]s; nothing here is checked until the records are
//! registered and resolved. A [`Declarations`] document keeps the author's
//! order, which becomes the registration order used to break planning ties.

use featurestack_core::{DeclaredId, ResourceKind};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One declared definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Definition {
    /// Business key domain
    Entity(EntityDef),
    /// Existing raw data source
    Source(SourceDef),
    /// Raw table or derived view
    Table(TableDef),
    /// Computed feature
    Feature(FeatureDef),
    /// Named group of features
    FeatureSet(FeatureSetDef),
}

impl Definition {
    /// Declared id of the definition
    #[must_use]
    pub fn id(&self) -> &DeclaredId {
        match self {
            Self::Entity(d) => &d.id,
            Self::Source(d) => &d.id,
            Self::Table(d) => &d.id,
            Self::Feature(d) => &d.id,
            Self::FeatureSet(d) => &d.id,
        }
    }

    /// Kind of the definition
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        match self {
            Self::Entity(_) => ResourceKind::Entity,
            Self::Source(_) => ResourceKind::Source,
            Self::Table(_) => ResourceKind::Table,
            Self::Feature(_) => ResourceKind::Feature,
            Self::FeatureSet(_) => ResourceKind::FeatureSet,
        }
    }

    /// Resource name the backend will see
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Entity(d) => &d.name,
            Self::Source(d) => &d.name,
            Self::Table(d) => &d.name,
            Self::Feature(d) => &d.name,
            Self::FeatureSet(d) => &d.name,
        }
    }
}

/// A business key domain, e.g. a customer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDef {
    /// Declared id
    pub id: DeclaredId,
    /// Resource name
    pub name: String,
    /// Human description
    #[serde(default)]
    pub description: String,
    /// Default grouping column
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_column: Option<String>,
}

impl EntityDef {
    /// Create an entity definition
    #[must_use]
    pub fn new(id: impl Into<DeclaredId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            default_column: None,
        }
    }

    /// Set description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the default grouping column
    #[must_use]
    pub fn with_default_column(mut self, column: impl Into<String>) -> Self {
        self.default_column = Some(column.into());
        self
    }
}

/// Reference to an externally-managed data source, looked up by name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDef {
    /// Declared id
    pub id: DeclaredId,
    /// Name of the existing source in the backend
    pub name: String,
}

impl SourceDef {
    /// Create a source reference
    #[must_use]
    pub fn new(id: impl Into<DeclaredId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Physical table inside a source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSource {
    /// Source id
    pub source: DeclaredId,
    /// Physical table name inside the source
    pub table_name: String,
}

/// Binds a table's rows to entities at a point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableEvent {
    /// Entity id to the column holding that entity's key
    ///
    /// A document that names the same entity twice is rejected at parse time.
    #[serde(deserialize_with = "deserialize_unique_entities")]
    pub entities: IndexMap<DeclaredId, String>,
    /// Column holding the event timestamp
    pub timestamp_column: String,
}

fn deserialize_unique_entities<'de, D>(deserializer: D) -> Result<IndexMap<DeclaredId, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de;

    struct UniqueEntitiesVisitor;

    impl<'de> de::Visitor<'de> for UniqueEntitiesVisitor {
        type Value = IndexMap<DeclaredId, String>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a map of entity ids to key columns")
        }

        fn visit_map<A: de::MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut entities = IndexMap::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((entity, column)) = map.next_entry::<DeclaredId, String>()? {
                if entities.contains_key(&entity) {
                    return Err(de::Error::custom(format!("duplicate event entity `{}`", entity)));
                }
                entities.insert(entity, column);
            }
            Ok(entities)
        }
    }

    deserializer.deserialize_map(UniqueEntitiesVisitor)
}

impl TableEvent {
    /// Create an event descriptor with no entities yet
    #[must_use]
    pub fn new(timestamp_column: impl Into<String>) -> Self {
        Self {
            entities: IndexMap::new(),
            timestamp_column: timestamp_column.into(),
        }
    }

    /// Bind an entity to its key column
    #[must_use]
    pub fn with_entity(mut self, entity: impl Into<DeclaredId>, column: impl Into<String>) -> Self {
        self.entities.insert(entity.into(), column.into());
        self
    }
}

/// A raw table (`source`) or a derived view (`sources` + `expression`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDef {
    /// Declared id
    pub id: DeclaredId,
    /// Resource name
    pub name: String,
    /// Human description
    #[serde(default)]
    pub description: String,
    /// Raw lineage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<TableSource>,
    /// Derived lineage: upstream tables
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<DeclaredId>,
    /// Derived lineage: SQL expression, opaque to the planner
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    /// Optional event descriptor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<TableEvent>,
}

impl TableDef {
    /// Create a raw table over a source
    #[must_use]
    pub fn raw(
        id: impl Into<DeclaredId>,
        name: impl Into<String>,
        source: impl Into<DeclaredId>,
        table_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            source: Some(TableSource {
                source: source.into(),
                table_name: table_name.into(),
            }),
            sources: Vec::new(),
            expression: None,
            event: None,
        }
    }

    /// Create a derived view over other tables
    #[must_use]
    pub fn view<I, S>(
        id: impl Into<DeclaredId>,
        name: impl Into<String>,
        sources: I,
        expression: impl Into<String>,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<DeclaredId>,
    {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            source: None,
            sources: sources.into_iter().map(Into::into).collect(),
            expression: Some(expression.into()),
            event: None,
        }
    }

    /// Set description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Attach an event descriptor
    #[must_use]
    pub fn with_event(mut self, event: TableEvent) -> Self {
        self.event = Some(event);
        self
    }
}

/// Aggregation applied by a table-lineage feature.
///
/// The planner passes it through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    /// Most recent value
    Last,
    /// Earliest value
    First,
    /// Sum of values
    Sum,
    /// Row count
    Count,
    /// Distinct value count
    CountDistinct,
    /// Minimum
    Min,
    /// Maximum
    Max,
    /// Mean
    Avg,
    /// Per-basket sums
    BasketSum,
    /// Per-basket latest values
    BasketLast,
    /// Percentile
    Percentile,
}

/// A feature aggregated from one table, or derived over other features
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureDef {
    /// Declared id
    pub id: DeclaredId,
    /// Resource name
    pub name: String,
    /// Human description
    #[serde(default)]
    pub description: String,
    /// Aggregation, required for table lineage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregation: Option<Aggregation>,
    /// Select expression, opaque to the planner
    pub select: String,
    /// Post-aggregation expression
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_aggregation: Option<String>,
    /// Time window in days
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days: Option<u32>,
    /// Direct lineage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<DeclaredId>,
    /// Derived lineage
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub over: Vec<DeclaredId>,
    /// Owning entity, required for derived lineage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<DeclaredId>,
}

impl FeatureDef {
    /// Create a feature aggregated from a table
    #[must_use]
    pub fn aggregate(
        id: impl Into<DeclaredId>,
        name: impl Into<String>,
        table: impl Into<DeclaredId>,
        aggregation: Aggregation,
        select: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            aggregation: Some(aggregation),
            select: select.into(),
            post_aggregation: None,
            days: None,
            table: Some(table.into()),
            over: Vec::new(),
            entity: None,
        }
    }

    /// Create a feature derived over other features
    #[must_use]
    pub fn over<I, S>(
        id: impl Into<DeclaredId>,
        name: impl Into<String>,
        over: I,
        entity: impl Into<DeclaredId>,
        select: impl Into<String>,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<DeclaredId>,
    {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            aggregation: None,
            select: select.into(),
            post_aggregation: None,
            days: None,
            table: None,
            over: over.into_iter().map(Into::into).collect(),
            entity: Some(entity.into()),
        }
    }

    /// Set description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the time window
    #[must_use]
    pub fn with_days(mut self, days: u32) -> Self {
        self.days = Some(days);
        self
    }

    /// Set the post-aggregation expression
    #[must_use]
    pub fn with_post_aggregation(mut self, expression: impl Into<String>) -> Self {
        self.post_aggregation = Some(expression.into());
        self
    }

    /// Set the owning entity
    #[must_use]
    pub fn with_entity(mut self, entity: impl Into<DeclaredId>) -> Self {
        self.entity = Some(entity.into());
        self
    }
}

/// An ordered group of features scoped to one entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSetDef {
    /// Declared id
    pub id: DeclaredId,
    /// Resource name
    pub name: String,
    /// Human description
    #[serde(default)]
    pub description: String,
    /// Entity the set is scoped to
    pub entity: DeclaredId,
    /// Member features, in author order
    pub features: Vec<DeclaredId>,
}

impl FeatureSetDef {
    /// Create a feature set
    #[must_use]
    pub fn new<I, S>(
        id: impl Into<DeclaredId>,
        name: impl Into<String>,
        entity: impl Into<DeclaredId>,
        features: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<DeclaredId>,
    {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            entity: entity.into(),
            features: features.into_iter().map(Into::into).collect(),
        }
    }

    /// Set description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Ordered declaration document for one build
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Declarations {
    /// Definitions in author order
    pub definitions: Vec<Definition>,
}

impl Declarations {
    /// Create an empty document
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON declaration document
    ///
    /// # Errors
    ///
    /// Returns error if the document is not valid JSON or has the wrong shape
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Add a definition
    pub fn push(&mut self, definition: Definition) {
        self.definitions.push(definition);
    }

    /// Add an entity
    #[must_use]
    pub fn entity(mut self, def: EntityDef) -> Self {
        self.push(Definition::Entity(def));
        self
    }

    /// Add a source reference
    #[must_use]
    pub fn source(mut self, def: SourceDef) -> Self {
        self.push(Definition::Source(def));
        self
    }

    /// Add a table
    #[must_use]
    pub fn table(mut self, def: TableDef) -> Self {
        self.push(Definition::Table(def));
        self
    }

    /// Add a feature
    #[must_use]
    pub fn feature(mut self, def: FeatureDef) -> Self {
        self.push(Definition::Feature(def));
        self
    }

    /// Add a feature set
    #[must_use]
    pub fn feature_set(mut self, def: FeatureSetDef) -> Self {
        self.push(Definition::FeatureSet(def));
        self
    }

    /// Number of definitions
    #[must_use]
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Check if the document is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
