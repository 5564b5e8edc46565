//! Reference resolver.
//!
//! Turns definition records into [`ResolvedNode`]s against the current
//! registry. Every reference field is checked for existence and kind, and
//! every structural rule of a single definition is enforced. Problems are
//! collected across all definitions rather than stopping at the first one.

use crate::definition::{Definition, EntityDef, FeatureDef, FeatureSetDef, SourceDef, TableDef};
use crate::node::{
    EntityBinding, FeatureLineage, NodePayload, ResolvedEvent, ResolvedFeature,
    ResolvedFeatureSet, ResolvedNode, ResolvedTable, TableLineage,
};
use crate::registry::Registry;
use featurestack_core::{DeclaredId, DefinitionError, Handle, ResourceKind};

/// Resolves definitions against a registry
pub struct Resolver<'a> {
    registry: &'a Registry,
}

impl<'a> Resolver<'a> {
    /// Create a resolver over a populated registry
    #[must_use]
    pub fn new(registry: &'a Registry) -> Self {
        Self { registry }
    }

    /// Resolve a batch of registered definitions.
    ///
    /// # Errors
    ///
    /// Returns every problem found across the whole batch
    pub fn resolve_all<'d, I>(&self, definitions: I) -> Result<Vec<ResolvedNode>, Vec<DefinitionError>>
    where
        I: IntoIterator<Item = (Handle, &'d Definition)>,
    {
        let mut nodes = Vec::new();
        let mut errors = Vec::new();

        for (handle, definition) in definitions {
            match self.resolve(handle, definition) {
                Ok(node) => nodes.push(node),
                Err(mut problems) => errors.append(&mut problems),
            }
        }

        if errors.is_empty() {
            Ok(nodes)
        } else {
            Err(errors)
        }
    }

    /// Resolve a single definition
    ///
    /// # Errors
    ///
    /// Returns every problem found in the definition
    pub fn resolve(&self, handle: Handle, definition: &Definition) -> Result<ResolvedNode, Vec<DefinitionError>> {
        let mut check = Check::new(self.registry, definition.id());
        check.require_text("name", definition.name());

        let payload = match definition {
            Definition::Entity(def) => Some(Self::entity(def)),
            Definition::Source(def) => Some(Self::source(def)),
            Definition::Table(def) => Self::table(&mut check, def),
            Definition::Feature(def) => Self::feature(&mut check, def),
            Definition::FeatureSet(def) => Self::feature_set(&mut check, def),
        };

        match payload {
            Some(payload) if check.errors.is_empty() => Ok(ResolvedNode {
                handle,
                id: definition.id().clone(),
                payload,
            }),
            _ => Err(check.errors),
        }
    }

    fn entity(def: &EntityDef) -> NodePayload {
        NodePayload::Entity {
            name: def.name.clone(),
            description: def.description.clone(),
            default_column: def.default_column.clone(),
        }
    }

    fn source(def: &SourceDef) -> NodePayload {
        NodePayload::Source {
            name: def.name.clone(),
        }
    }

    fn table(check: &mut Check<'_>, def: &TableDef) -> Option<NodePayload> {
        let lineage = match (&def.source, def.sources.is_empty()) {
            (Some(raw), true) => {
                if def.expression.is_some() {
                    check.invalid("expression", "raw table cannot carry an expression");
                }
                check.require_text("source.table_name", &raw.table_name);
                check
                    .reference(ResourceKind::Source, "source.source", &raw.source)
                    .map(|source| TableLineage::Raw {
                        source,
                        table_name: raw.table_name.clone(),
                    })
            }
            (None, false) => {
                let expression = def.expression.as_deref().unwrap_or_default();
                if expression.trim().is_empty() {
                    check.invalid("expression", "derived table needs a non-empty expression");
                }
                check
                    .references(ResourceKind::Table, "sources", &def.sources)
                    .map(|sources| TableLineage::Derived {
                        sources,
                        expression: expression.to_string(),
                    })
            }
            (Some(_), false) => {
                check.invalid(
                    "sources",
                    "table declares both `source` and `sources`; exactly one lineage is allowed",
                );
                None
            }
            (None, true) => {
                if def.expression.is_some() {
                    check.invalid("sources", "derived table needs at least one source table");
                } else {
                    check.invalid("source", "table declares neither `source` nor `sources`");
                }
                None
            }
        };

        let event = match &def.event {
            None => Some(None),
            Some(event) => {
                check.require_text("event.timestamp_column", &event.timestamp_column);
                if event.entities.is_empty() {
                    check.invalid("event.entities", "event needs at least one entity");
                }
                let mut bindings = Some(Vec::with_capacity(event.entities.len()));
                for (i, (entity, column)) in event.entities.iter().enumerate() {
                    let field = format!("event.entities[{}]", i);
                    check.require_text(&field, column);
                    match check.reference(ResourceKind::Entity, &field, entity) {
                        Some(entity) => {
                            if let Some(b) = bindings.as_mut() {
                                b.push(EntityBinding {
                                    entity,
                                    column: column.clone(),
                                });
                            }
                        }
                        None => bindings = None,
                    }
                }
                bindings.map(|entities| {
                    Some(ResolvedEvent {
                        entities,
                        timestamp_column: event.timestamp_column.clone(),
                    })
                })
            }
        };

        Some(NodePayload::Table(ResolvedTable {
            name: def.name.clone(),
            description: def.description.clone(),
            lineage: lineage?,
            event: event?,
        }))
    }

    fn feature(check: &mut Check<'_>, def: &FeatureDef) -> Option<NodePayload> {
        check.require_text("select", &def.select);
        if def.days == Some(0) {
            check.invalid("days", "time window must be at least one day");
        }

        let lineage = match (&def.table, def.over.is_empty()) {
            (Some(table), true) => {
                if def.aggregation.is_none() {
                    check.invalid("aggregation", "table-lineage feature needs an aggregation");
                }
                check
                    .reference(ResourceKind::Table, "table", table)
                    .map(FeatureLineage::Table)
            }
            (None, false) => {
                if def.entity.is_none() {
                    check.invalid("entity", "feature derived over other features needs an `entity`");
                }
                check
                    .references(ResourceKind::Feature, "over", &def.over)
                    .map(FeatureLineage::Over)
            }
            (Some(_), false) => {
                check.invalid(
                    "over",
                    "feature declares both `table` and `over`; exactly one lineage is allowed",
                );
                None
            }
            (None, true) => {
                check.invalid("table", "feature declares neither `table` nor `over`");
                None
            }
        };

        let entity = match &def.entity {
            None => Some(None),
            Some(id) => check.reference(ResourceKind::Entity, "entity", id).map(Some),
        };

        Some(NodePayload::Feature(ResolvedFeature {
            name: def.name.clone(),
            description: def.description.clone(),
            aggregation: def.aggregation,
            select: def.select.clone(),
            post_aggregation: def.post_aggregation.clone(),
            days: def.days,
            lineage: lineage?,
            entity: entity?,
        }))
    }

    fn feature_set(check: &mut Check<'_>, def: &FeatureSetDef) -> Option<NodePayload> {
        if def.features.is_empty() {
            check.invalid("features", "feature set needs at least one feature");
        }
        let entity = check.reference(ResourceKind::Entity, "entity", &def.entity);
        let features = check.references(ResourceKind::Feature, "features", &def.features);

        Some(NodePayload::FeatureSet(ResolvedFeatureSet {
            name: def.name.clone(),
            description: def.description.clone(),
            entity: entity?,
            features: features?,
        }))
    }
}

/// Problem collector for one definition
struct Check<'a> {
    registry: &'a Registry,
    node: &'a DeclaredId,
    errors: Vec<DefinitionError>,
}

impl<'a> Check<'a> {
    fn new(registry: &'a Registry, node: &'a DeclaredId) -> Self {
        Self {
            registry,
            node,
            errors: Vec::new(),
        }
    }

    fn invalid(&mut self, field: &str, reason: &str) {
        self.errors.push(DefinitionError::InvalidDefinition {
            node: self.node.clone(),
            field: field.to_string(),
            reason: reason.to_string(),
        });
    }

    fn require_text(&mut self, field: &str, value: &str) {
        if value.trim().is_empty() {
            self.invalid(field, "must not be empty");
        }
    }

    fn reference(&mut self, kind: ResourceKind, field: &str, id: &DeclaredId) -> Option<Handle> {
        match self.registry.lookup(kind, id) {
            Ok(handle) => Some(handle),
            Err(e) => {
                self.errors.push(e.into_definition_error(self.node, field));
                None
            }
        }
    }

    /// Resolve a list field; every element is checked even after a failure
    fn references(&mut self, kind: ResourceKind, field: &str, ids: &[DeclaredId]) -> Option<Vec<Handle>> {
        let mut handles = Vec::with_capacity(ids.len());
        let mut ok = true;
        for (i, id) in ids.iter().enumerate() {
            match self.reference(kind, &format!("{}[{}]", field, i), id) {
                Some(h) => handles.push(h),
                None => ok = false,
            }
        }
        ok.then_some(handles)
    }
}
