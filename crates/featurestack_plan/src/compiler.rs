//! Compiler from declarations to an ordered plan.
//!
//! Stages run strictly in sequence and each one aborts the build if it found
//! problems: register ids, resolve references, build the graph, order it.
//! Nothing here talks to a backend.

use crate::dag::Graph;
use crate::definition::{Declarations, Definition};
use crate::node::{NodePayload, ResolvedNode};
use crate::planner::Planner;
use crate::registry::Registry;
use crate::resolve::Resolver;
use featurestack_core::{DeclaredId, DefinitionError, Handle, Hash, HashError, ResourceKind};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Compiler configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerConfig {
    /// Warn about tables nothing consumes
    pub warn_unused_tables: bool,
}

impl CompilerConfig {
    /// Set whether unused tables produce warnings
    #[must_use]
    pub fn with_warn_unused_tables(mut self, warn: bool) -> Self {
        self.warn_unused_tables = warn;
        self
    }
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            warn_unused_tables: true,
        }
    }
}

/// Compilation warning
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum CompilerWarning {
    /// A feature appears more than once in a feature set
    DuplicateMember {
        /// Feature set id
        feature_set: DeclaredId,
        /// Repeated feature id
        feature: DeclaredId,
    },
    /// No table or feature reads from this table
    UnusedTable {
        /// Table id
        table: DeclaredId,
    },
}

impl fmt::Display for CompilerWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateMember { feature_set, feature } => {
                write!(f, "feature set `{}` lists `{}` more than once", feature_set, feature)
            }
            Self::UnusedTable { table } => write!(f, "table `{}` is not used by any table or feature", table),
        }
    }
}

/// Every problem that stopped a build
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompileError {
    /// Problems in discovery order
    pub errors: Vec<DefinitionError>,
}

impl CompileError {
    fn new(errors: Vec<DefinitionError>) -> Self {
        Self { errors }
    }

    /// Number of problems
    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Check if there are no problems
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Iterate over the problems
    pub fn iter(&self) -> impl Iterator<Item = &DefinitionError> {
        self.errors.iter()
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} definition error(s)", self.errors.len())?;
        for error in &self.errors {
            write!(f, "\n  [{}] {}", error.code(), error)?;
        }
        Ok(())
    }
}

impl std::error::Error for CompileError {}

impl From<Vec<DefinitionError>> for CompileError {
    fn from(errors: Vec<DefinitionError>) -> Self {
        Self::new(errors)
    }
}

/// A validated, dependency-ordered plan
#[derive(Debug, Clone)]
pub struct CompiledPlan {
    registry: Registry,
    graph: Graph,
    order: Vec<Handle>,
    warnings: Vec<CompilerWarning>,
}

impl CompiledPlan {
    /// Handles in emission order
    #[must_use]
    pub fn order(&self) -> &[Handle] {
        &self.order
    }

    /// Nodes in emission order
    pub fn steps(&self) -> impl Iterator<Item = &ResolvedNode> {
        self.order.iter().filter_map(|h| self.graph.node(*h))
    }

    /// Declared ids in emission order
    #[must_use]
    pub fn ids(&self) -> Vec<&DeclaredId> {
        self.steps().map(|n| &n.id).collect()
    }

    /// The dependency graph
    #[must_use]
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// The registry the plan was built against
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Non-fatal findings
    #[must_use]
    pub fn warnings(&self) -> &[CompilerWarning] {
        &self.warnings
    }

    /// Number of steps
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Check if the plan is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Serializable view of the plan
    #[must_use]
    pub fn document(&self) -> PlanDocument<'_> {
        let steps = self
            .steps()
            .enumerate()
            .map(|(position, node)| PlanStep {
                position,
                id: &node.id,
                kind: node.kind(),
                depends_on: self
                    .graph
                    .dependencies(node.handle)
                    .iter()
                    .map(|h| self.registry.id(*h))
                    .collect(),
                payload: &node.payload,
            })
            .collect();

        PlanDocument { steps }
    }

    /// BLAKE3 fingerprint of the plan document
    ///
    /// # Errors
    ///
    /// Returns error if the document cannot be encoded
    pub fn fingerprint(&self) -> Result<Hash, HashError> {
        Hash::of_json(&self.document())
    }
}

/// Serializable plan
#[derive(Debug, Clone, Serialize)]
pub struct PlanDocument<'a> {
    /// Steps in emission order
    pub steps: Vec<PlanStep<'a>>,
}

/// One step of a serialized plan
#[derive(Debug, Clone, Serialize)]
pub struct PlanStep<'a> {
    /// Position in the plan
    pub position: usize,
    /// Declared id
    pub id: &'a DeclaredId,
    /// Kind
    pub kind: ResourceKind,
    /// Direct dependencies
    pub depends_on: Vec<&'a DeclaredId>,
    /// Resolved payload
    pub payload: &'a NodePayload,
}

/// Compiler for transforming declarations into a plan
#[derive(Debug, Clone, Default)]
pub struct Compiler {
    config: CompilerConfig,
}

impl Compiler {
    /// Create a new compiler
    #[must_use]
    pub fn new(config: CompilerConfig) -> Self {
        Self { config }
    }

    /// Compile declarations into an ordered plan
    ///
    /// # Errors
    ///
    /// Returns every problem found by the first stage that found any
    #[tracing::instrument(skip_all, fields(definitions = declarations.len()))]
    pub fn compile(&self, declarations: &Declarations) -> Result<CompiledPlan, CompileError> {
        let (registry, registered) = Self::register(declarations)?;
        tracing::debug!(registered = registry.len(), "identifiers registered");

        let nodes = Resolver::new(&registry).resolve_all(registered)?;
        let graph = Graph::build(nodes)?;
        let order = Planner::new()
            .plan(&graph)
            .map_err(|e| CompileError::new(vec![e]))?;

        let warnings = self.warnings(&graph);
        for warning in &warnings {
            tracing::warn!(%warning, "compiler warning");
        }

        Ok(CompiledPlan {
            registry,
            graph,
            order,
            warnings,
        })
    }

    /// Register every declared id; any duplicate aborts the build
    fn register(declarations: &Declarations) -> Result<(Registry, Vec<(Handle, &Definition)>), CompileError> {
        let mut registry = Registry::new();
        let mut registered = Vec::with_capacity(declarations.len());
        let mut errors = Vec::new();

        for definition in &declarations.definitions {
            if definition.id().is_empty() {
                errors.push(DefinitionError::InvalidDefinition {
                    node: definition.id().clone(),
                    field: "id".to_string(),
                    reason: "must not be empty".to_string(),
                });
                continue;
            }

            match registry.register(definition.kind(), definition.id()) {
                Ok(handle) => registered.push((handle, definition)),
                Err(e) => errors.push(e.into_definition_error(definition.id(), "id")),
            }
        }

        if errors.is_empty() {
            Ok((registry, registered))
        } else {
            Err(CompileError::new(errors))
        }
    }

    fn warnings(&self, graph: &Graph) -> Vec<CompilerWarning> {
        let mut warnings = Vec::new();

        for node in graph.nodes() {
            match &node.payload {
                NodePayload::FeatureSet(set) => {
                    let mut seen = IndexSet::new();
                    let mut reported = IndexSet::new();
                    for feature in &set.features {
                        if !seen.insert(*feature) && reported.insert(*feature) {
                            if let Some(member) = graph.node(*feature) {
                                warnings.push(CompilerWarning::DuplicateMember {
                                    feature_set: node.id.clone(),
                                    feature: member.id.clone(),
                                });
                            }
                        }
                    }
                }
                NodePayload::Table(_)
                    if self.config.warn_unused_tables && graph.dependents(node.handle).is_empty() =>
                {
                    warnings.push(CompilerWarning::UnusedTable {
                        table: node.id.clone(),
                    });
                }
                _ => {}
            }
        }

        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{Aggregation, EntityDef, FeatureDef, FeatureSetDef, SourceDef, TableDef, TableEvent};

    /// The end-to-end example: E, S, T1 over S, T2 over T1, F1 over T2,
    /// F2 over F1, FS over [F1, F2]
    fn scenario() -> Declarations {
        Declarations::new()
            .entity(EntityDef::new("E", "customer").with_default_column("customer_sk"))
            .source(SourceDef::new("S", "tpcds_scale_1"))
            .table(TableDef::raw("T1", "customer_raw", "S", "customer"))
            .table(
                TableDef::view("T2", "customer", ["T1"], "SELECT * FROM customer_raw")
                    .with_event(TableEvent::new("review_date").with_entity("E", "c_customer_sk")),
            )
            .feature(FeatureDef::aggregate("F1", "max_spend", "T2", Aggregation::BasketSum, "named_struct('k', x)"))
            .feature(FeatureDef::over("F2", "big_spender", ["F1"], "E", "max_spend > 500"))
            .feature_set(FeatureSetDef::new("FS", "core", "E", ["F1", "F2"]))
    }

    fn ids(plan: &CompiledPlan) -> Vec<&str> {
        plan.ids().into_iter().map(DeclaredId::as_str).collect()
    }

    #[test]
    fn test_end_to_end_order() {
        let plan = Compiler::default().compile(&scenario()).unwrap();
        let order = ids(&plan);

        let without_entity: Vec<&str> = order.iter().copied().filter(|id| *id != "E").collect();
        assert_eq!(without_entity, vec!["S", "T1", "T2", "F1", "F2", "FS"]);

        let pos = |id: &str| order.iter().position(|x| *x == id).unwrap();
        assert!(pos("E") < pos("FS"));
        assert!(pos("E") < pos("T2"));
        assert!(plan.warnings().is_empty());
    }

    #[test]
    fn test_end_to_end_cycle() {
        let mut decls = scenario();
        for definition in &mut decls.definitions {
            if let Definition::Table(table) = definition {
                if table.id.as_str() == "T1" {
                    *table = TableDef::view("T1", "customer_raw", ["T2"], "SELECT * FROM customer");
                }
            }
        }

        let err = Compiler::default().compile(&decls).unwrap_err();
        assert_eq!(err.len(), 1);
        match &err.errors[0] {
            DefinitionError::CyclicDependency { cycle } => {
                let mut names: Vec<&str> = cycle.iter().map(DeclaredId::as_str).collect();
                names.sort();
                assert_eq!(names, vec!["T1", "T2"]);
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_ids_abort_before_resolution() {
        let decls = Declarations::new()
            .source(SourceDef::new("S", "tpcds"))
            .table(TableDef::raw("S", "dup", "S", "x"))
            .feature(FeatureDef::aggregate("F", "f", "missing", Aggregation::Sum, "x"));

        let err = Compiler::default().compile(&decls).unwrap_err();
        // only the duplicate is reported: resolution never ran
        assert_eq!(
            err.errors,
            vec![DefinitionError::DuplicateIdentifier {
                id: DeclaredId::from("S"),
                kind: ResourceKind::Table,
                existing: ResourceKind::Source,
            }]
        );
    }

    #[test]
    fn test_resolution_errors_are_batched() {
        let decls = Declarations::new()
            .entity(EntityDef::new("E", "customer"))
            .table(TableDef::raw("T1", "raw", "nope", "x"))
            .feature(FeatureDef::aggregate("F1", "f", "T1", Aggregation::Sum, "x"))
            .feature(FeatureDef::over("F2", "g", ["T1"], "E", "x"))
            .feature_set(FeatureSetDef::new("FS", "set", "E", ["ghost"]));

        let err = Compiler::default().compile(&decls).unwrap_err();
        let codes: Vec<&str> = err.iter().map(DefinitionError::code).collect();
        assert_eq!(
            codes,
            vec!["unknown_identifier", "reference_kind_mismatch", "unknown_identifier"]
        );
        assert!(err.to_string().starts_with("3 definition error(s)"));
    }

    #[test]
    fn test_empty_id_rejected() {
        let decls = Declarations::new().entity(EntityDef::new("", "customer"));
        let err = Compiler::default().compile(&decls).unwrap_err();
        assert!(matches!(
            &err.errors[0],
            DefinitionError::InvalidDefinition { field, .. } if field == "id"
        ));
    }

    #[test]
    fn test_warnings() {
        let decls = scenario()
            .table(TableDef::raw("T3", "orphan", "S", "store_sales"))
            .feature_set(FeatureSetDef::new("FS2", "dupes", "E", ["F1", "F2", "F1", "F1"]));

        let plan = Compiler::default().compile(&decls).unwrap();
        assert_eq!(
            plan.warnings(),
            &[
                CompilerWarning::UnusedTable { table: DeclaredId::from("T3") },
                CompilerWarning::DuplicateMember {
                    feature_set: DeclaredId::from("FS2"),
                    feature: DeclaredId::from("F1"),
                },
            ]
        );

        let quiet = Compiler::new(CompilerConfig::default().with_warn_unused_tables(false))
            .compile(&decls)
            .unwrap();
        assert_eq!(quiet.warnings().len(), 1);
    }

    #[test]
    fn test_duplicate_members_keep_author_order() {
        let decls = scenario().feature_set(FeatureSetDef::new("FS2", "dupes", "E", ["F2", "F1", "F2"]));
        let plan = Compiler::default().compile(&decls).unwrap();

        let set = plan.steps().find(|n| n.id.as_str() == "FS2").unwrap();
        match &set.payload {
            NodePayload::FeatureSet(s) => {
                let members: Vec<&str> = s.features.iter().map(|h| plan.registry().id(*h).as_str()).collect();
                assert_eq!(members, vec!["F2", "F1", "F2"]);
            }
            other => panic!("expected feature set, got {:?}", other),
        }
    }

    #[test]
    fn test_compile_is_idempotent() {
        let first = Compiler::default().compile(&scenario()).unwrap();
        let second = Compiler::default().compile(&scenario()).unwrap();

        assert_eq!(first.order(), second.order());
        assert_eq!(
            serde_json::to_vec(&first.document()).unwrap(),
            serde_json::to_vec(&second.document()).unwrap()
        );
        assert_eq!(first.fingerprint().unwrap(), second.fingerprint().unwrap());
    }

    #[test]
    fn test_document_lists_dependencies() {
        let plan = Compiler::default().compile(&scenario()).unwrap();
        let doc = plan.document();
        let fs = doc.steps.iter().find(|s| s.id.as_str() == "FS").unwrap();

        let deps: Vec<&str> = fs.depends_on.iter().map(|d| d.as_str()).collect();
        assert_eq!(deps, vec!["F1", "F2", "E"]);
        assert_eq!(fs.kind, ResourceKind::FeatureSet);
        assert_eq!(fs.position, doc.steps.len() - 1);
    }

    #[test]
    fn test_empty_declarations() {
        let plan = Compiler::default().compile(&Declarations::new()).unwrap();
        assert!(plan.is_empty());
    }
}
