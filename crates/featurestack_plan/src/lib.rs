//! featurestack planner
//!
//! Compiles declarative feature-platform definitions (entities, sources,
//! tables, features, feature sets) into a validated, dependency-ordered plan.
//! Ids are registered, references resolved, a dependency graph built, and
//! the graph ordered deterministically, in that order.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod compiler;
pub mod dag;
pub mod definition;
pub mod node;
pub mod planner;
pub mod registry;
pub mod resolve;

pub use compiler::{CompileError, CompiledPlan, Compiler, CompilerConfig, CompilerWarning, PlanDocument, PlanStep};
pub use dag::{Edge, Graph};
pub use definition::{
    Aggregation, Declarations, Definition, EntityDef, FeatureDef, FeatureSetDef, SourceDef, TableDef, TableEvent,
    TableSource,
};
pub use node::{
    EntityBinding, FeatureLineage, NodePayload, Reference, ResolvedEvent, ResolvedFeature, ResolvedFeatureSet,
    ResolvedNode, ResolvedTable, TableLineage,
};
pub use planner::Planner;
pub use registry::{Registry, RegistryEntry, RegistryError};
pub use resolve::Resolver;
