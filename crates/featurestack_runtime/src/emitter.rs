//! Plan emission.
//!
//! Walks a compiled plan and hands each node to a provisioning backend once
//! every one of its dependencies has been accepted. Sources are looked up,
//! every other kind is declared. When the backend rejects a node, all of its
//! downstream nodes are skipped while independent branches carry on.

use crate::attributes::ResourceAttributes;
use crate::backend::{BackendError, ProvisioningBackend};
use crate::scheduler::Scheduler;
use featurestack_core::{BackendId, DeclaredId, Handle, ResourceKind};
use featurestack_plan::CompiledPlan;
use futures::stream::{FuturesUnordered, StreamExt};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Emitter configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmitterConfig {
    /// Maximum number of backend calls outstanding at once; 0 is treated as 1
    pub max_in_flight: usize,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self { max_in_flight: 1 }
    }
}

impl EmitterConfig {
    /// Set the in-flight limit
    #[must_use]
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight;
        self
    }

    /// Effective in-flight limit
    #[must_use]
    pub fn in_flight_limit(&self) -> usize {
        self.max_in_flight.max(1)
    }
}

/// Why a node was not emitted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FailureReason {
    /// The backend rejected the node
    BackendFailure {
        /// Backend message
        message: String,
    },
    /// An upstream node failed so this one was never submitted
    SkippedDueToDependencyFailure {
        /// The upstream node the backend rejected
        failed_dependency: DeclaredId,
    },
}

/// A node that was not emitted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeFailure {
    /// Declared id
    pub id: DeclaredId,
    /// Resource kind
    pub kind: ResourceKind,
    /// Cause
    #[serde(flatten)]
    pub reason: FailureReason,
}

impl fmt::Display for NodeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            FailureReason::BackendFailure { message } => {
                write!(f, "{} `{}` failed: {}", self.kind, self.id, message)
            }
            FailureReason::SkippedDueToDependencyFailure { failed_dependency } => {
                write!(f, "{} `{}` skipped: dependency `{}` failed", self.kind, self.id, failed_dependency)
            }
        }
    }
}

/// Emission finished with at least one node not emitted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmissionError {
    /// Failed and skipped nodes, in plan order
    pub failures: Vec<NodeFailure>,
    /// Nodes the backend did accept, in plan order
    pub emitted: IndexMap<DeclaredId, BackendId>,
}

impl EmissionError {
    /// Nodes the backend rejected
    pub fn rejected(&self) -> impl Iterator<Item = &NodeFailure> {
        self.failures
            .iter()
            .filter(|f| matches!(f.reason, FailureReason::BackendFailure { .. }))
    }

    /// Nodes skipped because of an upstream failure
    pub fn skipped(&self) -> impl Iterator<Item = &NodeFailure> {
        self.failures
            .iter()
            .filter(|f| matches!(f.reason, FailureReason::SkippedDueToDependencyFailure { .. }))
    }
}

impl fmt::Display for EmissionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} resource(s) not emitted, {} emitted",
            self.failures.len(),
            self.emitted.len()
        )?;
        for failure in &self.failures {
            write!(f, "\n  {}", failure)?;
        }
        Ok(())
    }
}

impl std::error::Error for EmissionError {}

/// Successful emission
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmissionOutcome {
    /// Backend id of every node, in plan order
    pub resources: IndexMap<DeclaredId, BackendId>,
}

impl EmissionOutcome {
    /// Backend id assigned to a declared id
    #[must_use]
    pub fn get(&self, id: &DeclaredId) -> Option<&BackendId> {
        self.resources.get(id)
    }

    /// Number of emitted resources
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Check if nothing was emitted
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// Plan emitter
#[derive(Debug, Clone, Default)]
pub struct Emitter {
    config: EmitterConfig,
}

impl Emitter {
    /// Create an emitter
    #[must_use]
    pub fn new(config: EmitterConfig) -> Self {
        Self { config }
    }

    /// Emitter configuration
    #[must_use]
    pub const fn config(&self) -> &EmitterConfig {
        &self.config
    }

    /// Hand every node of the plan to the backend.
    ///
    /// A node is submitted only after all of its dependencies were accepted,
    /// with its references replaced by their backend ids. With an in-flight
    /// limit of 1 nodes are submitted exactly in plan order.
    ///
    /// # Errors
    ///
    /// Returns `EmissionError` listing every rejected and skipped node if any
    /// node was not emitted
    #[tracing::instrument(skip_all, fields(steps = plan.len(), max_in_flight = self.config.in_flight_limit()))]
    pub async fn emit<B>(&self, plan: &CompiledPlan, backend: &B) -> Result<EmissionOutcome, EmissionError>
    where
        B: ProvisioningBackend + ?Sized,
    {
        let graph = plan.graph();
        let limit = self.config.in_flight_limit();
        let mut progress = Progress {
            plan,
            scheduler: Scheduler::new(plan),
            assigned: vec![None; graph.node_count()],
            failures: Vec::new(),
        };
        let mut in_flight = FuturesUnordered::new();

        loop {
            while in_flight.len() < limit {
                let Some(handle) = progress.scheduler.next_ready() else {
                    break;
                };
                let Some(node) = graph.node(handle) else {
                    continue;
                };
                match ResourceAttributes::resolve(node, |h| progress.assigned[h.index()].clone()) {
                    Ok(attributes) => {
                        tracing::debug!(id = %node.id, kind = %node.kind(), "submitting resource");
                        in_flight.push(submit(backend, handle, attributes));
                    }
                    Err(missing) => {
                        let message = format!("dependency `{}` has no backend id", plan.registry().id(missing));
                        progress.fail(handle, message);
                    }
                }
            }

            let Some((handle, result)) = in_flight.next().await else {
                break;
            };
            match result {
                Ok(backend_id) => {
                    tracing::debug!(id = %plan.registry().id(handle), backend_id = %backend_id, "resource accepted");
                    progress.assigned[handle.index()] = Some(backend_id);
                    progress.scheduler.mark_complete(handle);
                }
                Err(err) => {
                    tracing::warn!(id = %plan.registry().id(handle), error = %err, "backend rejected resource");
                    progress.fail(handle, err.to_string());
                }
            }
        }

        progress.finish()
    }
}

async fn submit<B>(backend: &B, handle: Handle, attributes: ResourceAttributes) -> (Handle, Result<BackendId, BackendError>)
where
    B: ProvisioningBackend + ?Sized,
{
    let result = match &attributes {
        ResourceAttributes::Source { name } => backend.lookup_existing_resource(ResourceKind::Source, name).await,
        _ => backend.declare_resource(attributes.kind(), &attributes).await,
    };
    (handle, result)
}

/// Mutable state of one emission
struct Progress<'p> {
    plan: &'p CompiledPlan,
    scheduler: Scheduler<'p>,
    assigned: Vec<Option<BackendId>>,
    failures: Vec<(Handle, FailureReason)>,
}

impl Progress<'_> {
    fn fail(&mut self, handle: Handle, message: String) {
        self.failures.push((handle, FailureReason::BackendFailure { message }));

        let failed = self.plan.registry().id(handle).clone();
        for skipped in self.scheduler.mark_failed(handle) {
            tracing::info!(
                id = %self.plan.registry().id(skipped),
                failed_dependency = %failed,
                "skipping resource"
            );
            self.failures.push((
                skipped,
                FailureReason::SkippedDueToDependencyFailure {
                    failed_dependency: failed.clone(),
                },
            ));
        }
    }

    fn finish(self) -> Result<EmissionOutcome, EmissionError> {
        let registry = self.plan.registry();
        let mut position = vec![0; self.assigned.len()];
        for (i, handle) in self.plan.order().iter().enumerate() {
            position[handle.index()] = i;
        }

        let resources: IndexMap<DeclaredId, BackendId> = self
            .plan
            .order()
            .iter()
            .filter_map(|h| {
                self.assigned[h.index()]
                    .clone()
                    .map(|id| (registry.id(*h).clone(), id))
            })
            .collect();

        if self.failures.is_empty() && self.scheduler.is_complete() {
            tracing::info!(emitted = resources.len(), "emission finished");
            return Ok(EmissionOutcome { resources });
        }

        let mut failures = self.failures;
        failures.sort_by_key(|(h, _)| position[h.index()]);
        let failures: Vec<NodeFailure> = failures
            .into_iter()
            .map(|(h, reason)| NodeFailure {
                id: registry.id(h).clone(),
                kind: registry.kind(h),
                reason,
            })
            .collect();

        tracing::info!(
            emitted = resources.len(),
            failed = failures.len(),
            "emission finished with failures"
        );
        Err(EmissionError {
            failures,
            emitted: resources,
        })
    }
}
