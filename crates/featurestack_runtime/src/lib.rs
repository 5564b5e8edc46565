//! featurestack runtime
//!
//! Emits compiled plans to a provisioning backend. Nodes are submitted in
//! dependency order, optionally several independent branches at once, and a
//! backend failure skips everything downstream of the failed node.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod attributes;
pub mod backend;
pub mod emitter;
pub mod memory;
pub mod scheduler;

pub use attributes::{EventAttributes, ResourceAttributes, SourceTable};
pub use backend::{BackendError, ProvisioningBackend};
pub use emitter::{EmissionError, EmissionOutcome, Emitter, EmitterConfig, FailureReason, NodeFailure};
pub use memory::{BackendCall, InMemoryBackend};
pub use scheduler::{NodeState, ScheduleDecision, Scheduler};
