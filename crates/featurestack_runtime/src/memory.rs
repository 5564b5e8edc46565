//! In-memory provisioning backend.
//!
//! Used for dry runs and tests. Assigns ids of the form `<kind>-<n>` and
//! records every call in arrival order.

use crate::attributes::ResourceAttributes;
use crate::backend::{BackendError, ProvisioningBackend};
use async_trait::async_trait;
use featurestack_core::{BackendId, ResourceKind};
use indexmap::{IndexMap, IndexSet};
use std::time::Duration;
use tokio::sync::Mutex;

/// A call received by the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    /// `declare_resource`
    Declare {
        /// Declared kind
        kind: ResourceKind,
        /// Declared attributes
        attributes: ResourceAttributes,
    },
    /// `lookup_existing_resource`
    Lookup {
        /// Kind looked up
        kind: ResourceKind,
        /// Name looked up
        name: String,
    },
}

impl BackendCall {
    /// Resource name the call was about
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Declare { attributes, .. } => attributes.name(),
            Self::Lookup { name, .. } => name,
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    next_id: u64,
    existing: IndexMap<(ResourceKind, String), BackendId>,
    declared: IndexMap<BackendId, ResourceAttributes>,
    calls: Vec<BackendCall>,
    failing: IndexSet<String>,
}

impl MemoryState {
    fn assign(&mut self, kind: ResourceKind) -> BackendId {
        self.next_id += 1;
        BackendId::new(format!("{}-{}", kind, self.next_id))
    }
}

/// Backend that keeps everything in process memory
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    state: Mutex<MemoryState>,
    latency: Option<Duration>,
}

impl InMemoryBackend {
    /// Create an empty backend
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed a resource managed outside the build
    #[must_use]
    pub fn with_existing(mut self, kind: ResourceKind, name: impl Into<String>) -> Self {
        let state = self.state.get_mut();
        let id = state.assign(kind);
        state.existing.insert((kind, name.into()), id);
        self
    }

    /// Reject any call about a resource with this name
    #[must_use]
    pub fn failing_on(mut self, name: impl Into<String>) -> Self {
        self.state.get_mut().failing.insert(name.into());
        self
    }

    /// Delay every call
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Every call received, in arrival order
    pub async fn calls(&self) -> Vec<BackendCall> {
        self.state.lock().await.calls.clone()
    }

    /// Names of every call received, in arrival order
    pub async fn call_names(&self) -> Vec<String> {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .map(|c| c.name().to_string())
            .collect()
    }

    /// Attributes of a declared resource
    pub async fn declared(&self, id: &BackendId) -> Option<ResourceAttributes> {
        self.state.lock().await.declared.get(id).cloned()
    }

    /// Number of declared resources
    pub async fn declared_count(&self) -> usize {
        self.state.lock().await.declared.len()
    }

    async fn pause(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl ProvisioningBackend for InMemoryBackend {
    async fn declare_resource(
        &self,
        kind: ResourceKind,
        attributes: &ResourceAttributes,
    ) -> Result<BackendId, BackendError> {
        {
            let mut state = self.state.lock().await;
            state.calls.push(BackendCall::Declare {
                kind,
                attributes: attributes.clone(),
            });
        }
        self.pause().await;

        let mut state = self.state.lock().await;
        if state.failing.contains(attributes.name()) {
            return Err(BackendError::Rejected {
                message: format!("{} `{}` refused", kind, attributes.name()),
            });
        }
        let id = state.assign(kind);
        state.declared.insert(id.clone(), attributes.clone());
        Ok(id)
    }

    async fn lookup_existing_resource(&self, kind: ResourceKind, name: &str) -> Result<BackendId, BackendError> {
        {
            let mut state = self.state.lock().await;
            state.calls.push(BackendCall::Lookup {
                kind,
                name: name.to_string(),
            });
        }
        self.pause().await;

        let state = self.state.lock().await;
        if state.failing.contains(name) {
            return Err(BackendError::Unavailable {
                message: format!("lookup of {} `{}` failed", kind, name),
            });
        }
        state
            .existing
            .get(&(kind, name.to_string()))
            .cloned()
            .ok_or_else(|| BackendError::NotFound {
                kind,
                name: name.to_string(),
            })
    }
}
