//! Provisioning backend interface.

use crate::attributes::ResourceAttributes;
use async_trait::async_trait;
use featurestack_core::{BackendId, ResourceKind};
use std::sync::Arc;

/// Failure reported by a provisioning backend
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// An existing resource could not be found
    #[error("{kind} `{name}` not found")]
    NotFound {
        /// Kind looked up
        kind: ResourceKind,
        /// Name looked up
        name: String,
    },
    /// The backend refused the resource
    #[error("rejected: {message}")]
    Rejected {
        /// Backend message
        message: String,
    },
    /// The backend could not be reached
    #[error("unavailable: {message}")]
    Unavailable {
        /// Backend message
        message: String,
    },
}

/// External system that materializes resources.
///
/// The emitter calls it one node at a time, never before every dependency of
/// that node has been accepted. Retries and timeouts are the backend's
/// business.
#[async_trait]
pub trait ProvisioningBackend: Send + Sync {
    /// Declare a resource and return the id the backend assigned to it
    ///
    /// # Errors
    ///
    /// Returns error if the backend refuses or cannot be reached
    async fn declare_resource(
        &self,
        kind: ResourceKind,
        attributes: &ResourceAttributes,
    ) -> Result<BackendId, BackendError>;

    /// Look up a resource managed outside this build
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no resource of that kind has the name
    async fn lookup_existing_resource(&self, kind: ResourceKind, name: &str) -> Result<BackendId, BackendError>;
}

#[async_trait]
impl<T: ProvisioningBackend + ?Sized> ProvisioningBackend for Arc<T> {
    async fn declare_resource(
        &self,
        kind: ResourceKind,
        attributes: &ResourceAttributes,
    ) -> Result<BackendId, BackendError> {
        (**self).declare_resource(kind, attributes).await
    }

    async fn lookup_existing_resource(&self, kind: ResourceKind, name: &str) -> Result<BackendId, BackendError> {
        (**self).lookup_existing_resource(kind, name).await
    }
}
