//! Identifiers for featurestack definitions.
//!
//! Three id spaces exist:
//! - [`DeclaredId`]: the free-form string an author chose for a definition
//! - [`Handle`]: a dense index assigned by the registry, used for graph storage
//! - [`BackendId`]: the identifier a provisioning backend assigned to a resource

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Author-chosen identifier of a definition, unique within one build
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeclaredId(String);

impl DeclaredId {
    /// Create a declared id
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check if the id is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for DeclaredId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeclaredId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for DeclaredId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Borrow<str> for DeclaredId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for DeclaredId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Engine-assigned dense index of a registered definition.
///
/// Handles are handed out in registration order, so comparing two handles
/// compares their registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Handle(u32);

impl Handle {
    /// Create from a raw index
    #[must_use]
    pub const fn from_index(index: usize) -> Self {
        Self(index as u32)
    }

    /// Get the index into dense storage
    #[must_use]
    pub const fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifier assigned to a resource by the provisioning backend
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackendId(String);

impl BackendId {
    /// Create a backend id
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
