//! Identifier registry.
//!
//! Assigns a dense [`Handle`] to every declared id and remembers its kind.
//! Handles follow registration order, which later stages use to break ties.

use featurestack_core::{DeclaredId, DefinitionError, Handle, ResourceKind};
use indexmap::IndexMap;

/// Error from registry operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Id already registered under some kind
    #[error("identifier already registered: {id} (declared as {kind}, registered as {existing})")]
    AlreadyRegistered {
        /// The repeated id
        id: DeclaredId,
        /// Kind of the rejected registration
        kind: ResourceKind,
        /// Kind of the first registration
        existing: ResourceKind,
    },
    /// Id not registered
    #[error("identifier not found: {id}")]
    NotFound {
        /// The missing id
        id: DeclaredId,
    },
    /// Id registered under a different kind
    #[error("identifier {id} is a {found}, expected {expected}")]
    KindMismatch {
        /// The id
        id: DeclaredId,
        /// Requested kind
        expected: ResourceKind,
        /// Registered kind
        found: ResourceKind,
    },
}

impl RegistryError {
    /// Attach the referencing definition and field, producing a definition error
    #[must_use]
    pub fn into_definition_error(self, node: &DeclaredId, field: impl Into<String>) -> DefinitionError {
        match self {
            Self::AlreadyRegistered { id, kind, existing } => {
                DefinitionError::DuplicateIdentifier { id, kind, existing }
            }
            Self::NotFound { id } => DefinitionError::UnknownIdentifier {
                node: node.clone(),
                field: field.into(),
                id,
            },
            Self::KindMismatch { id, expected, found } => DefinitionError::ReferenceKindMismatch {
                node: node.clone(),
                field: field.into(),
                id,
                expected,
                found,
            },
        }
    }
}

/// Entry for a registered id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    /// Declared id
    pub id: DeclaredId,
    /// Declared kind
    pub kind: ResourceKind,
}

/// Registry of declared ids for one build
#[derive(Debug, Clone, Default)]
pub struct Registry {
    /// Entries indexed by handle
    entries: Vec<RegistryEntry>,
    /// Declared id to handle
    index: IndexMap<DeclaredId, Handle>,
}

impl Registry {
    /// Create a new empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a declared id
    ///
    /// # Errors
    ///
    /// Returns error if the id is already registered, under any kind
    pub fn register(&mut self, kind: ResourceKind, id: &DeclaredId) -> Result<Handle, RegistryError> {
        if let Some(existing) = self.index.get(id) {
            return Err(RegistryError::AlreadyRegistered {
                id: id.clone(),
                kind,
                existing: self.entries[existing.index()].kind,
            });
        }

        let handle = Handle::from_index(self.entries.len());
        self.entries.push(RegistryEntry {
            id: id.clone(),
            kind,
        });
        self.index.insert(id.clone(), handle);
        Ok(handle)
    }

    /// Look up an id expected to be of the given kind
    ///
    /// # Errors
    ///
    /// Returns error if the id is unknown or registered under another kind
    pub fn lookup(&self, kind: ResourceKind, id: &DeclaredId) -> Result<Handle, RegistryError> {
        let handle = self.get(id).ok_or_else(|| RegistryError::NotFound { id: id.clone() })?;
        let found = self.entries[handle.index()].kind;
        if found != kind {
            return Err(RegistryError::KindMismatch {
                id: id.clone(),
                expected: kind,
                found,
            });
        }
        Ok(handle)
    }

    /// Get the handle of an id regardless of kind
    #[must_use]
    pub fn get(&self, id: &DeclaredId) -> Option<Handle> {
        self.index.get(id).copied()
    }

    /// Declared id of a handle
    ///
    /// Handles are only produced by this registry, so a handle from another
    /// registry may panic.
    #[must_use]
    pub fn id(&self, handle: Handle) -> &DeclaredId {
        &self.entries[handle.index()].id
    }

    /// Kind of a handle
    #[must_use]
    pub fn kind(&self, handle: Handle) -> ResourceKind {
        self.entries[handle.index()].kind
    }

    /// Entries in registration order
    pub fn iter(&self) -> impl Iterator<Item = (Handle, &RegistryEntry)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (Handle::from_index(i), entry))
    }

    /// Number of registered ids
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
