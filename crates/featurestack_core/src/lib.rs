//! featurestack core types
//!
//! This crate contains pure types with no I/O: the identifiers that flow
//! through every compile stage, the resource kinds, and the error taxonomy.
//! All types are serializable with stable encoding.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod hash;
pub mod id;
pub mod kind;

// Re-exports
pub use error::{CoreResult, DefinitionError};
pub use hash::{Hash, HashError};
pub use id::{BackendId, DeclaredId, Handle};
pub use kind::ResourceKind;
