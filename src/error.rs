//! Error types for capability host operations.

use thiserror::Error;

use crate::overlay::{ResourceId, ResourceKind};

/// Boxed error crossing the plugin/host boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while registering a capability.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistrationError {
    /// Key already present in the registry
    #[error("Capability already registered: {0}")]
    AlreadyRegistered(String),

    /// Key already recorded under a different owner
    #[error("Capability {key} already owned by {owner}")]
    DuplicateKey { key: String, owner: String },
}

/// Errors that can occur while resolving a resource.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The base resolver has no resource for the id
    #[error("Resource not found: {0:#x}")]
    NotFound(ResourceId),

    /// The resolved value does not have the requested kind
    #[error("Resource {id:#x} is {actual:?}, expected {expected:?}")]
    UnexpectedKind {
        id: ResourceId,
        expected: ResourceKind,
        actual: ResourceKind,
    },

    /// An override generator failed
    #[error("Override for resource {id:#x} failed: {source}")]
    OverrideFailed {
        id: ResourceId,
        #[source]
        source: BoxError,
    },

    /// The base resolver failed
    #[error("Base resolver error: {0}")]
    Base(#[source] BoxError),
}

/// Errors from the settings store.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Settings file is not valid JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Store cannot be reached
    #[error("Settings unavailable: {0}")]
    Unavailable(String),
}
