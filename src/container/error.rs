//! # Container Errors
//!
//! Every error here is a wiring error: it means the dependency graph is broken and the
//! director must not start with a partially wired system.

use crate::framework::BoxError;

#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    #[error("{type_name} is already bound in the container")]
    DuplicateBinding { type_name: &'static str },

    #[error("Alias {alias} for {target} is already claimed by {owner}")]
    AliasConflict {
        alias: &'static str,
        target: &'static str,
        owner: &'static str,
    },

    #[error("{type_name} must be registered as a singleton before it can be given aliases")]
    UnknownSingletonAliasTarget { type_name: &'static str },

    #[error("Circular dependency: {}", .path.join(" -> "))]
    CircularDependency { path: Vec<&'static str> },

    #[error("{type_name} is not bound in the container and cannot be constructed on demand")]
    UnknownDependency { type_name: &'static str },

    #[error("Singleton of type {type_name} does not exist")]
    SingletonNotFound { type_name: &'static str },

    #[error("Failed to construct {type_name}: {source}")]
    Construction {
        type_name: &'static str,
        #[source]
        source: BoxError,
    },
}

impl ContainerError {
    /// Wraps a component constructor failure.
    pub fn construction<T: ?Sized>(source: impl Into<BoxError>) -> Self {
        ContainerError::Construction {
            type_name: std::any::type_name::<T>(),
            source: source.into(),
        }
    }
}
