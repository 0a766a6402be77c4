//! Error types for graph construction, configuration and apply.
//!
//! Configuration and graph-structure errors are fatal and surface before any
//! provider call is made. [`Error::ResourceApply`] is the only error that is
//! localized to a single node; the executor collects those into the report
//! instead of aborting the run.

use crate::value::{OutputRef, ResourceId};
use std::path::PathBuf;
use thiserror::Error;

/// Boxed error used as the cause of provider and state-store failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while declaring or converging a resource graph.
#[derive(Debug, Error)]
pub enum Error {
    /// A required configuration key has no value
    #[error("missing required configuration value: {key}")]
    MissingConfig {
        /// Fully qualified key (including namespace, if any)
        key: String,
    },

    /// A configuration value is present but cannot be parsed
    #[error("invalid configuration value for {key}: {message}")]
    InvalidConfig {
        /// Fully qualified key
        key: String,
        /// Why the value was rejected
        message: String,
    },

    /// A file named by configuration could not be read
    #[error("failed to read {}: {source}", path.display())]
    FileRead {
        /// Path that was read
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Two descriptors were registered under the same logical name
    #[error("resource already registered: {0}")]
    DuplicateName(ResourceId),

    /// An edge or output reference names a resource that is not in the graph
    #[error("unknown resource: {0}")]
    UnknownResource(ResourceId),

    /// The dependency edges do not form a DAG
    #[error("dependency cycle detected: {}", display_cycle(.cycle))]
    Cycle {
        /// Resources on the cycle; each depends on the next, the last on the first
        cycle: Vec<ResourceId>,
    },

    /// An output was read before its resource reached `Created`
    #[error("output {reference} requested before {} was created", .reference.resource())]
    UnresolvedDependency {
        /// The reference that could not be resolved
        reference: OutputRef,
    },

    /// The resource was created but its provider did not return the property
    #[error("resource {} has no output named {}", .reference.resource(), .reference.property())]
    MissingOutput {
        /// The reference that could not be resolved
        reference: OutputRef,
    },

    /// The provider failed to create, update or delete a resource
    #[error("failed to apply {resource}: {source}")]
    ResourceApply {
        /// Resource whose provider call failed
        resource: ResourceId,
        /// Provider error
        #[source]
        source: BoxError,
    },

    /// Loading or saving recorded state failed
    #[error("state store error: {0}")]
    State(#[source] BoxError),

    /// The executor could not run (thread pool, confirmation prompt)
    #[error("executor error: {0}")]
    Executor(#[source] BoxError),
}

impl Error {
    /// Wrap a state-store failure.
    pub fn state(err: impl Into<BoxError>) -> Self {
        Self::State(err.into())
    }

    /// Whether this error aborts a run before any provider call.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::ResourceApply { .. })
    }
}

fn display_cycle(cycle: &[ResourceId]) -> String {
    let mut names: Vec<&str> = cycle.iter().map(ResourceId::as_str).collect();
    if let Some(first) = cycle.first() {
        names.push(first.as_str());
    }
    names.join(" -> ")
}

/// Result type for declarative operations.
pub type Result<T> = std::result::Result<T, Error>;
