//! Resource descriptors
//!
//! A [`ResourceDescriptor`] is the immutable desired-state record of one
//! resource: its kind, logical name, inputs and explicit dependencies.
//! Typed resource definitions implement [`Resource`] and are turned into
//! descriptors when they are declared on a graph.

use crate::value::{Input, OutputRef, ResourceId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Resource type token, used by providers to select an operation
///
/// Examples: "gcp:compute:Network", "gcp:compute:Instance"
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceKind(String);

impl ResourceKind {
    pub fn new(kind: impl Into<String>) -> Self {
        Self(kind.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceKind {
    fn from(kind: &str) -> Self {
        Self::new(kind)
    }
}

/// Core trait for typed resource definitions
///
/// Implementors describe their inputs as a property bag of [`Input`]s.
/// Output references embedded in the inputs become implicit dependencies;
/// [`Resource::depends_on`] adds explicit ones.
///
/// # Example
///
/// ```
/// use declarative::{Input, Resource, ResourceKind, ResourceGraph};
/// use std::collections::BTreeMap;
///
/// #[derive(Debug)]
/// struct Bucket { region: String }
///
/// impl Resource for Bucket {
///     fn kind(&self) -> ResourceKind { ResourceKind::new("storage:Bucket") }
///     fn inputs(&self) -> BTreeMap<String, Input> {
///         let mut inputs = BTreeMap::new();
///         inputs.insert("region".to_string(), Input::from(self.region.as_str()));
///         inputs
///     }
/// }
///
/// let mut graph = ResourceGraph::new();
/// let id = graph.declare("assets", &Bucket { region: "eu".into() }).unwrap();
/// assert_eq!(id.as_str(), "assets");
/// ```
pub trait Resource: fmt::Debug {
    /// Resource type token
    fn kind(&self) -> ResourceKind;

    /// Desired input properties, possibly containing output references
    fn inputs(&self) -> BTreeMap<String, Input>;

    /// Explicit dependencies not expressed through inputs
    fn depends_on(&self) -> Vec<ResourceId> {
        Vec::new()
    }
}

/// Immutable desired-state record of a single resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDescriptor {
    kind: ResourceKind,
    name: ResourceId,
    inputs: BTreeMap<String, Input>,
    depends_on: BTreeSet<ResourceId>,
}

impl ResourceDescriptor {
    pub fn new(kind: impl Into<ResourceKind>, name: impl Into<ResourceId>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            inputs: BTreeMap::new(),
            depends_on: BTreeSet::new(),
        }
    }

    /// Build a descriptor from a typed resource definition
    pub fn from_resource(name: impl Into<ResourceId>, resource: &dyn Resource) -> Self {
        Self {
            kind: resource.kind(),
            name: name.into(),
            inputs: resource.inputs(),
            depends_on: resource.depends_on().into_iter().collect(),
        }
    }

    pub fn with_input(mut self, property: impl Into<String>, value: impl Into<Input>) -> Self {
        self.inputs.insert(property.into(), value.into());
        self
    }

    pub fn with_dependency(mut self, id: impl Into<ResourceId>) -> Self {
        self.depends_on.insert(id.into());
        self
    }

    pub fn kind(&self) -> &ResourceKind {
        &self.kind
    }

    pub fn name(&self) -> &ResourceId {
        &self.name
    }

    pub fn inputs(&self) -> &BTreeMap<String, Input> {
        &self.inputs
    }

    /// Explicitly declared dependencies
    pub fn explicit_dependencies(&self) -> &BTreeSet<ResourceId> {
        &self.depends_on
    }

    /// Resources referenced through output references in the inputs
    pub fn implicit_dependencies(&self) -> BTreeSet<ResourceId> {
        self.references()
            .into_iter()
            .map(|r| r.resource().clone())
            .collect()
    }

    /// All output references embedded in the inputs
    pub fn references(&self) -> Vec<&OutputRef> {
        self.inputs.values().flat_map(Input::references).collect()
    }

    /// Reference an output of this resource
    pub fn output(&self, property: impl Into<String>) -> OutputRef {
        self.name.output(property)
    }
}
