//! # Declarative
//!
//! A framework for declarative resource graphs.
//!
//! Programs declare the resources they want, wire them together with output
//! references, and let the engine converge the real world to match: only
//! resources whose desired state differs from the recorded state are touched,
//! always in dependency order.
//!
//! ## Core Concepts
//!
//! - **ResourceDescriptor**: Immutable desired state of one resource (kind, name, inputs, dependencies)
//! - **OutputRef**: Deferred pointer to a property of a resource that is not created yet
//! - **ResourceGraph**: Every descriptor of a run, the edges between them and their results
//! - **ConfigResolver**: Typed, namespaced configuration that fails fast on missing keys
//! - **Executor**: Diffs against recorded state and applies with bounded parallelism
//!
//! ## Example
//!
//! ```
//! use declarative::{
//!     apply_simple, ExecuteOptions, MemoryStateStore, Properties, Provider,
//!     RecordedResource, ResourceDescriptor, ResourceGraph, ResourceId, ResourceKind, Value,
//! };
//!
//! struct Echo;
//!
//! impl Provider for Echo {
//!     fn create(&self, _kind: &ResourceKind, name: &ResourceId, inputs: &Properties) -> anyhow::Result<Properties> {
//!         let mut outputs = inputs.clone();
//!         outputs.insert("id".into(), Value::from(format!("{name}-1")));
//!         Ok(outputs)
//!     }
//!     fn update(&self, kind: &ResourceKind, name: &ResourceId, inputs: &Properties, _previous: &RecordedResource) -> anyhow::Result<Properties> {
//!         self.create(kind, name, inputs)
//!     }
//!     fn delete(&self, _kind: &ResourceKind, _name: &ResourceId, _previous: &RecordedResource) -> anyhow::Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! let mut graph = ResourceGraph::new();
//! let net = graph.register(ResourceDescriptor::new("net:Network", "net"))?;
//! graph.register(ResourceDescriptor::new("net:Firewall", "fw").with_input("network", net.output("id")))?;
//!
//! let store = MemoryStateStore::new();
//! let report = apply_simple(&mut graph, &Echo, &store, &ExecuteOptions::default())?;
//! assert!(report.is_success());
//! assert_eq!(graph.outputs("fw").unwrap()["network"], Value::from("net-1"));
//! # Ok::<(), declarative::Error>(())
//! ```
//!
//! ## Provider Traits
//!
//! The crate uses traits for dependency injection:
//!
//! - [`Provider`]: Creates, updates and deletes resources
//! - [`StateStore`]: Loads and saves the recorded state
//! - [`ConfigSource`]: Supplies raw configuration values
//! - [`ProgressCallback`]: Receives progress updates
//! - [`ConfirmCallback`]: Handles user confirmations
//!
//! This allows the crate to be used without hard dependencies on a specific
//! cloud API, storage backend or UI framework.

pub mod config;
pub mod context;
pub mod diff;
pub mod error;
pub mod executor;
pub mod graph;
pub mod planner;
pub mod resource;
pub mod state;
pub mod types;
pub mod value;

// Re-export main types at crate root
pub use config::{ConfigEntry, ConfigResolver, ConfigSource, EnvSource, LayeredSource, MapSource, read_file};
pub use context::{AutoConfirm, AutoDecline, ConfirmCallback, NoProgress, ProgressCallback, Provider};
pub use diff::{DiffSummary, Planned, PropertyChange, compute_changes, group_by_type};
pub use error::{BoxError, Error, Result};
pub use executor::{apply, apply_simple, destroy};
pub use graph::{NodeState, ResourceGraph};
pub use planner::{Action, Plan, PlannedStep, plan};
pub use resource::{Resource, ResourceDescriptor, ResourceKind};
pub use state::{MemoryStateStore, RecordedResource, STATE_VERSION, StackState, StateStore};
pub use types::{ApplyReport, ApplyResult, ExecuteOptions, ExecuteSummary, ResourceOutcome};
pub use value::{Input, OutputRef, Properties, ResourceId, Value};
