//! # compute
//!
//! Google Compute Engine resources for [`declarative`] resource graphs.
//!
//! This crate provides:
//! - Typed definitions for networks, firewall rules, service accounts and instances
//! - A [`ComputeBackend`] abstraction with a `gcloud` CLI implementation
//! - [`ComputeProvider`], the engine's provider for those kinds
//! - A data-driven [`Topology`] and the configuration it needs
//!
//! ## Example
//!
//! ```no_run
//! use compute::{ComputeProvider, Topology, default_backend, prepare};
//! use declarative::{EnvSource, ExecuteOptions, MemoryStateStore, apply_simple};
//!
//! let source = EnvSource::new("UMAMI");
//! let topology = Topology::default();
//! let (_config, mut graph) = prepare(&source, "", &topology).expect("configuration");
//!
//! let provider = ComputeProvider::new(default_backend(None).expect("gcloud not available"));
//! let store = MemoryStateStore::new();
//! let report = apply_simple(&mut graph, &provider, &store, &ExecuteOptions::default()).unwrap();
//! println!("master: {:?}", graph.outputs("master").map(|o| &o["assignedIP"]));
//! # let _ = report;
//! ```
//!
//! ## Retry Logic
//!
//! Transient API errors are retried with exponential backoff inside each
//! provider call. Configure it with [`ComputeProvider::with_retry`].

pub mod backend;
pub mod error;
pub mod provider;
pub mod resources;
pub mod retry;
pub mod topology;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::gcloud::GcloudBackend;
pub use backend::{ComputeBackend, default_backend};
pub use error::{Error, ErrorCategory, Result};
pub use provider::ComputeProvider;
pub use resources::{FirewallArgs, InstanceArgs, NetworkArgs, ServiceAccountArgs, kinds};
pub use retry::with_retry;
pub use topology::{DeploymentConfig, Topology, build_graph, prepare};
pub use types::{Cidr, FirewallAllow, PortSpec, Protocol, RetryConfig};
