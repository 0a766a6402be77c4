//! Backend abstraction for Compute Engine operations.
//!
//! The [`ComputeBackend`] trait defines the calls the provider needs, allowing
//! for different implementations (the real `gcloud` CLI, fakes for testing).

pub mod gcloud;

use crate::error::Result;
use crate::resources::{
    FirewallOutputs, FirewallRequest, InstanceOutputs, InstanceRequest, NetworkOutputs, NetworkRequest,
    ServiceAccountOutputs, ServiceAccountRequest,
};
use std::collections::BTreeMap;

/// Backend trait for Compute Engine and IAM operations.
///
/// Every call is blocking and may run concurrently with others.
pub trait ComputeBackend: Send + Sync {
    /// Check if the backend can be used.
    fn is_available(&self) -> bool;

    /// Create a VPC network.
    fn create_network(&self, name: &str, request: &NetworkRequest) -> Result<NetworkOutputs>;

    /// Delete a VPC network.
    fn delete_network(&self, name: &str) -> Result<()>;

    /// Create an ingress firewall rule.
    fn create_firewall(&self, name: &str, request: &FirewallRequest) -> Result<FirewallOutputs>;

    /// Replace the allows, source ranges and priority of a firewall rule.
    fn update_firewall(&self, name: &str, request: &FirewallRequest) -> Result<FirewallOutputs>;

    /// Delete a firewall rule.
    fn delete_firewall(&self, name: &str) -> Result<()>;

    /// Create a service account.
    fn create_service_account(&self, request: &ServiceAccountRequest) -> Result<ServiceAccountOutputs>;

    /// Change the display name of a service account.
    fn update_service_account(&self, email: &str, display_name: &str) -> Result<()>;

    /// Delete a service account.
    fn delete_service_account(&self, email: &str) -> Result<()>;

    /// Create a VM instance and wait until it has an address.
    fn create_instance(&self, name: &str, request: &InstanceRequest) -> Result<InstanceOutputs>;

    /// Set `labels` on an instance and drop the `removed` keys.
    fn set_instance_labels(
        &self,
        name: &str,
        zone: &str,
        labels: &BTreeMap<String, String>,
        removed: &[String],
    ) -> Result<()>;

    /// Delete a VM instance.
    fn delete_instance(&self, name: &str, zone: &str) -> Result<()>;
}

/// Get the default backend (real gcloud CLI).
pub fn default_backend(project: Option<String>) -> Result<gcloud::GcloudBackend> {
    Ok(gcloud::GcloudBackend::new()?.with_project(project))
}
