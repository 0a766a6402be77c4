//! [`declarative::Provider`] implementation for Compute Engine resources.
//!
//! Resolved properties are decoded into typed requests, sent to a
//! [`ComputeBackend`] and the backend's outputs encoded back. Updates that the
//! API cannot apply in place are carried out as delete-then-create.

use crate::backend::ComputeBackend;
use crate::error::{Error, Result};
use crate::resources::{
    FirewallRequest, InstanceRequest, NetworkRequest, ServiceAccountOutputs, ServiceAccountRequest, decode, encode,
    kinds,
};
use crate::retry::with_retry;
use crate::types::RetryConfig;
use declarative::{Properties, Provider, RecordedResource, ResourceId, ResourceKind};

/// Provider that manages networks, firewalls, service accounts and instances
pub struct ComputeProvider<B> {
    backend: B,
    retry: RetryConfig,
}

impl<B: ComputeBackend> ComputeProvider<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn create_resource(&self, kind: &str, name: &str, inputs: &Properties) -> Result<Properties> {
        let what = format!("create {kind} {name}");
        match kind {
            kinds::NETWORK => {
                let request: NetworkRequest = decode(kind, inputs)?;
                encode(&with_retry(&self.retry, &what, || self.backend.create_network(name, &request))?)
            }
            kinds::FIREWALL => {
                let request: FirewallRequest = decode(kind, inputs)?;
                encode(&with_retry(&self.retry, &what, || self.backend.create_firewall(name, &request))?)
            }
            kinds::SERVICE_ACCOUNT => {
                let request: ServiceAccountRequest = decode(kind, inputs)?;
                encode(&with_retry(&self.retry, &what, || self.backend.create_service_account(&request))?)
            }
            kinds::INSTANCE => {
                let request: InstanceRequest = decode(kind, inputs)?;
                encode(&with_retry(&self.retry, &what, || self.backend.create_instance(name, &request))?)
            }
            other => Err(Error::UnsupportedKind(other.to_string())),
        }
    }

    fn update_resource(
        &self,
        kind: &str,
        name: &str,
        inputs: &Properties,
        previous: &RecordedResource,
    ) -> Result<Properties> {
        let what = format!("update {kind} {name}");
        match kind {
            kinds::FIREWALL => {
                let request: FirewallRequest = decode(kind, inputs)?;
                let old: FirewallRequest = decode(kind, &previous.inputs)?;
                if request.network != old.network {
                    return self.recreate(kind, name, inputs, previous);
                }
                encode(&with_retry(&self.retry, &what, || self.backend.update_firewall(name, &request))?)
            }
            kinds::SERVICE_ACCOUNT => {
                let request: ServiceAccountRequest = decode(kind, inputs)?;
                let old: ServiceAccountRequest = decode(kind, &previous.inputs)?;
                if request.account_id != old.account_id {
                    return self.recreate(kind, name, inputs, previous);
                }
                let outputs: ServiceAccountOutputs = decode(kind, &previous.outputs)?;
                with_retry(&self.retry, &what, || {
                    self.backend
                        .update_service_account(&outputs.email, &request.display_name)
                })?;
                Ok(previous.outputs.clone())
            }
            kinds::INSTANCE => {
                let request: InstanceRequest = decode(kind, inputs)?;
                let old: InstanceRequest = decode(kind, &previous.inputs)?;
                if !request.differs_only_in_labels(&old) {
                    return self.recreate(kind, name, inputs, previous);
                }
                let removed: Vec<String> = old
                    .labels
                    .keys()
                    .filter(|k| !request.labels.contains_key(*k))
                    .cloned()
                    .collect();
                with_retry(&self.retry, &what, || {
                    self.backend
                        .set_instance_labels(name, &request.zone, &request.labels, &removed)
                })?;
                Ok(previous.outputs.clone())
            }
            kinds::NETWORK => {
                log::warn!(
                    "Network {name} cannot be updated in place; GCE refuses to delete it while firewalls or instances use it"
                );
                self.recreate(kind, name, inputs, previous)
            }
            other => Err(Error::UnsupportedKind(other.to_string())),
        }
    }

    fn recreate(&self, kind: &str, name: &str, inputs: &Properties, previous: &RecordedResource) -> Result<Properties> {
        log::info!("{kind} {name} cannot be updated in place, recreating");
        self.delete_resource(kind, name, previous)
            .map_err(|source| Error::ReplaceBlocked {
                kind: kind.to_string(),
                name: name.to_string(),
                source: Box::new(source),
            })?;
        self.create_resource(kind, name, inputs)
    }

    fn delete_resource(&self, kind: &str, name: &str, previous: &RecordedResource) -> Result<()> {
        let what = format!("delete {kind} {name}");
        let result = match kind {
            kinds::NETWORK => with_retry(&self.retry, &what, || self.backend.delete_network(name)),
            kinds::FIREWALL => with_retry(&self.retry, &what, || self.backend.delete_firewall(name)),
            kinds::SERVICE_ACCOUNT => {
                let outputs: ServiceAccountOutputs = decode(kind, &previous.outputs)?;
                with_retry(&self.retry, &what, || self.backend.delete_service_account(&outputs.email))
            }
            kinds::INSTANCE => {
                let old: InstanceRequest = decode(kind, &previous.inputs)?;
                with_retry(&self.retry, &what, || self.backend.delete_instance(name, &old.zone))
            }
            other => return Err(Error::UnsupportedKind(other.to_string())),
        };

        match result {
            Err(Error::NotFound { .. }) => {
                log::warn!("{kind} {name} was already deleted");
                Ok(())
            }
            other => other,
        }
    }
}

impl<B: ComputeBackend> Provider for ComputeProvider<B> {
    fn create(&self, kind: &ResourceKind, name: &ResourceId, inputs: &Properties) -> anyhow::Result<Properties> {
        Ok(self.create_resource(kind.as_str(), name.as_str(), inputs)?)
    }

    fn update(
        &self,
        kind: &ResourceKind,
        name: &ResourceId,
        inputs: &Properties,
        previous: &RecordedResource,
    ) -> anyhow::Result<Properties> {
        Ok(self.update_resource(kind.as_str(), name.as_str(), inputs, previous)?)
    }

    fn delete(&self, kind: &ResourceKind, name: &ResourceId, previous: &RecordedResource) -> anyhow::Result<()> {
        Ok(self.delete_resource(kind.as_str(), name.as_str(), previous)?)
    }
}
