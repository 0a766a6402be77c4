//! In-memory backend for tests.

use crate::backend::ComputeBackend;
use crate::error::{Error, Result};
use crate::resources::{
    FirewallOutputs, FirewallRequest, InstanceOutputs, InstanceRequest, NetworkOutputs, NetworkRequest,
    ServiceAccountOutputs, ServiceAccountRequest,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

const LINK_PREFIX: &str = "https://www.googleapis.com/compute/v1/";

#[derive(Default)]
struct Inner {
    calls: Vec<String>,
    existing: BTreeSet<String>,
    failing: BTreeSet<String>,
    in_use: BTreeSet<String>,
    next_ip: u8,
}

/// Records every call and keeps a set of live resource names.
#[derive(Default)]
pub struct FakeBackend {
    inner: Mutex<Inner>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make creating `name` fail with a quota error
    pub fn fail_on(&self, name: &str) {
        self.lock().failing.insert(name.to_string());
    }

    /// Make deleting `name` fail as if other resources still used it
    pub fn in_use(&self, name: &str) {
        self.lock().in_use.insert(name.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn exists(&self, name: &str) -> bool {
        self.lock().existing.contains(name)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn create(&self, call: String, name: &str) -> Result<()> {
        let mut inner = self.lock();
        inner.calls.push(call);
        if inner.failing.contains(name) {
            return Err(Error::Quota {
                message: format!("cannot create {name}"),
            });
        }
        if !inner.existing.insert(name.to_string()) {
            return Err(Error::AlreadyExists {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    fn delete(&self, call: String, name: &str) -> Result<()> {
        let mut inner = self.lock();
        inner.calls.push(call);
        if inner.in_use.contains(name) {
            return Err(Error::InvalidArgument {
                message: format!("resource {name} is already being used by another resource"),
            });
        }
        if inner.existing.remove(name) {
            Ok(())
        } else {
            Err(Error::NotFound {
                name: name.to_string(),
            })
        }
    }

    fn record(&self, call: String, name: &str) -> Result<()> {
        let mut inner = self.lock();
        inner.calls.push(call);
        if inner.existing.contains(name) {
            Ok(())
        } else {
            Err(Error::NotFound {
                name: name.to_string(),
            })
        }
    }
}

fn email(account_id: &str) -> String {
    format!("{account_id}@test.iam.gserviceaccount.com")
}

impl ComputeBackend for FakeBackend {
    fn is_available(&self) -> bool {
        true
    }

    fn create_network(&self, name: &str, _request: &NetworkRequest) -> Result<NetworkOutputs> {
        self.create(format!("create_network {name}"), name)?;
        let id = format!("projects/test/global/networks/{name}");
        Ok(NetworkOutputs {
            self_link: format!("{LINK_PREFIX}{id}"),
            id,
        })
    }

    fn delete_network(&self, name: &str) -> Result<()> {
        self.delete(format!("delete_network {name}"), name)
    }

    fn create_firewall(&self, name: &str, _request: &FirewallRequest) -> Result<FirewallOutputs> {
        self.create(format!("create_firewall {name}"), name)?;
        let id = format!("projects/test/global/firewalls/{name}");
        Ok(FirewallOutputs {
            self_link: format!("{LINK_PREFIX}{id}"),
            id,
        })
    }

    fn update_firewall(&self, name: &str, _request: &FirewallRequest) -> Result<FirewallOutputs> {
        self.record(format!("update_firewall {name}"), name)?;
        let id = format!("projects/test/global/firewalls/{name}");
        Ok(FirewallOutputs {
            self_link: format!("{LINK_PREFIX}{id}"),
            id,
        })
    }

    fn delete_firewall(&self, name: &str) -> Result<()> {
        self.delete(format!("delete_firewall {name}"), name)
    }

    fn create_service_account(&self, request: &ServiceAccountRequest) -> Result<ServiceAccountOutputs> {
        let email = email(&request.account_id);
        self.create(format!("create_service_account {}", request.account_id), &email)?;
        Ok(ServiceAccountOutputs {
            email,
            unique_id: "100000000000000000001".to_string(),
        })
    }

    fn update_service_account(&self, email: &str, display_name: &str) -> Result<()> {
        self.record(format!("update_service_account {email} {display_name}"), email)
    }

    fn delete_service_account(&self, email: &str) -> Result<()> {
        self.delete(format!("delete_service_account {email}"), email)
    }

    fn create_instance(&self, name: &str, request: &InstanceRequest) -> Result<InstanceOutputs> {
        self.create(format!("create_instance {name}"), name)?;
        let host = {
            let mut inner = self.lock();
            inner.next_ip = inner.next_ip.wrapping_add(1);
            inner.next_ip
        };
        let id = format!("projects/test/zones/{}/instances/{name}", request.zone);
        Ok(InstanceOutputs {
            self_link: format!("{LINK_PREFIX}{id}"),
            id,
            assigned_ip: format!("198.51.100.{host}"),
        })
    }

    fn set_instance_labels(
        &self,
        name: &str,
        _zone: &str,
        labels: &BTreeMap<String, String>,
        removed: &[String],
    ) -> Result<()> {
        let added: Vec<&str> = labels.keys().map(String::as_str).collect();
        let call = format!("set_instance_labels {name} +{} -{}", added.join(","), removed.join(","));
        self.record(call, name)
    }

    fn delete_instance(&self, name: &str, zone: &str) -> Result<()> {
        self.delete(format!("delete_instance {name} {zone}"), name)
    }
}
