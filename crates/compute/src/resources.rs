//! Typed resource definitions, provider requests and outputs.
//!
//! `*Args` are what a program declares; they implement
//! [`declarative::Resource`] and may hold output references. Once the engine
//! has resolved every reference, the provider decodes the resolved properties
//! into the matching `*Request` and encodes the backend's `*Outputs` back.

use crate::error::{Error, Result};
use crate::types::{Cidr, FirewallAllow};
use declarative::{Input, Properties, Resource, ResourceId, ResourceKind};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Resource kind tokens handled by [`crate::ComputeProvider`]
pub mod kinds {
    pub const NETWORK: &str = "gcp:compute:Network";
    pub const FIREWALL: &str = "gcp:compute:Firewall";
    pub const SERVICE_ACCOUNT: &str = "gcp:serviceaccount:Account";
    pub const INSTANCE: &str = "gcp:compute:Instance";
}

// ============================================================================
// Network
// ============================================================================

/// A VPC network
#[derive(Debug, Clone)]
pub struct NetworkArgs {
    pub auto_create_subnetworks: bool,
}

impl Resource for NetworkArgs {
    fn kind(&self) -> ResourceKind {
        ResourceKind::new(kinds::NETWORK)
    }

    fn inputs(&self) -> BTreeMap<String, Input> {
        let mut inputs = BTreeMap::new();
        inputs.insert("autoCreateSubnetworks".to_string(), Input::from(self.auto_create_subnetworks));
        inputs
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkRequest {
    pub auto_create_subnetworks: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkOutputs {
    /// Relative resource path, accepted wherever a network is referenced
    pub id: String,
    pub self_link: String,
}

// ============================================================================
// Firewall
// ============================================================================

/// An ingress firewall rule
#[derive(Debug, Clone)]
pub struct FirewallArgs {
    /// Usually a reference to the network's `selfLink`
    pub network: Input,
    pub priority: Option<i64>,
    pub source_ranges: Vec<Cidr>,
    pub allows: Vec<FirewallAllow>,
}

impl Resource for FirewallArgs {
    fn kind(&self) -> ResourceKind {
        ResourceKind::new(kinds::FIREWALL)
    }

    fn inputs(&self) -> BTreeMap<String, Input> {
        let mut inputs = BTreeMap::new();
        inputs.insert("network".to_string(), self.network.clone());
        if let Some(priority) = self.priority {
            inputs.insert("priority".to_string(), Input::from(priority));
        }
        inputs.insert(
            "sourceRanges".to_string(),
            Input::List(self.source_ranges.iter().map(|c| Input::from(c.to_string())).collect()),
        );
        inputs.insert(
            "allows".to_string(),
            Input::List(self.allows.iter().map(Input::from).collect()),
        );
        inputs
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirewallRequest {
    pub network: String,
    #[serde(default)]
    pub priority: Option<i64>,
    pub source_ranges: Vec<Cidr>,
    pub allows: Vec<FirewallAllow>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirewallOutputs {
    pub id: String,
    pub self_link: String,
}

// ============================================================================
// Service account
// ============================================================================

/// An IAM service account
#[derive(Debug, Clone)]
pub struct ServiceAccountArgs {
    pub account_id: String,
    pub display_name: String,
}

impl Resource for ServiceAccountArgs {
    fn kind(&self) -> ResourceKind {
        ResourceKind::new(kinds::SERVICE_ACCOUNT)
    }

    fn inputs(&self) -> BTreeMap<String, Input> {
        let mut inputs = BTreeMap::new();
        inputs.insert("accountId".to_string(), Input::from(self.account_id.as_str()));
        inputs.insert("displayName".to_string(), Input::from(self.display_name.as_str()));
        inputs
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAccountRequest {
    pub account_id: String,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAccountOutputs {
    pub email: String,
    pub unique_id: String,
}

// ============================================================================
// Instance
// ============================================================================

/// A VM instance with one boot disk and an ephemeral public IP
#[derive(Debug, Clone)]
pub struct InstanceArgs {
    pub zone: String,
    pub machine_type: String,
    pub boot_image: String,
    pub boot_disk_size_gb: i64,
    /// Usually a reference to the network's `id`
    pub network: Input,
    pub metadata: BTreeMap<String, String>,
    /// Usually a reference to the service account's `email`
    pub service_account_email: Input,
    pub scopes: Vec<String>,
    pub labels: BTreeMap<String, String>,
    pub depends_on: Vec<ResourceId>,
}

impl Resource for InstanceArgs {
    fn kind(&self) -> ResourceKind {
        ResourceKind::new(kinds::INSTANCE)
    }

    fn inputs(&self) -> BTreeMap<String, Input> {
        let strings = |map: &BTreeMap<String, String>| {
            Input::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Input::from(v.as_str())))
                    .collect(),
            )
        };

        let mut inputs = BTreeMap::new();
        inputs.insert("zone".to_string(), Input::from(self.zone.as_str()));
        inputs.insert("machineType".to_string(), Input::from(self.machine_type.as_str()));
        inputs.insert("bootImage".to_string(), Input::from(self.boot_image.as_str()));
        inputs.insert("bootDiskSizeGb".to_string(), Input::from(self.boot_disk_size_gb));
        inputs.insert("network".to_string(), self.network.clone());
        inputs.insert("metadata".to_string(), strings(&self.metadata));
        inputs.insert("serviceAccountEmail".to_string(), self.service_account_email.clone());
        inputs.insert(
            "scopes".to_string(),
            Input::List(self.scopes.iter().map(|s| Input::from(s.as_str())).collect()),
        );
        inputs.insert("labels".to_string(), strings(&self.labels));
        inputs
    }

    fn depends_on(&self) -> Vec<ResourceId> {
        self.depends_on.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceRequest {
    pub zone: String,
    pub machine_type: String,
    pub boot_image: String,
    pub boot_disk_size_gb: i64,
    pub network: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    pub service_account_email: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl InstanceRequest {
    /// Whether `other` differs from this request in its labels only
    pub fn differs_only_in_labels(&self, other: &Self) -> bool {
        let unlabeled = |r: &Self| Self {
            labels: BTreeMap::new(),
            ..r.clone()
        };
        unlabeled(self) == unlabeled(other)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceOutputs {
    pub id: String,
    pub self_link: String,
    #[serde(rename = "assignedIP")]
    pub assigned_ip: String,
}

// ============================================================================
// Property conversion
// ============================================================================

/// Decode resolved properties into a typed request
pub fn decode<T: DeserializeOwned>(kind: &str, properties: &Properties) -> Result<T> {
    let invalid = |e: serde_json::Error| Error::InvalidProperties {
        kind: kind.to_string(),
        message: e.to_string(),
    };
    let json = serde_json::to_value(properties).map_err(invalid)?;
    serde_json::from_value(json).map_err(invalid)
}

/// Encode typed outputs as properties
pub fn encode<T: Serialize>(outputs: &T) -> Result<Properties> {
    let json = serde_json::to_value(outputs)?;
    Ok(serde_json::from_value(json)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PortSpec, Protocol};
    use declarative::{OutputRef, ResourceDescriptor, Value};

    fn resolve(args: &dyn Resource, lookup: &BTreeMap<String, Value>) -> Properties {
        let descriptor = ResourceDescriptor::from_resource("test", args);
        descriptor
            .inputs()
            .iter()
            .map(|(k, input)| {
                let value = input
                    .resolve_with(&mut |r| Ok(lookup.get(&r.to_string()).cloned()))
                    .unwrap()
                    .unwrap();
                (k.clone(), value)
            })
            .collect()
    }

    #[test]
    fn test_firewall_roundtrip_through_properties() {
        let args = FirewallArgs {
            network: Input::from(OutputRef::new("net", "selfLink")),
            priority: Some(990),
            source_ranges: vec!["203.0.113.5/32".parse().unwrap()],
            allows: vec![
                FirewallAllow::protocol(Protocol::Icmp),
                FirewallAllow::with_ports(Protocol::Tcp, [PortSpec::Single(22), PortSpec::Range(30000, 40000)]),
            ],
        };
        let mut lookup = BTreeMap::new();
        lookup.insert("net.selfLink".to_string(), Value::from("global/networks/net"));

        let request: FirewallRequest = decode(kinds::FIREWALL, &resolve(&args, &lookup)).unwrap();
        assert_eq!(request.network, "global/networks/net");
        assert_eq!(request.priority, Some(990));
        assert_eq!(request.source_ranges, args.source_ranges);
        assert_eq!(request.allows, args.allows);
    }

    #[test]
    fn test_firewall_without_priority() {
        let args = FirewallArgs {
            network: Input::from("global/networks/net"),
            priority: None,
            source_ranges: vec!["10.128.0.0/9".parse().unwrap()],
            allows: vec![FirewallAllow::protocol(Protocol::Udp)],
        };
        assert!(!args.inputs().contains_key("priority"));
        let request: FirewallRequest = decode(kinds::FIREWALL, &resolve(&args, &BTreeMap::new())).unwrap();
        assert_eq!(request.priority, None);
    }

    #[test]
    fn test_instance_references_become_dependencies() {
        let args = InstanceArgs {
            zone: "europe-west1-b".into(),
            machine_type: "e2-medium".into(),
            boot_image: "ubuntu-1804-lts".into(),
            boot_disk_size_gb: 50,
            network: Input::from(OutputRef::new("net", "id")),
            metadata: BTreeMap::new(),
            service_account_email: Input::from(OutputRef::new("sa", "email")),
            scopes: vec!["https://www.googleapis.com/auth/cloud-platform".into()],
            labels: BTreeMap::new(),
            depends_on: vec![ResourceId::new("fw")],
        };
        let descriptor = ResourceDescriptor::from_resource("master", &args);
        let implicit: Vec<String> = descriptor
            .implicit_dependencies()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(implicit, vec!["net", "sa"]);
        assert!(descriptor.explicit_dependencies().contains("fw"));
    }

    #[test]
    fn test_decode_rejects_bad_properties() {
        let mut properties = Properties::new();
        properties.insert("autoCreateSubnetworks".to_string(), Value::from("yes"));
        let err = decode::<NetworkRequest>(kinds::NETWORK, &properties).unwrap_err();
        assert!(matches!(err, Error::InvalidProperties { ref kind, .. } if kind == kinds::NETWORK));
    }

    #[test]
    fn test_encode_instance_outputs() {
        let outputs = InstanceOutputs {
            id: "123".into(),
            self_link: "zones/z/instances/master".into(),
            assigned_ip: "198.51.100.7".into(),
        };
        let properties = encode(&outputs).unwrap();
        assert_eq!(properties["assignedIP"], Value::from("198.51.100.7"));
        assert_eq!(properties["selfLink"], Value::from("zones/z/instances/master"));
    }

    #[test]
    fn test_label_only_difference() {
        let base = InstanceRequest {
            zone: "z".into(),
            machine_type: "e2-medium".into(),
            boot_image: "ubuntu-1804-lts".into(),
            boot_disk_size_gb: 50,
            network: "net".into(),
            metadata: BTreeMap::new(),
            service_account_email: "sa@p.iam.gserviceaccount.com".into(),
            scopes: Vec::new(),
            labels: BTreeMap::new(),
        };
        let mut relabeled = base.clone();
        relabeled.labels.insert("env".into(), "cks".into());
        assert!(base.differs_only_in_labels(&relabeled));

        let mut resized = relabeled.clone();
        resized.boot_disk_size_gb = 100;
        assert!(!base.differs_only_in_labels(&resized));
    }
}
