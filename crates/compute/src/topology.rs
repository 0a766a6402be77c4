//! Data-driven deployment topology.
//!
//! A [`Topology`] is the static shape of a deployment (names, machine sizes,
//! firewall allows) and a [`DeploymentConfig`] holds the per-stack values
//! resolved from configuration. [`build_graph`] combines the two into a
//! [`ResourceGraph`]; nothing in the engine knows about this particular shape.
//!
//! The default topology is a two-node Kubernetes practice cluster:
//!
//! ```text
//! network ──┬── internal firewall
//!           ├── external firewall ──┐
//!           │                       ├── master
//! service account ──────────────────┴── worker
//! ```

use crate::backend::gcloud::{validate_account_id, validate_name};
use crate::resources::{FirewallArgs, InstanceArgs, NetworkArgs, ServiceAccountArgs};
use crate::types::{Cidr, FirewallAllow, PortSpec, Protocol};
use declarative::{ConfigResolver, ConfigSource, Input, ResourceGraph, ResourceId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Full read/write access to every Google Cloud API
pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NetworkSpec {
    pub name: String,
    #[serde(default = "default_true")]
    pub auto_create_subnetworks: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FirewallSpec {
    pub name: String,
    #[serde(default)]
    pub priority: Option<i64>,
    pub allows: Vec<FirewallAllow>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServiceAccountSpec {
    pub account_id: String,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct InstanceSpec {
    pub name: String,
    #[serde(default = "default_machine_type")]
    pub machine_type: String,
    #[serde(default = "default_boot_image")]
    pub boot_image: String,
    #[serde(default = "default_disk_size")]
    pub boot_disk_size_gb: i64,
    /// Added to the topology-wide labels
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl InstanceSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            machine_type: default_machine_type(),
            boot_image: default_boot_image(),
            boot_disk_size_gb: default_disk_size(),
            labels: BTreeMap::new(),
        }
    }
}

/// Static shape of a deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Topology {
    pub network: NetworkSpec,
    pub internal_range: Cidr,
    /// Allows traffic from `internal_range`
    pub internal_firewall: FirewallSpec,
    /// Allows traffic from the admin CIDR
    pub external_firewall: FirewallSpec,
    pub service_account: ServiceAccountSpec,
    pub scopes: Vec<String>,
    /// Labels on every instance; each also gets `node = <name>`
    pub labels: BTreeMap<String, String>,
    pub instances: Vec<InstanceSpec>,
}

impl Default for Topology {
    fn default() -> Self {
        let mut labels = BTreeMap::new();
        labels.insert("env".to_string(), "cks".to_string());

        Self {
            network: NetworkSpec {
                name: "cks-network".to_string(),
                auto_create_subnetworks: true,
            },
            internal_range: Cidr::AUTO_MODE_RANGE,
            internal_firewall: FirewallSpec {
                name: "cks-internal".to_string(),
                priority: None,
                allows: vec![
                    FirewallAllow::protocol(Protocol::Icmp),
                    FirewallAllow::protocol(Protocol::Tcp),
                    FirewallAllow::protocol(Protocol::Udp),
                ],
            },
            external_firewall: FirewallSpec {
                name: "cks-external".to_string(),
                priority: Some(990),
                allows: vec![
                    FirewallAllow::protocol(Protocol::Icmp),
                    FirewallAllow::with_ports(
                        Protocol::Tcp,
                        [PortSpec::Single(22), PortSpec::Range(30000, 40000)],
                    ),
                ],
            },
            service_account: ServiceAccountSpec {
                account_id: "cks-nodes".to_string(),
                display_name: "CKS cluster nodes".to_string(),
            },
            scopes: vec![CLOUD_PLATFORM_SCOPE.to_string()],
            labels,
            instances: vec![InstanceSpec::new("master"), InstanceSpec::new("worker")],
        }
    }
}

impl Topology {
    /// Check every name against the GCE and IAM naming rules.
    pub fn validate(&self) -> crate::Result<()> {
        validate_name(&self.network.name)?;
        validate_name(&self.internal_firewall.name)?;
        validate_name(&self.external_firewall.name)?;
        validate_account_id(&self.service_account.account_id)?;
        for instance in &self.instances {
            validate_name(&instance.name)?;
        }
        Ok(())
    }

    /// Logical name of the service account resource
    pub fn service_account_name(&self) -> &str {
        &self.service_account.account_id
    }
}

/// Per-stack values resolved from configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentConfig {
    /// External address range allowed through the external firewall
    pub admin_cidr: Cidr,
    pub zone: String,
    /// Contents of the public key file
    pub ssh_public_key: String,
    pub ssh_user: String,
}

impl DeploymentConfig {
    pub const IP_CIDR: &'static str = "ip-cidr";
    pub const ZONE: &'static str = "zone";
    pub const SSH_PUBKEY_PATH: &'static str = "ssh-pubkey-path";
    pub const SSH_USER: &'static str = "ssh-user";

    /// Resolve every value up front; nothing is provisioned on failure.
    pub fn resolve(resolver: &ConfigResolver<'_>) -> declarative::Result<Self> {
        let admin_cidr = resolver.require_as::<Cidr>(Self::IP_CIDR)?;
        let zone = resolver.require(Self::ZONE)?;
        let ssh_public_key = resolver.require_file(Self::SSH_PUBKEY_PATH)?;
        let ssh_user = resolver.optional(Self::SSH_USER, "cks");
        Ok(Self {
            admin_cidr,
            zone,
            ssh_public_key,
            ssh_user,
        })
    }

    /// Instance metadata: the ssh key, with project-wide keys blocked
    pub fn metadata(&self) -> BTreeMap<String, String> {
        let mut metadata = BTreeMap::new();
        metadata.insert(
            "ssh-keys".to_string(),
            format!("{}:{}", self.ssh_user, self.ssh_public_key),
        );
        metadata.insert("block-project-ssh-keys".to_string(), "true".to_string());
        metadata
    }
}

/// Declare every resource of `topology` on a new graph
pub fn build_graph(topology: &Topology, config: &DeploymentConfig) -> declarative::Result<ResourceGraph> {
    let mut graph = ResourceGraph::new();

    let network = graph.declare(
        topology.network.name.as_str(),
        &NetworkArgs {
            auto_create_subnetworks: topology.network.auto_create_subnetworks,
        },
    )?;

    let firewall = |spec: &FirewallSpec, source: Cidr| FirewallArgs {
        network: Input::from(network.output("selfLink")),
        priority: spec.priority,
        source_ranges: vec![source],
        allows: spec.allows.clone(),
    };
    graph.declare(
        topology.internal_firewall.name.as_str(),
        &firewall(&topology.internal_firewall, topology.internal_range),
    )?;
    let external = graph.declare(
        topology.external_firewall.name.as_str(),
        &firewall(&topology.external_firewall, config.admin_cidr),
    )?;

    let account = graph.declare(
        topology.service_account_name(),
        &ServiceAccountArgs {
            account_id: topology.service_account.account_id.clone(),
            display_name: topology.service_account.display_name.clone(),
        },
    )?;

    let metadata = config.metadata();
    for instance in &topology.instances {
        let mut labels = topology.labels.clone();
        labels.insert("node".to_string(), instance.name.clone());
        labels.extend(instance.labels.clone());

        graph.declare(
            instance.name.as_str(),
            &InstanceArgs {
                zone: config.zone.clone(),
                machine_type: instance.machine_type.clone(),
                boot_image: instance.boot_image.clone(),
                boot_disk_size_gb: instance.boot_disk_size_gb,
                network: Input::from(network.output("id")),
                metadata: metadata.clone(),
                service_account_email: Input::from(account.output("email")),
                scopes: topology.scopes.clone(),
                labels,
                depends_on: vec![external.clone()],
            },
        )?;
    }

    log::debug!("Declared {} resources", graph.len());
    Ok(graph)
}

/// Resolve configuration from `source`, then build the graph
pub fn prepare(
    source: &dyn ConfigSource,
    namespace: &str,
    topology: &Topology,
) -> declarative::Result<(DeploymentConfig, ResourceGraph)> {
    let resolver = ConfigResolver::with_namespace(source, namespace);
    let config = DeploymentConfig::resolve(&resolver)?;
    let graph = build_graph(topology, &config)?;
    Ok((config, graph))
}

/// Logical ids of the instances, in declaration order
pub fn instance_ids(topology: &Topology) -> Vec<ResourceId> {
    topology
        .instances
        .iter()
        .map(|i| ResourceId::new(i.name.as_str()))
        .collect()
}

fn default_true() -> bool {
    true
}

fn default_machine_type() -> String {
    "e2-medium".to_string()
}

fn default_boot_image() -> String {
    "ubuntu-1804-lts".to_string()
}

fn default_disk_size() -> i64 {
    50
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ComputeProvider;
    use crate::testing::FakeBackend;
    use crate::types::RetryConfig;
    use declarative::{
        ApplyResult, Error, ExecuteOptions, MapSource, MemoryStateStore, NodeState, OutputRef, Value, apply_simple,
    };
    use std::io::Write;

    struct Fixture {
        _key: tempfile::NamedTempFile,
        source: MapSource,
    }

    fn fixture() -> Fixture {
        let mut key = tempfile::NamedTempFile::new().unwrap();
        writeln!(key, "ssh-ed25519 AAAAC3Nza me@laptop").unwrap();
        let source = MapSource::new()
            .with("ip-cidr", "203.0.113.5/32")
            .with("zone", "europe-west1-b")
            .with("ssh-pubkey-path", key.path().to_string_lossy());
        Fixture { _key: key, source }
    }

    fn provider() -> ComputeProvider<FakeBackend> {
        ComputeProvider::new(FakeBackend::new()).with_retry(RetryConfig::no_retry())
    }

    fn position(calls: &[String], call: &str) -> usize {
        calls.iter().position(|c| c == call).unwrap()
    }

    #[test]
    fn test_missing_zone_aborts_before_provisioning() {
        let mut key = tempfile::NamedTempFile::new().unwrap();
        writeln!(key, "ssh-ed25519 AAAA").unwrap();
        let source = MapSource::new()
            .with("ip-cidr", "203.0.113.5/32")
            .with("ssh-pubkey-path", key.path().to_string_lossy());
        let provider = provider();
        let store = MemoryStateStore::new();

        let run = || -> declarative::Result<declarative::ApplyReport> {
            let (_, mut graph) = prepare(&source, "", &Topology::default())?;
            apply_simple(&mut graph, &provider, &store, &ExecuteOptions::default())
        };
        let err = run().unwrap_err();

        assert!(matches!(err, Error::MissingConfig { ref key } if key == "zone"));
        assert!(provider.backend().calls().is_empty());
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn test_complete_config_reaches_the_backend() {
        let fixture = fixture();
        let provider = provider();
        let store = MemoryStateStore::new();

        let run = || -> declarative::Result<declarative::ApplyReport> {
            let (_, mut graph) = prepare(&fixture.source, "", &Topology::default())?;
            apply_simple(&mut graph, &provider, &store, &ExecuteOptions::default())
        };
        assert!(run().unwrap().is_success());
        assert!(!provider.backend().calls().is_empty());
    }

    #[test]
    fn test_unreadable_key_file_is_fatal() {
        let source = MapSource::new()
            .with("ip-cidr", "203.0.113.5/32")
            .with("zone", "europe-west1-b")
            .with("ssh-pubkey-path", "/nonexistent/id_ed25519.pub");
        let err = prepare(&source, "", &Topology::default()).unwrap_err();
        assert!(matches!(err, Error::FileRead { .. }));
    }

    #[test]
    fn test_invalid_cidr_is_fatal() {
        let source = MapSource::new().with("ip-cidr", "203.0.113.5");
        let err = prepare(&source, "", &Topology::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { ref key, .. } if key == "ip-cidr"));
    }

    #[test]
    fn test_namespaced_keys() {
        let fixture = fixture();
        let mut source = MapSource::new();
        for key in ["ip-cidr", "zone", "ssh-pubkey-path"] {
            source.insert(format!("dev:{key}"), fixture.source.get(key).unwrap());
        }
        source.insert("dev:ssh-user", "admin");

        let (config, _) = prepare(&source, "dev", &Topology::default()).unwrap();
        assert_eq!(config.zone, "europe-west1-b");
        assert_eq!(config.ssh_user, "admin");
        assert_eq!(
            config.metadata()["ssh-keys"],
            "admin:ssh-ed25519 AAAAC3Nza me@laptop"
        );
    }

    #[test]
    fn test_graph_edges() {
        let fixture = fixture();
        let (_, graph) = prepare(&fixture.source, "", &Topology::default()).unwrap();
        assert_eq!(graph.len(), 6);

        let deps: Vec<String> = graph
            .dependencies(&ResourceId::new("master"))
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(deps, vec!["cks-external", "cks-network", "cks-nodes"]);

        let order = graph.topological_order().unwrap();
        assert_eq!(order.first().map(ResourceId::as_str), Some("cks-network"));
    }

    #[test]
    fn test_apply_scenario() {
        let fixture = fixture();
        let topology = Topology::default();
        let (_, mut graph) = prepare(&fixture.source, "", &topology).unwrap();
        let provider = provider();
        let store = MemoryStateStore::new();

        let report = apply_simple(&mut graph, &provider, &store, &ExecuteOptions::default()).unwrap();
        assert!(report.is_success());
        for id in ["cks-network", "cks-internal", "cks-external", "cks-nodes", "master", "worker"] {
            assert_eq!(report.state(id), Some(NodeState::Created), "{id}");
        }

        let ip = graph
            .resolve_output(&OutputRef::new("master", "assignedIP"))
            .unwrap();
        assert!(ip.as_str().unwrap().starts_with("198.51.100."));

        let calls = provider.backend().calls();
        let network = position(&calls, "create_network cks-network");
        let external = position(&calls, "create_firewall cks-external");
        let account = position(&calls, "create_service_account cks-nodes");
        for instance in instance_ids(&topology) {
            let created = position(&calls, &format!("create_instance {instance}"));
            assert!(network < created && external < created && account < created);
        }
    }

    #[test]
    fn test_reapply_is_idempotent() {
        let fixture = fixture();
        let provider = provider();
        let store = MemoryStateStore::new();

        let (_, mut graph) = prepare(&fixture.source, "", &Topology::default()).unwrap();
        apply_simple(&mut graph, &provider, &store, &ExecuteOptions::default()).unwrap();
        let after_first = provider.backend().calls().len();

        let (_, mut graph) = prepare(&fixture.source, "", &Topology::default()).unwrap();
        let report = apply_simple(&mut graph, &provider, &store, &ExecuteOptions::default()).unwrap();
        assert_eq!(report.summary.no_change, 6);
        assert_eq!(provider.backend().calls().len(), after_first);
    }

    #[test]
    fn test_external_firewall_failure_skips_instances() {
        let fixture = fixture();
        let (_, mut graph) = prepare(&fixture.source, "", &Topology::default()).unwrap();
        let provider = provider();
        provider.backend().fail_on("cks-external");
        let store = MemoryStateStore::new();

        let report = apply_simple(&mut graph, &provider, &store, &ExecuteOptions::default()).unwrap();
        assert!(!report.is_success());
        assert_eq!(report.state("cks-external"), Some(NodeState::Failed));
        assert_eq!(report.state("cks-internal"), Some(NodeState::Created));
        assert_eq!(report.state("cks-nodes"), Some(NodeState::Created));
        assert_eq!(report.state("master"), Some(NodeState::Skipped));
        assert_eq!(report.state("worker"), Some(NodeState::Skipped));
        assert!(matches!(report.result("cks-external"), Some(ApplyResult::Failed { .. })));
        assert!(!provider.backend().exists("master"));
    }

    #[test]
    fn test_label_change_updates_in_place() {
        let fixture = fixture();
        let provider = provider();
        let store = MemoryStateStore::new();
        let mut topology = Topology::default();

        let (_, mut graph) = prepare(&fixture.source, "", &topology).unwrap();
        apply_simple(&mut graph, &provider, &store, &ExecuteOptions::default()).unwrap();

        topology.instances[1].labels.insert("pool".to_string(), "spot".to_string());
        let (_, mut graph) = prepare(&fixture.source, "", &topology).unwrap();
        let report = apply_simple(&mut graph, &provider, &store, &ExecuteOptions::default()).unwrap();

        assert_eq!(report.result("worker"), Some(&ApplyResult::Modified));
        assert_eq!(report.summary.no_change, 5);
        assert_eq!(
            provider.backend().calls().last().map(String::as_str),
            Some("set_instance_labels worker +env,node,pool -")
        );
        assert_eq!(
            graph.outputs("worker").unwrap()["assignedIP"],
            store.snapshot().get("worker").unwrap().outputs["assignedIP"]
        );
        assert!(matches!(graph.outputs("worker").unwrap()["assignedIP"], Value::String(_)));
    }

    #[test]
    fn test_topology_overrides_from_data() {
        let json = r#"{
            "instances": [{"name": "control-plane", "machine-type": "e2-standard-4"}],
            "labels": {"env": "lab"}
        }"#;
        let topology: Topology = serde_json::from_str(json).unwrap();
        assert_eq!(topology.network.name, "cks-network");
        assert_eq!(topology.instances.len(), 1);
        assert_eq!(topology.instances[0].machine_type, "e2-standard-4");
        assert_eq!(topology.instances[0].boot_disk_size_gb, 50);
        assert!(topology.validate().is_ok());

        let mut bad = topology;
        bad.instances[0].name = "Control_Plane".to_string();
        assert!(bad.validate().is_err());
    }
}
