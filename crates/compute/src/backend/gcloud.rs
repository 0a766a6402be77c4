//! Real Compute Engine backend using `gcloud` commands.
//!
//! Argument construction and response parsing are plain functions so they can
//! be tested without the CLI installed.

use crate::backend::ComputeBackend;
use crate::error::{Error, Result};
use crate::resources::{
    FirewallOutputs, FirewallRequest, InstanceOutputs, InstanceRequest, NetworkOutputs, NetworkRequest,
    ServiceAccountOutputs, ServiceAccountRequest,
};
use regex::Regex;
use std::collections::BTreeMap;
use std::process::Command;
use std::sync::LazyLock;

/// Public image project used when a boot image names only a family
pub const DEFAULT_IMAGE_PROJECT: &str = "ubuntu-os-cloud";

const API_PREFIX: &str = "https://www.googleapis.com/compute/v1/";

static RESOURCE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]([-a-z0-9]{0,61}[a-z0-9])?$").expect("valid regex"));

static ACCOUNT_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][-a-z0-9]{4,28}[a-z0-9]$").expect("valid regex"));

/// Backend that executes real `gcloud` commands.
pub struct GcloudBackend {
    /// Path to the gcloud executable
    gcloud_path: String,
    /// Project passed with `--project`; gcloud's active project otherwise
    project: Option<String>,
    image_project: String,
}

impl GcloudBackend {
    /// Create a new GcloudBackend.
    ///
    /// Returns an error if the Google Cloud CLI is not installed.
    pub fn new() -> Result<Self> {
        let gcloud_path = find_gcloud()?;
        Ok(Self {
            gcloud_path,
            project: None,
            image_project: DEFAULT_IMAGE_PROJECT.to_string(),
        })
    }

    pub fn with_project(mut self, project: Option<String>) -> Self {
        self.project = project;
        self
    }

    pub fn with_image_project(mut self, image_project: impl Into<String>) -> Self {
        self.image_project = image_project.into();
        self
    }

    /// Run a gcloud command and return output.
    fn run_gcloud(&self, args: &[String]) -> Result<std::process::Output> {
        let mut command = Command::new(&self.gcloud_path);
        command.args(args).arg("--format=json");
        if let Some(project) = &self.project {
            command.arg(format!("--project={project}"));
        }
        log::debug!("gcloud {}", args.join(" "));

        let output = command.output().map_err(|e| Error::CommandFailed {
            message: format!("failed to execute gcloud: {e}"),
            stderr: String::new(),
        })?;
        Ok(output)
    }

    /// Run a gcloud command, check for success and parse its JSON output.
    fn run_gcloud_checked(&self, args: &[String], resource_name: Option<&str>) -> Result<serde_json::Value> {
        let output = self.run_gcloud(args)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::from_gcloud_output(&stderr, resource_name));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        Ok(serde_json::from_str(&stdout)?)
    }
}

impl ComputeBackend for GcloudBackend {
    fn is_available(&self) -> bool {
        self.run_gcloud(&["version".to_string()])
            .is_ok_and(|o| o.status.success())
    }

    fn create_network(&self, name: &str, request: &NetworkRequest) -> Result<NetworkOutputs> {
        validate_name(name)?;
        let json = self.run_gcloud_checked(&network_create_args(name, request), Some(name))?;
        parse_network(&json)
    }

    fn delete_network(&self, name: &str) -> Result<()> {
        self.run_gcloud_checked(&delete_args(&["compute", "networks"], name, None), Some(name))?;
        Ok(())
    }

    fn create_firewall(&self, name: &str, request: &FirewallRequest) -> Result<FirewallOutputs> {
        validate_name(name)?;
        let json = self.run_gcloud_checked(&firewall_create_args(name, request), Some(name))?;
        parse_firewall(&json)
    }

    fn update_firewall(&self, name: &str, request: &FirewallRequest) -> Result<FirewallOutputs> {
        self.run_gcloud_checked(&firewall_update_args(name, request), Some(name))?;
        let describe = vec![
            "compute".to_string(),
            "firewall-rules".to_string(),
            "describe".to_string(),
            name.to_string(),
        ];
        let json = self.run_gcloud_checked(&describe, Some(name))?;
        parse_firewall(&json)
    }

    fn delete_firewall(&self, name: &str) -> Result<()> {
        self.run_gcloud_checked(&delete_args(&["compute", "firewall-rules"], name, None), Some(name))?;
        Ok(())
    }

    fn create_service_account(&self, request: &ServiceAccountRequest) -> Result<ServiceAccountOutputs> {
        validate_account_id(&request.account_id)?;
        let json = self.run_gcloud_checked(&service_account_create_args(request), Some(&request.account_id))?;
        parse_service_account(&json)
    }

    fn update_service_account(&self, email: &str, display_name: &str) -> Result<()> {
        let args = vec![
            "iam".to_string(),
            "service-accounts".to_string(),
            "update".to_string(),
            email.to_string(),
            format!("--display-name={display_name}"),
        ];
        self.run_gcloud_checked(&args, Some(email))?;
        Ok(())
    }

    fn delete_service_account(&self, email: &str) -> Result<()> {
        self.run_gcloud_checked(&delete_args(&["iam", "service-accounts"], email, None), Some(email))?;
        Ok(())
    }

    fn create_instance(&self, name: &str, request: &InstanceRequest) -> Result<InstanceOutputs> {
        validate_name(name)?;
        let args = instance_create_args(name, request, &self.image_project);
        let json = self.run_gcloud_checked(&args, Some(name))?;
        parse_instance(&json)
    }

    fn set_instance_labels(
        &self,
        name: &str,
        zone: &str,
        labels: &BTreeMap<String, String>,
        removed: &[String],
    ) -> Result<()> {
        if !labels.is_empty() {
            let args = label_args("add-labels", name, zone, &key_values(labels, ","));
            self.run_gcloud_checked(&args, Some(name))?;
        }
        if !removed.is_empty() {
            let args = label_args("remove-labels", name, zone, &removed.join(","));
            self.run_gcloud_checked(&args, Some(name))?;
        }
        Ok(())
    }

    fn delete_instance(&self, name: &str, zone: &str) -> Result<()> {
        self.run_gcloud_checked(&delete_args(&["compute", "instances"], name, Some(zone)), Some(name))?;
        Ok(())
    }
}

/// Find the gcloud executable path.
fn find_gcloud() -> Result<String> {
    // Check common locations
    let paths = [
        "/usr/bin/gcloud",
        "/usr/local/bin/gcloud",
        "/opt/homebrew/bin/gcloud",
        "/usr/lib/google-cloud-sdk/bin/gcloud",
        "/snap/bin/gcloud",
    ];

    for path in &paths {
        if std::path::Path::new(path).exists() {
            return Ok(path.to_string());
        }
    }

    // Try which
    let output = Command::new("which")
        .arg("gcloud")
        .output()
        .map_err(|_| Error::GcloudNotFound)?;

    if output.status.success() {
        let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !path.is_empty() {
            return Ok(path);
        }
    }

    Err(Error::GcloudNotFound)
}

/// Check a network, firewall or instance name against the GCE naming rules.
pub fn validate_name(name: &str) -> Result<()> {
    if RESOURCE_NAME.is_match(name) {
        Ok(())
    } else {
        Err(Error::InvalidName {
            name: name.to_string(),
            rule: "1-63 lowercase letters, digits or hyphens, starting with a letter",
        })
    }
}

/// Check a service account id against the IAM naming rules.
pub fn validate_account_id(account_id: &str) -> Result<()> {
    if ACCOUNT_ID.is_match(account_id) {
        Ok(())
    } else {
        Err(Error::InvalidName {
            name: account_id.to_string(),
            rule: "6-30 lowercase letters, digits or hyphens, starting with a letter",
        })
    }
}

/// Strip the API host from a self link, leaving `projects/.../name`.
pub fn relative_path(self_link: &str) -> &str {
    self_link.strip_prefix(API_PREFIX).unwrap_or(self_link)
}

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| (*s).to_string()).collect()
}

fn key_values(map: &BTreeMap<String, String>, separator: &str) -> String {
    map.iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(separator)
}

fn delete_args(group: &[&str], name: &str, zone: Option<&str>) -> Vec<String> {
    let mut args = strings(group);
    args.push("delete".to_string());
    args.push(name.to_string());
    if let Some(zone) = zone {
        args.push(format!("--zone={zone}"));
    }
    args.push("--quiet".to_string());
    args
}

fn label_args(command: &str, name: &str, zone: &str, labels: &str) -> Vec<String> {
    let mut args = strings(&["compute", "instances", command, name]);
    args.push(format!("--zone={zone}"));
    args.push(format!("--labels={labels}"));
    args
}

pub fn network_create_args(name: &str, request: &NetworkRequest) -> Vec<String> {
    let mut args = strings(&["compute", "networks", "create", name]);
    let mode = if request.auto_create_subnetworks { "auto" } else { "custom" };
    args.push(format!("--subnet-mode={mode}"));
    args
}

fn firewall_rule_args(args: &mut Vec<String>, request: &FirewallRequest) {
    let allows: Vec<String> = request.allows.iter().flat_map(|a| a.to_rule_args()).collect();
    args.push(format!("--allow={}", allows.join(",")));
    let ranges: Vec<String> = request.source_ranges.iter().map(ToString::to_string).collect();
    args.push(format!("--source-ranges={}", ranges.join(",")));
    if let Some(priority) = request.priority {
        args.push(format!("--priority={priority}"));
    }
}

pub fn firewall_create_args(name: &str, request: &FirewallRequest) -> Vec<String> {
    let mut args = strings(&["compute", "firewall-rules", "create", name]);
    args.push(format!("--network={}", request.network));
    args.push("--direction=INGRESS".to_string());
    firewall_rule_args(&mut args, request);
    args
}

pub fn firewall_update_args(name: &str, request: &FirewallRequest) -> Vec<String> {
    let mut args = strings(&["compute", "firewall-rules", "update", name]);
    firewall_rule_args(&mut args, request);
    args
}

pub fn service_account_create_args(request: &ServiceAccountRequest) -> Vec<String> {
    let mut args = strings(&["iam", "service-accounts", "create", request.account_id.as_str()]);
    args.push(format!("--display-name={}", request.display_name));
    args
}

pub fn instance_create_args(name: &str, request: &InstanceRequest, image_project: &str) -> Vec<String> {
    let mut args = strings(&["compute", "instances", "create", name]);
    args.push(format!("--zone={}", request.zone));
    args.push(format!("--machine-type={}", request.machine_type));

    // `project/family` selects a family from another image project
    match request.boot_image.split_once('/') {
        Some((project, family)) => {
            args.push(format!("--image-project={project}"));
            args.push(format!("--image-family={family}"));
        }
        None => {
            args.push(format!("--image-project={image_project}"));
            args.push(format!("--image-family={}", request.boot_image));
        }
    }
    args.push(format!("--boot-disk-size={}GB", request.boot_disk_size_gb));
    args.push(format!("--network={}", request.network));

    if !request.metadata.is_empty() {
        // ';' delimiter so values such as ssh keys may contain commas
        args.push(format!("--metadata=^;^{}", key_values(&request.metadata, ";")));
    }
    args.push(format!("--service-account={}", request.service_account_email));
    if !request.scopes.is_empty() {
        args.push(format!("--scopes={}", request.scopes.join(",")));
    }
    if !request.labels.is_empty() {
        args.push(format!("--labels={}", key_values(&request.labels, ",")));
    }
    args
}

/// `create` commands print a list with the created resource.
fn first(json: &serde_json::Value) -> &serde_json::Value {
    json.as_array().and_then(|arr| arr.first()).unwrap_or(json)
}

fn field<'a>(json: &'a serde_json::Value, key: &str, field: &'static str) -> Result<&'a str> {
    json[key].as_str().ok_or(Error::MissingField { field })
}

pub fn parse_network(json: &serde_json::Value) -> Result<NetworkOutputs> {
    let network = first(json);
    let self_link = field(network, "selfLink", "network selfLink")?;
    Ok(NetworkOutputs {
        id: relative_path(self_link).to_string(),
        self_link: self_link.to_string(),
    })
}

pub fn parse_firewall(json: &serde_json::Value) -> Result<FirewallOutputs> {
    let rule = first(json);
    let self_link = field(rule, "selfLink", "firewall selfLink")?;
    Ok(FirewallOutputs {
        id: relative_path(self_link).to_string(),
        self_link: self_link.to_string(),
    })
}

pub fn parse_service_account(json: &serde_json::Value) -> Result<ServiceAccountOutputs> {
    let account = first(json);
    Ok(ServiceAccountOutputs {
        email: field(account, "email", "service account email")?.to_string(),
        unique_id: account["uniqueId"].as_str().unwrap_or_default().to_string(),
    })
}

pub fn parse_instance(json: &serde_json::Value) -> Result<InstanceOutputs> {
    let instance = first(json);
    let self_link = field(instance, "selfLink", "instance selfLink")?;
    let interface = &instance["networkInterfaces"][0];

    // External address when one is attached, internal otherwise
    let assigned_ip = interface["accessConfigs"][0]["natIP"]
        .as_str()
        .or_else(|| interface["networkIP"].as_str())
        .ok_or(Error::MissingField {
            field: "instance IP address",
        })?;

    Ok(InstanceOutputs {
        id: relative_path(self_link).to_string(),
        self_link: self_link.to_string(),
        assigned_ip: assigned_ip.to_string(),
    })
}
