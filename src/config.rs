//! Stack files
//!
//! A stack is one deployment of a topology: a TOML file holding its
//! configuration values and, optionally, topology overrides.
//!
//! ```toml
//! project = "my-gcp-project"
//!
//! [config]
//! ip-cidr = "203.0.113.5/32"
//! zone = "europe-west1-b"
//! ssh-pubkey-path = "~/.ssh/id_ed25519.pub"
//!
//! [topology]
//! labels = { env = "cks" }
//! ```
//!
//! Environment variables (`UMAMI_ZONE`, `UMAMI_IP_CIDR`, ...) take precedence
//! over `[config]` values.

use anyhow::{Context, Result};
use compute::Topology;
use declarative::{EnvSource, LayeredSource, MapSource};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::paths;

/// Prefix of configuration environment variables
pub const ENV_PREFIX: &str = "UMAMI";

/// Contents of a stack file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StackFile {
    /// Google Cloud project; gcloud's active project when absent
    #[serde(default)]
    pub project: Option<String>,

    /// Configuration namespace; keys are looked up as `namespace:key`
    #[serde(default)]
    pub namespace: String,

    #[serde(default)]
    pub config: BTreeMap<String, toml::Value>,

    #[serde(default)]
    pub topology: Topology,
}

/// A loaded stack
#[derive(Debug, Clone)]
pub struct Stack {
    /// Stack name, the file stem
    pub name: String,
    pub path: PathBuf,
    pub file: StackFile,
}

impl Stack {
    /// Load the stack file at `explicit`, or the default stack file
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = paths::stack_file(explicit)?;
        let content = fs::read_to_string(&path).with_context(|| {
            format!(
                "Could not read stack file {} (pass --stack or set {})",
                path.display(),
                paths::ENV_STACK
            )
        })?;
        let stack = Self::parse(&path, &content)?;
        log::debug!("Loaded stack '{}' from {}", stack.name, path.display());
        Ok(stack)
    }

    pub fn parse(path: &Path, content: &str) -> Result<Self> {
        let file: StackFile =
            toml::from_str(content).with_context(|| format!("Invalid stack file {}", path.display()))?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.is_empty())
            .context("Stack file has no name")?;
        Ok(Self {
            name,
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn topology(&self) -> &Topology {
        &self.file.topology
    }

    pub fn namespace(&self) -> &str {
        &self.file.namespace
    }

    pub fn project(&self) -> Option<String> {
        self.file.project.clone()
    }

    /// Values from the `[config]` table, as strings with `~` and `$VAR` expanded
    pub fn values(&self) -> BTreeMap<String, String> {
        self.file
            .config
            .iter()
            .map(|(key, value)| {
                let raw = match value {
                    toml::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                let expanded = if raw.starts_with('~') || raw.contains('$') {
                    paths::expand(&raw).to_string_lossy().into_owned()
                } else {
                    raw
                };
                (key.clone(), expanded)
            })
            .collect()
    }

    /// Configuration source: environment first, then the stack file
    pub fn source(&self) -> LayeredSource {
        LayeredSource::new()
            .with_layer(EnvSource::new(ENV_PREFIX))
            .with_layer(MapSource::from(self.values()))
    }
}
