use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use declarative::{RecordedResource, ResourceId, STATE_VERSION, StackState, StateStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

// ============================================================================
// State File
// ============================================================================

/// On-disk form of a stack's recorded state
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StateFile {
    pub version: u32,

    #[serde(default)]
    pub serial: u64,

    /// Last time the state was written
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub resources: BTreeMap<ResourceId, RecordedResource>,
}

impl From<StateFile> for StackState {
    fn from(file: StateFile) -> Self {
        Self {
            version: file.version,
            serial: file.serial,
            resources: file.resources,
        }
    }
}

impl From<&StackState> for StateFile {
    fn from(state: &StackState) -> Self {
        Self {
            version: state.version,
            serial: state.serial,
            updated_at: Some(Utc::now()),
            resources: state.resources.clone(),
        }
    }
}

// ============================================================================
// FileStateStore
// ============================================================================

/// Recorded state of one stack, kept in a TOML file
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the state file with its metadata, or `None` if it doesn't exist
    pub fn read(&self) -> Result<Option<StateFile>> {
        if !self.path.exists() {
            log::debug!("State file {} does not exist", self.path.display());
            return Ok(None);
        }

        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read state file: {}", self.path.display()))?;

        let file: StateFile = toml::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {}", self.path.display()))?;

        if file.version > STATE_VERSION {
            bail!(
                "State file {} has version {}, this umami understands up to {}",
                self.path.display(),
                file.version,
                STATE_VERSION
            );
        }

        log::debug!("Loaded state from {}", self.path.display());
        Ok(Some(file))
    }
}

impl StateStore for FileStateStore {
    fn load(&self) -> Result<StackState> {
        Ok(self.read()?.map(StackState::from).unwrap_or_default())
    }

    fn save(&self, state: &StackState) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create state directory: {}", dir.display()))?;
        }

        let content =
            toml::to_string_pretty(&StateFile::from(state)).context("Failed to serialize state to TOML")?;

        // Write next to the target, then rename over it
        let tmp = self.path.with_extension("toml.tmp");
        fs::write(&tmp, &content).with_context(|| format!("Failed to write state file: {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace state file: {}", self.path.display()))?;

        log::debug!("Saved state to {}", self.path.display());
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::{ResourceKind, Value};

    fn sample() -> StackState {
        let mut state = StackState::new();
        state.serial = 3;

        let mut inputs = BTreeMap::new();
        inputs.insert("autoCreateSubnetworks".to_string(), Value::from(true));
        let mut outputs = BTreeMap::new();
        outputs.insert(
            "id".to_string(),
            Value::from("projects/p/global/networks/cks-network"),
        );
        state.record(
            ResourceId::new("cks-network"),
            RecordedResource {
                kind: ResourceKind::new("gcp:compute:Network"),
                inputs,
                outputs,
                dependencies: Vec::new(),
            },
        );

        let mut labels = BTreeMap::new();
        labels.insert("env".to_string(), Value::from("cks"));
        let mut inputs = BTreeMap::new();
        inputs.insert("labels".to_string(), Value::Map(labels));
        inputs.insert("bootDiskSizeGb".to_string(), Value::from(50_i64));
        inputs.insert(
            "scopes".to_string(),
            Value::List(vec![Value::from("cloud-platform")]),
        );
        state.record(
            ResourceId::new("master"),
            RecordedResource {
                kind: ResourceKind::new("gcp:compute:Instance"),
                inputs,
                outputs: BTreeMap::new(),
                dependencies: vec![ResourceId::new("cks-network")],
            },
        );
        state
    }

    #[test]
    fn test_missing_file_loads_empty_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path().join("dev.toml"));
        let state = store.load().unwrap();
        assert!(state.is_empty());
        assert_eq!(state.version, STATE_VERSION);
        assert!(store.read().unwrap().is_none());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path().join("nested").join("dev.toml"));
        let state = sample();

        store.save(&state).unwrap();
        assert!(store.path().exists());
        assert!(!store.path().with_extension("toml.tmp").exists());

        assert_eq!(store.load().unwrap(), state);
        assert!(store.read().unwrap().unwrap().updated_at.is_some());
    }

    #[test]
    fn test_newer_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dev.toml");
        fs::write(&path, "version = 99\nserial = 1\n").unwrap();

        let err = FileStateStore::new(&path).load().unwrap_err();
        assert!(err.to_string().contains("version 99"));
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dev.toml");
        fs::write(&path, "this is not toml [").unwrap();
        assert!(FileStateStore::new(&path).load().is_err());
    }
}
