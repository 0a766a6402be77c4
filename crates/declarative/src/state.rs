//! Recorded state of previously applied resources
//!
//! The executor diffs each node's resolved inputs against the record from the
//! last successful apply. Persistence is an external concern: implement
//! [`StateStore`] for a backing store, or use [`MemoryStateStore`].

use crate::resource::ResourceKind;
use crate::value::{Properties, ResourceId};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Current state format version
pub const STATE_VERSION: u32 = 1;

/// What was last applied for one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedResource {
    pub kind: ResourceKind,
    /// Fully resolved inputs sent to the provider
    #[serde(default)]
    pub inputs: Properties,
    /// Properties the provider returned
    #[serde(default)]
    pub outputs: Properties,
    /// Dependencies at the time of the apply, used to order deletions
    #[serde(default)]
    pub dependencies: Vec<ResourceId>,
}

/// All recorded resources of a stack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackState {
    pub version: u32,
    /// Incremented on every save that changed something
    pub serial: u64,
    #[serde(default)]
    pub resources: BTreeMap<ResourceId, RecordedResource>,
}

impl StackState {
    pub fn new() -> Self {
        Self {
            version: STATE_VERSION,
            serial: 0,
            resources: BTreeMap::new(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&RecordedResource> {
        self.resources.get(id)
    }

    pub fn record(&mut self, id: ResourceId, resource: RecordedResource) {
        self.resources.insert(id, resource);
    }

    pub fn remove(&mut self, id: &str) -> Option<RecordedResource> {
        self.resources.remove(id)
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

impl Default for StackState {
    fn default() -> Self {
        Self::new()
    }
}

/// Backing store for recorded state
pub trait StateStore: Send + Sync {
    /// Load the last saved state, or an empty state if none exists
    fn load(&self) -> Result<StackState>;

    /// Persist the state
    fn save(&self, state: &StackState) -> Result<()>;
}

/// In-process state store, lost when the process exits
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    state: Mutex<StackState>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing state
    pub fn with_state(state: StackState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    /// Copy of the stored state
    pub fn snapshot(&self) -> StackState {
        match self.state.lock() {
            Ok(state) => state.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self) -> Result<StackState> {
        Ok(self.snapshot())
    }

    fn save(&self, state: &StackState) -> Result<()> {
        match self.state.lock() {
            Ok(mut stored) => *stored = state.clone(),
            Err(poisoned) => *poisoned.into_inner() = state.clone(),
        }
        Ok(())
    }
}
