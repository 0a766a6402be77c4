//! Diff computation between recorded and desired properties

use crate::planner::{Action, PlannedStep};
use crate::resource::ResourceKind;
use crate::value::{Properties, Value};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A desired property value as far as it is known at plan time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Planned {
    Known(Value),
    /// Depends on an output that will only exist after apply
    Unknown,
}

impl fmt::Display for Planned {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(value) => write!(f, "{value}"),
            Self::Unknown => f.write_str("(known after apply)"),
        }
    }
}

/// A change to a single input property
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyChange {
    pub property: String,
    /// Recorded value, `None` if the property is new
    pub old: Option<Value>,
    /// Desired value, `None` if the property was removed
    pub new: Option<Planned>,
}

impl fmt::Display for PropertyChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.old, &self.new) {
            (None, Some(new)) => write!(f, "{} = {}", self.property, new),
            (Some(old), None) => write!(f, "{} = {} -> (removed)", self.property, old),
            (Some(old), Some(new)) => write!(f, "{} = {} -> {}", self.property, old, new),
            (None, None) => write!(f, "{}", self.property),
        }
    }
}

/// Compare recorded inputs against desired ones
///
/// Properties whose desired value is unknown always count as changed.
pub fn compute_changes(old: &Properties, new: &BTreeMap<String, Planned>) -> Vec<PropertyChange> {
    let keys: BTreeSet<&String> = old.keys().chain(new.keys()).collect();
    keys.into_iter()
        .filter_map(|key| {
            let before = old.get(key);
            let after = new.get(key);
            let unchanged = matches!(
                (before, after),
                (Some(b), Some(Planned::Known(a))) if a == b
            );
            (!unchanged).then(|| PropertyChange {
                property: key.clone(),
                old: before.cloned(),
                new: after.cloned(),
            })
        })
        .collect()
}

/// Diff summary statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffSummary {
    /// Number of resources to create
    pub additions: usize,
    /// Number of resources to update in place
    pub modifications: usize,
    /// Number of resources to delete and recreate
    pub replacements: usize,
    /// Number of recorded resources to delete
    pub removals: usize,
    /// Number of resources already converged
    pub unchanged: usize,
}

impl DiffSummary {
    /// Create a summary from planned steps
    pub fn from_steps(steps: &[PlannedStep]) -> Self {
        let mut summary = Self::default();
        for step in steps {
            match step.action {
                Action::Create => summary.additions += 1,
                Action::Update { .. } => summary.modifications += 1,
                Action::Replace { .. } => summary.replacements += 1,
                Action::Delete => summary.removals += 1,
                Action::NoChange => summary.unchanged += 1,
            }
        }
        summary
    }

    /// Total number of changes
    pub fn total(&self) -> usize {
        self.additions + self.modifications + self.replacements + self.removals
    }

    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }
}

impl fmt::Display for DiffSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} to add, {} to change, {} to replace, {} to destroy",
            self.additions, self.modifications, self.replacements, self.removals
        )
    }
}

/// Group planned steps by resource kind
pub fn group_by_type(steps: &[PlannedStep]) -> BTreeMap<ResourceKind, Vec<&PlannedStep>> {
    let mut groups: BTreeMap<ResourceKind, Vec<&PlannedStep>> = BTreeMap::new();
    for step in steps {
        groups.entry(step.kind.clone()).or_default().push(step);
    }
    groups
}
