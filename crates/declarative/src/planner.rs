//! Planner - previews what an apply would change
//!
//! A plan walks the graph in topological order and classifies every node
//! against the recorded state. Output references into dependencies that are
//! themselves unchanged resolve from their recorded outputs; anything else is
//! only known after apply.

use crate::diff::{DiffSummary, Planned, PropertyChange, compute_changes};
use crate::error::Result;
use crate::graph::ResourceGraph;
use crate::resource::ResourceKind;
use crate::state::{RecordedResource, StackState};
use crate::value::{Properties, ResourceId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

/// What an apply does with one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Create,
    /// Converge in place
    Update { changes: Vec<PropertyChange> },
    /// The recorded resource has a different kind; delete, then create
    Replace { changes: Vec<PropertyChange> },
    NoChange,
    /// Recorded but no longer declared
    Delete,
}

impl Action {
    pub fn is_change(&self) -> bool {
        !matches!(self, Self::NoChange)
    }

    /// Property changes, if any
    pub fn changes(&self) -> &[PropertyChange] {
        match self {
            Self::Update { changes } | Self::Replace { changes } => changes,
            _ => &[],
        }
    }

    /// Marker used when rendering plans
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Create => "+",
            Self::Update { .. } => "~",
            Self::Replace { .. } => "-/+",
            Self::NoChange => " ",
            Self::Delete => "-",
        }
    }
}

/// One resource in a plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStep {
    pub id: ResourceId,
    pub kind: ResourceKind,
    pub action: Action,
}

/// A preview of an apply: declared resources in dependency order, then
/// deletions with dependents first
#[derive(Debug, Clone, Default)]
pub struct Plan {
    steps: Vec<PlannedStep>,
}

impl Plan {
    pub fn steps(&self) -> &[PlannedStep] {
        &self.steps
    }

    pub fn step(&self, id: &str) -> Option<&PlannedStep> {
        self.steps.iter().find(|s| s.id.as_str() == id)
    }

    pub fn summary(&self) -> DiffSummary {
        DiffSummary::from_steps(&self.steps)
    }

    pub fn has_changes(&self) -> bool {
        self.steps.iter().any(|s| s.action.is_change())
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for step in &self.steps {
            match &step.action {
                Action::NoChange => {
                    writeln!(f, "    {} {} (no changes)", step.kind, step.id)?;
                }
                action => {
                    writeln!(f, "{:>5} {} {}", action.symbol(), step.kind, step.id)?;
                    for change in action.changes() {
                        writeln!(f, "        {change}")?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Compute a plan for `graph` against previously recorded `state`
///
/// Fails on the same structural errors as an apply, before any provider is
/// involved.
pub fn plan(graph: &ResourceGraph, state: &StackState) -> Result<Plan> {
    graph.validate()?;

    let mut known: HashMap<usize, &Properties> = HashMap::new();
    let mut steps = Vec::with_capacity(graph.len());

    for idx in graph.topological_indices()? {
        let descriptor = graph.node_descriptor(idx);
        let mut inputs = BTreeMap::new();
        for (property, input) in descriptor.inputs() {
            let value = input.resolve_with(&mut |r| {
                let dep = graph.position(r.resource())?;
                Ok(known
                    .get(&dep)
                    .and_then(|outputs| outputs.get(r.property()))
                    .cloned())
            })?;
            inputs.insert(property.clone(), value.map_or(Planned::Unknown, Planned::Known));
        }

        let record = state.get(descriptor.name().as_str());
        let action = classify(descriptor.kind(), &inputs, record);
        if let (Action::NoChange, Some(record)) = (&action, record) {
            known.insert(idx, &record.outputs);
        }
        steps.push(PlannedStep {
            id: descriptor.name().clone(),
            kind: descriptor.kind().clone(),
            action,
        });
    }

    for id in deletion_order(graph, state) {
        if let Some(record) = state.get(id.as_str()) {
            steps.push(PlannedStep {
                kind: record.kind.clone(),
                id,
                action: Action::Delete,
            });
        }
    }

    Ok(Plan { steps })
}

/// Decide what to do with a declared resource given its recorded state
pub(crate) fn classify(
    kind: &ResourceKind,
    inputs: &BTreeMap<String, Planned>,
    record: Option<&RecordedResource>,
) -> Action {
    let Some(record) = record else {
        return Action::Create;
    };
    let changes = compute_changes(&record.inputs, inputs);
    if record.kind != *kind {
        Action::Replace { changes }
    } else if changes.is_empty() {
        Action::NoChange
    } else {
        Action::Update { changes }
    }
}

/// Recorded resources that are no longer declared, dependents first
pub(crate) fn deletion_order(graph: &ResourceGraph, state: &StackState) -> Vec<ResourceId> {
    let orphans: BTreeSet<&ResourceId> = state
        .resources
        .keys()
        .filter(|id| !graph.contains(id.as_str()))
        .collect();

    // Number of orphans that still depend on each orphan
    let mut dependents: BTreeMap<&ResourceId, usize> = orphans.iter().map(|id| (*id, 0)).collect();
    for id in &orphans {
        for dep in &state.resources[*id].dependencies {
            if let Some(count) = dependents.get_mut(dep) {
                *count += 1;
            }
        }
    }

    let mut ready: BTreeSet<&ResourceId> = dependents
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut order: Vec<ResourceId> = Vec::with_capacity(orphans.len());
    while let Some(id) = ready.pop_first() {
        order.push(id.clone());
        for dep in &state.resources[id].dependencies {
            if let Some(count) = dependents.get_mut(dep) {
                *count -= 1;
                if *count == 0 {
                    ready.insert(dep);
                }
            }
        }
    }

    // A cycle in recorded dependencies cannot be ordered; fall back to name order
    for id in orphans {
        if !order.contains(id) {
            order.push(id.clone());
        }
    }
    order
}
