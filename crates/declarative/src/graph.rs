//! Resource graph - descriptors, dependency edges and the results table
//!
//! The graph owns every descriptor registered during a run together with the
//! per-node state and the outputs returned by the provider. Edges come from
//! two places:
//!
//! - explicit dependencies (`depends_on` on the descriptor, or
//!   [`ResourceGraph::add_dependency`])
//! - implicit dependencies inferred from output references in the inputs
//!
//! Both must form a DAG; [`ResourceGraph::validate`] checks that before
//! anything is scheduled.

use crate::error::{Error, Result};
use crate::resource::{Resource, ResourceDescriptor};
use crate::value::{OutputRef, Properties, ResourceId, Value};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt;

/// Lifecycle state of a node within a run
///
/// `Pending -> Resolving -> Created | Failed`. Nodes that are never
/// dispatched because a dependency did not reach `Created` end in `Skipped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeState {
    Pending,
    Resolving,
    Created,
    Failed,
    Skipped,
}

impl NodeState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Created | Self::Failed | Self::Skipped)
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Resolving => "resolving",
            Self::Created => "created",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
struct Node {
    descriptor: ResourceDescriptor,
    /// Edges added after registration
    extra_dependencies: BTreeSet<ResourceId>,
    state: NodeState,
    outputs: Option<Properties>,
}

impl Node {
    fn dependencies(&self) -> BTreeSet<ResourceId> {
        let mut deps = self.descriptor.implicit_dependencies();
        deps.extend(self.descriptor.explicit_dependencies().iter().cloned());
        deps.extend(self.extra_dependencies.iter().cloned());
        deps
    }
}

/// The set of resources declared for a run and the edges between them
#[derive(Debug, Default)]
pub struct ResourceGraph {
    nodes: Vec<Node>,
    index: HashMap<ResourceId, usize>,
}

impl ResourceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor under its logical name
    pub fn register(&mut self, descriptor: ResourceDescriptor) -> Result<ResourceId> {
        let id = descriptor.name().clone();
        if self.index.contains_key(&id) {
            return Err(Error::DuplicateName(id));
        }

        log::debug!("Registered {} ({})", id, descriptor.kind());
        self.index.insert(id.clone(), self.nodes.len());
        self.nodes.push(Node {
            descriptor,
            extra_dependencies: BTreeSet::new(),
            state: NodeState::Pending,
            outputs: None,
        });
        Ok(id)
    }

    /// Register a typed resource definition under `name`
    pub fn declare(&mut self, name: impl Into<ResourceId>, resource: &dyn Resource) -> Result<ResourceId> {
        self.register(ResourceDescriptor::from_resource(name, resource))
    }

    /// Record that `from` depends on `to`
    pub fn add_dependency(&mut self, from: &ResourceId, to: &ResourceId) -> Result<()> {
        if !self.index.contains_key(to) {
            return Err(Error::UnknownResource(to.clone()));
        }
        let idx = self.position(from)?;
        self.nodes[idx].extra_dependencies.insert(to.clone());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Resource ids in registration order
    pub fn ids(&self) -> impl Iterator<Item = &ResourceId> {
        self.nodes.iter().map(|n| n.descriptor.name())
    }

    pub fn descriptor(&self, id: &str) -> Option<&ResourceDescriptor> {
        self.index.get(id).map(|&i| &self.nodes[i].descriptor)
    }

    pub fn state(&self, id: &str) -> Option<NodeState> {
        self.index.get(id).map(|&i| self.nodes[i].state)
    }

    /// Outputs recorded for a created resource
    pub fn outputs(&self, id: &str) -> Option<&Properties> {
        self.index
            .get(id)
            .and_then(|&i| self.nodes[i].outputs.as_ref())
    }

    /// Explicit and implicit dependencies of a resource
    pub fn dependencies(&self, id: &ResourceId) -> Result<BTreeSet<ResourceId>> {
        let idx = self.position(id)?;
        Ok(self.nodes[idx].dependencies())
    }

    /// Look up the value behind an output reference
    ///
    /// Only valid once the referenced resource is `Created`; the scheduler
    /// guarantees that for every reference a dispatched node holds.
    pub fn resolve_output(&self, reference: &OutputRef) -> Result<Value> {
        let idx = self.position(reference.resource())?;
        let node = &self.nodes[idx];
        if node.state != NodeState::Created {
            return Err(Error::UnresolvedDependency {
                reference: reference.clone(),
            });
        }
        node.outputs
            .as_ref()
            .and_then(|outputs| outputs.get(reference.property()))
            .cloned()
            .ok_or_else(|| Error::MissingOutput {
                reference: reference.clone(),
            })
    }

    /// Resolve every input of a resource against the results table
    pub fn resolve_inputs(&self, id: &ResourceId) -> Result<Properties> {
        let idx = self.position(id)?;
        let mut resolved = Properties::new();
        for (property, input) in self.nodes[idx].descriptor.inputs() {
            let value = input.resolve_with(&mut |r| self.resolve_output(r).map(Some))?;
            if let Some(value) = value {
                resolved.insert(property.clone(), value);
            }
        }
        Ok(resolved)
    }

    /// Check that every edge target exists and that the edges form a DAG
    pub fn validate(&self) -> Result<()> {
        let edges = self.edges()?;

        let mut graph: DiGraph<usize, ()> = DiGraph::with_capacity(self.nodes.len(), 0);
        let indices: Vec<NodeIndex> = (0..self.nodes.len()).map(|i| graph.add_node(i)).collect();
        for (from, deps) in edges.iter().enumerate() {
            for &to in deps {
                graph.add_edge(indices[from], indices[to], ());
            }
        }

        for component in tarjan_scc(&graph) {
            let members: BTreeSet<usize> = component.iter().map(|n| graph[*n]).collect();
            let Some(&start) = members.first() else {
                continue;
            };
            let cyclic = members.len() > 1 || edges[start].contains(&start);
            if cyclic {
                let cycle = find_cycle(&edges, &members, start)
                    .into_iter()
                    .map(|i| self.nodes[i].descriptor.name().clone())
                    .collect();
                return Err(Error::Cycle { cycle });
            }
        }

        Ok(())
    }

    /// Resource ids ordered so every dependency precedes its dependents
    ///
    /// Ties are broken by registration order, so the order is stable across runs.
    pub fn topological_order(&self) -> Result<Vec<ResourceId>> {
        self.validate()?;
        Ok(self
            .topological_indices()?
            .into_iter()
            .map(|i| self.nodes[i].descriptor.name().clone())
            .collect())
    }

    // ========================================================================
    // Crate-internal accessors used by the planner and executor
    // ========================================================================

    /// Dependencies of every node, by index
    pub(crate) fn edges(&self) -> Result<Vec<Vec<usize>>> {
        self.nodes
            .iter()
            .map(|node| {
                node.dependencies()
                    .iter()
                    .map(|dep| self.position(dep))
                    .collect::<Result<Vec<_>>>()
            })
            .collect()
    }

    /// Kahn's algorithm over node indices; assumes the graph is acyclic
    pub(crate) fn topological_indices(&self) -> Result<Vec<usize>> {
        let edges = self.edges()?;
        let mut remaining: Vec<usize> = edges.iter().map(Vec::len).collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.nodes.len()];
        for (node, deps) in edges.iter().enumerate() {
            for &dep in deps {
                dependents[dep].push(node);
            }
        }

        let mut ready: BTreeSet<usize> = (0..self.nodes.len())
            .filter(|&i| remaining[i] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(node) = ready.pop_first() {
            order.push(node);
            for &dependent in &dependents[node] {
                remaining[dependent] -= 1;
                if remaining[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }
        Ok(order)
    }

    pub(crate) fn node_id(&self, idx: usize) -> &ResourceId {
        self.nodes[idx].descriptor.name()
    }

    pub(crate) fn node_descriptor(&self, idx: usize) -> &ResourceDescriptor {
        &self.nodes[idx].descriptor
    }

    pub(crate) fn node_state(&self, idx: usize) -> NodeState {
        self.nodes[idx].state
    }

    pub(crate) fn mark_resolving(&mut self, idx: usize) {
        self.transition(idx, NodeState::Resolving);
    }

    /// Store the outputs and mark the node created; written exactly once per run
    pub(crate) fn complete(&mut self, idx: usize, outputs: Properties) {
        self.nodes[idx].outputs = Some(outputs);
        self.transition(idx, NodeState::Created);
    }

    pub(crate) fn fail(&mut self, idx: usize) {
        self.transition(idx, NodeState::Failed);
    }

    pub(crate) fn skip(&mut self, idx: usize) {
        self.transition(idx, NodeState::Skipped);
    }

    fn transition(&mut self, idx: usize, to: NodeState) {
        let node = &mut self.nodes[idx];
        debug_assert!(
            !node.state.is_terminal(),
            "{} is already {}",
            node.descriptor.name(),
            node.state
        );
        log::debug!("{}: {} -> {}", node.descriptor.name(), node.state, to);
        node.state = to;
    }

    pub(crate) fn position(&self, id: &ResourceId) -> Result<usize> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| Error::UnknownResource(id.clone()))
    }
}

/// Shortest path from `start` back to itself using only nodes in `members`
fn find_cycle(edges: &[Vec<usize>], members: &BTreeSet<usize>, start: usize) -> Vec<usize> {
    if edges[start].contains(&start) {
        return vec![start];
    }

    let mut parent: HashMap<usize, usize> = HashMap::new();
    let mut queue = VecDeque::from([start]);
    while let Some(node) = queue.pop_front() {
        for &next in &edges[node] {
            if !members.contains(&next) {
                continue;
            }
            if next == start {
                let mut cycle = vec![node];
                let mut current = node;
                while current != start {
                    current = parent[&current];
                    cycle.push(current);
                }
                cycle.reverse();
                return cycle;
            }
            if !parent.contains_key(&next) {
                parent.insert(next, node);
                queue.push_back(next);
            }
        }
    }

    // Unreachable for a strongly connected component; report the members.
    members.iter().copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str) -> ResourceDescriptor {
        ResourceDescriptor::new("test:Node", name)
    }

    /// Assert that each element depends on the next, and the last on the first
    fn assert_real_cycle(graph: &ResourceGraph, cycle: &[ResourceId]) {
        assert!(!cycle.is_empty());
        for (i, id) in cycle.iter().enumerate() {
            let next = &cycle[(i + 1) % cycle.len()];
            let deps = graph.dependencies(id).unwrap();
            assert!(deps.contains(next), "{id} does not depend on {next}");
        }
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let mut graph = ResourceGraph::new();
        graph.register(node("net")).unwrap();
        let err = graph.register(node("net")).unwrap_err();
        assert!(matches!(err, Error::DuplicateName(id) if id.as_str() == "net"));
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_add_dependency_unknown() {
        let mut graph = ResourceGraph::new();
        let net = graph.register(node("net")).unwrap();
        let ghost = ResourceId::new("ghost");

        let err = graph.add_dependency(&net, &ghost).unwrap_err();
        assert!(matches!(err, Error::UnknownResource(id) if id == ghost));
        let err = graph.add_dependency(&ghost, &net).unwrap_err();
        assert!(matches!(err, Error::UnknownResource(id) if id == ghost));
    }

    #[test]
    fn test_validate_acyclic() {
        let mut graph = ResourceGraph::new();
        let net = graph.register(node("net")).unwrap();
        let fw = graph
            .register(node("fw").with_input("network", net.output("selfLink")))
            .unwrap();
        graph
            .register(
                node("vm")
                    .with_input("network", net.output("id"))
                    .with_dependency(fw),
            )
            .unwrap();

        assert!(graph.validate().is_ok());
    }

    #[test]
    fn test_validate_unknown_reference() {
        let mut graph = ResourceGraph::new();
        graph
            .register(node("vm").with_input("network", OutputRef::new("net", "id")))
            .unwrap();
        let err = graph.validate().unwrap_err();
        assert!(matches!(err, Error::UnknownResource(id) if id.as_str() == "net"));
    }

    #[test]
    fn test_validate_explicit_cycle() {
        let mut graph = ResourceGraph::new();
        let a = graph.register(node("a").with_dependency("b")).unwrap();
        let b = graph.register(node("b")).unwrap();
        graph.add_dependency(&b, &a).unwrap();

        match graph.validate().unwrap_err() {
            Error::Cycle { cycle } => {
                assert_eq!(cycle.len(), 2);
                assert_real_cycle(&graph, &cycle);
            }
            other => panic!("expected cycle, got {other}"),
        }
    }

    #[test]
    fn test_validate_cycle_through_output_references() {
        let mut graph = ResourceGraph::new();
        graph.register(node("root")).unwrap();
        graph
            .register(node("a").with_input("x", OutputRef::new("c", "out")))
            .unwrap();
        graph
            .register(node("b").with_input("x", OutputRef::new("a", "out")))
            .unwrap();
        graph
            .register(
                node("c")
                    .with_input("x", OutputRef::new("b", "out"))
                    .with_dependency("root"),
            )
            .unwrap();

        match graph.validate().unwrap_err() {
            Error::Cycle { cycle } => {
                assert_eq!(cycle.len(), 3);
                assert!(!cycle.iter().any(|id| id.as_str() == "root"));
                assert_real_cycle(&graph, &cycle);
            }
            other => panic!("expected cycle, got {other}"),
        }
    }

    #[test]
    fn test_validate_self_reference() {
        let mut graph = ResourceGraph::new();
        graph
            .register(node("a").with_input("x", OutputRef::new("a", "id")))
            .unwrap();
        match graph.validate().unwrap_err() {
            Error::Cycle { cycle } => assert_eq!(cycle, vec![ResourceId::new("a")]),
            other => panic!("expected cycle, got {other}"),
        }
    }

    #[test]
    fn test_topological_order() {
        let mut graph = ResourceGraph::new();
        // Registered out of dependency order on purpose
        graph
            .register(
                node("master")
                    .with_input("network", OutputRef::new("net", "id"))
                    .with_dependency("fw"),
            )
            .unwrap();
        graph
            .register(node("fw").with_input("network", OutputRef::new("net", "selfLink")))
            .unwrap();
        graph.register(node("net")).unwrap();
        graph.register(node("sa")).unwrap();

        let order: Vec<String> = graph
            .topological_order()
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(order, vec!["net", "fw", "master", "sa"]);

        for (pos, id) in order.iter().enumerate() {
            for dep in graph.dependencies(&ResourceId::new(id.as_str())).unwrap() {
                let dep_pos = order.iter().position(|o| o == dep.as_str()).unwrap();
                assert!(dep_pos < pos, "{dep} must precede {id}");
            }
        }
    }

    #[test]
    fn test_resolve_output_before_created() {
        let mut graph = ResourceGraph::new();
        let net = graph.register(node("net")).unwrap();
        let err = graph.resolve_output(&net.output("id")).unwrap_err();
        assert!(matches!(err, Error::UnresolvedDependency { .. }));
    }

    #[test]
    fn test_resolve_output_after_created() {
        let mut graph = ResourceGraph::new();
        let net = graph.register(node("net")).unwrap();
        let vm = graph
            .register(node("vm").with_input("network", net.output("id")))
            .unwrap();

        let mut outputs = Properties::new();
        outputs.insert("id".to_string(), Value::from("net-123"));
        graph.mark_resolving(0);
        graph.complete(0, outputs);

        assert_eq!(graph.state("net"), Some(NodeState::Created));
        assert_eq!(graph.resolve_output(&net.output("id")).unwrap(), Value::from("net-123"));
        assert!(matches!(
            graph.resolve_output(&net.output("selfLink")).unwrap_err(),
            Error::MissingOutput { .. }
        ));
        let inputs = graph.resolve_inputs(&vm).unwrap();
        assert_eq!(inputs.get("network"), Some(&Value::from("net-123")));
    }
}
