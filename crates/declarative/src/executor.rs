//! Execution engine - converges a resource graph in dependency order
//!
//! The calling thread coordinates: it owns the graph, the recorded state and
//! the callbacks, resolves each node's inputs once its dependencies are
//! terminal, and hands provider calls to a rayon pool. Workers only ever see
//! fully resolved inputs and report back over a channel, so every node's
//! state and outputs are written exactly once, by the coordinator.

use crate::context::{AutoConfirm, ConfirmCallback, NoProgress, ProgressCallback, Provider};
use crate::diff::Planned;
use crate::error::{BoxError, Error, Result};
use crate::graph::{NodeState, ResourceGraph};
use crate::planner::{self, Action};
use crate::resource::ResourceKind;
use crate::state::{RecordedResource, StackState, StateStore};
use crate::types::{ApplyReport, ApplyResult, ExecuteOptions, ResourceOutcome};
use crate::value::{Properties, ResourceId};
use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender};

const DECLINED: &str = "apply declined";
const DEPENDENCY_FAILED: &str = "dependency did not converge";
const STOPPED: &str = "apply stopped after an earlier failure";
const STILL_REFERENCED: &str = "still referenced by another recorded resource";

/// Apply a graph against the recorded state in `store`
///
/// Structural and configuration errors are returned before any provider call.
/// Provider failures are not: they are localized to the failing node, whose
/// dependents are skipped, and collected into the returned report.
///
/// # Arguments
/// * `graph` - The declared resources; node states are updated in place
/// * `provider` - Boundary that creates, updates and deletes resources
/// * `store` - Recorded state, loaded before and saved after the apply
/// * `opts` - Execution options (jobs, fail_fast)
/// * `progress` - Progress callback
/// * `confirm` - Confirmation callback, consulted once if anything would change
pub fn apply<P, C>(
    graph: &mut ResourceGraph,
    provider: &dyn Provider,
    store: &dyn StateStore,
    opts: &ExecuteOptions,
    progress: &mut P,
    confirm: &mut C,
) -> Result<ApplyReport>
where
    P: ProgressCallback + ?Sized,
    C: ConfirmCallback + ?Sized,
{
    graph.validate()?;
    let mut state = store.load().map_err(Error::state)?;
    let plan = planner::plan(graph, &state)?;
    let order = graph.topological_indices()?;
    let deletions = planner::deletion_order(graph, &state);

    if plan.has_changes()
        && !confirm
            .confirm("Apply changes?")
            .map_err(|e| Error::Executor(e.into()))?
    {
        log::info!("Apply declined, nothing changed");
        return Ok(declined(graph, &state, &order, &deletions));
    }

    progress.on_apply_start(order.len() + deletions.len());

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.jobs.max(1))
        .build()
        .map_err(|e| Error::Executor(Box::new(e)))?;

    let mut run = Run::new(graph, &mut state, opts)?;
    let (tx, rx) = mpsc::channel();
    pool.in_place_scope(|scope| run.converge(scope, provider, &mut *progress, &tx, &rx));
    let Run {
        results,
        mut errors,
        mut failed,
        mut changed,
        ..
    } = run;

    let mut report = ApplyReport::default();
    for (idx, result) in order.iter().zip(results_in(&order, results)) {
        report.push(ResourceOutcome {
            id: graph.node_id(*idx).clone(),
            kind: graph.node_descriptor(*idx).kind().clone(),
            state: Some(graph.node_state(*idx)),
            result,
        });
    }

    for id in deletions {
        let Some(previous) = state.get(id.as_str()).cloned() else {
            continue;
        };
        let result = if failed && opts.fail_fast {
            ApplyResult::Skipped {
                reason: STOPPED.to_string(),
            }
        } else if is_referenced(&state, &id) {
            log::warn!("Keeping {id}: {STILL_REFERENCED}");
            ApplyResult::Skipped {
                reason: STILL_REFERENCED.to_string(),
            }
        } else {
            progress.on_resource_start(&id, &previous.kind, &Action::Delete);
            log::info!("Deleting {id} ({})", previous.kind);
            match contain(|| provider.delete(&previous.kind, &id, &previous)) {
                Ok(()) => {
                    state.remove(id.as_str());
                    changed = true;
                    ApplyResult::Removed
                }
                Err(source) => {
                    failed = true;
                    failure(&mut errors, &id, source)
                }
            }
        };
        progress.on_resource_complete(&id, &result);
        report.push(ResourceOutcome {
            id,
            kind: previous.kind,
            state: None,
            result,
        });
    }

    if changed {
        state.serial += 1;
    }
    store.save(&state).map_err(Error::state)?;
    progress.on_apply_complete();

    report.errors = errors;
    log::debug!(
        "Apply finished: {} created, {} modified, {} removed, {} failed, {} skipped",
        report.summary.created,
        report.summary.modified,
        report.summary.removed,
        report.summary.failed,
        report.summary.skipped
    );
    Ok(report)
}

/// Apply without progress reporting or confirmation
pub fn apply_simple(
    graph: &mut ResourceGraph,
    provider: &dyn Provider,
    store: &dyn StateStore,
    opts: &ExecuteOptions,
) -> Result<ApplyReport> {
    apply(graph, provider, store, opts, &mut NoProgress, &mut AutoConfirm)
}

/// Delete every recorded resource, dependents first
pub fn destroy<P, C>(
    provider: &dyn Provider,
    store: &dyn StateStore,
    opts: &ExecuteOptions,
    progress: &mut P,
    confirm: &mut C,
) -> Result<ApplyReport>
where
    P: ProgressCallback + ?Sized,
    C: ConfirmCallback + ?Sized,
{
    apply(&mut ResourceGraph::new(), provider, store, opts, progress, confirm)
}

/// Provider work for one node, executed on a pool thread
struct Job {
    idx: usize,
    id: ResourceId,
    kind: ResourceKind,
    inputs: Properties,
    operation: Operation,
}

enum Operation {
    Create,
    Update(RecordedResource),
    Replace(RecordedResource),
}

struct Completion {
    job: Job,
    result: std::result::Result<(Properties, ApplyResult), BoxError>,
    /// The previous incarnation was deleted, even if the create then failed
    previous_deleted: bool,
}

/// Coordinator state for one apply
struct Run<'a> {
    graph: &'a mut ResourceGraph,
    state: &'a mut StackState,
    opts: &'a ExecuteOptions,
    edges: Vec<Vec<usize>>,
    dependents: Vec<Vec<usize>>,
    remaining: Vec<usize>,
    ready: BTreeSet<usize>,
    in_flight: usize,
    results: Vec<Option<ApplyResult>>,
    errors: Vec<Error>,
    failed: bool,
    changed: bool,
}

impl<'a> Run<'a> {
    fn new(graph: &'a mut ResourceGraph, state: &'a mut StackState, opts: &'a ExecuteOptions) -> Result<Self> {
        let edges = graph.edges()?;
        let mut dependents = vec![Vec::new(); graph.len()];
        for (node, deps) in edges.iter().enumerate() {
            for &dep in deps {
                dependents[dep].push(node);
            }
        }
        let remaining: Vec<usize> = edges.iter().map(Vec::len).collect();
        let ready = (0..graph.len()).filter(|&i| remaining[i] == 0).collect();

        Ok(Self {
            results: vec![None; graph.len()],
            graph,
            state,
            opts,
            edges,
            dependents,
            remaining,
            ready,
            in_flight: 0,
            errors: Vec::new(),
            failed: false,
            changed: false,
        })
    }

    fn converge<'s, P>(
        &mut self,
        scope: &rayon::Scope<'s>,
        provider: &'s dyn Provider,
        progress: &mut P,
        tx: &Sender<Completion>,
        rx: &Receiver<Completion>,
    ) where
        P: ProgressCallback + ?Sized,
    {
        loop {
            while self.in_flight < self.opts.jobs.max(1) {
                let Some(idx) = self.ready.pop_first() else {
                    break;
                };
                if let Some(job) = self.prepare(idx, progress) {
                    progress.on_resource_start(&job.id, &job.kind, &job.action());
                    log::info!("{} {} ({})", job.operation.verb(), job.id, job.kind);
                    self.in_flight += 1;
                    let tx = tx.clone();
                    scope.spawn(move |_| {
                        let completion = run_job(provider, job);
                        // The receiver outlives the scope
                        let _ = tx.send(completion);
                    });
                }
            }

            if self.in_flight == 0 {
                break;
            }
            let Ok(completion) = rx.recv() else {
                break;
            };
            self.in_flight -= 1;
            self.finish(completion, progress);
        }
    }

    /// Settle a ready node; returns the provider job if one is needed
    fn prepare<P>(&mut self, idx: usize, progress: &mut P) -> Option<Job>
    where
        P: ProgressCallback + ?Sized,
    {
        let id = self.graph.node_id(idx).clone();

        let dependencies_created = self.edges[idx]
            .iter()
            .all(|&dep| self.graph.node_state(dep) == NodeState::Created);
        if !dependencies_created {
            self.skip(idx, DEPENDENCY_FAILED, progress);
            return None;
        }
        if self.failed && self.opts.fail_fast {
            self.skip(idx, STOPPED, progress);
            return None;
        }

        self.graph.mark_resolving(idx);
        let inputs = match self.graph.resolve_inputs(&id) {
            Ok(inputs) => inputs,
            Err(e) => {
                self.fail(idx, Box::new(e), progress);
                return None;
            }
        };

        let kind = self.graph.node_descriptor(idx).kind().clone();
        let planned: BTreeMap<String, Planned> = inputs
            .iter()
            .map(|(k, v)| (k.clone(), Planned::Known(v.clone())))
            .collect();
        let previous = self.state.get(id.as_str());
        let operation = match planner::classify(&kind, &planned, previous) {
            Action::NoChange => {
                let outputs = previous.map(|r| r.outputs.clone()).unwrap_or_default();
                log::debug!("{id} is up to date");
                self.refresh_dependencies(idx);
                self.graph.complete(idx, outputs);
                self.settle(idx, ApplyResult::NoChange, progress);
                return None;
            }
            Action::Create | Action::Delete => Operation::Create,
            Action::Update { .. } => Operation::Update(previous.cloned()?),
            Action::Replace { .. } => Operation::Replace(previous.cloned()?),
        };

        Some(Job {
            idx,
            id,
            kind,
            inputs,
            operation,
        })
    }

    fn current_dependencies(&self, idx: usize) -> Vec<ResourceId> {
        self.edges[idx]
            .iter()
            .map(|&dep| self.graph.node_id(dep).clone())
            .collect()
    }

    /// Explicit edges are not inputs, so an unchanged node can still have new dependencies
    fn refresh_dependencies(&mut self, idx: usize) {
        let id = self.graph.node_id(idx);
        let current = self.current_dependencies(idx);
        let Some(record) = self.state.resources.get_mut(id) else {
            return;
        };
        let before: BTreeSet<&ResourceId> = record.dependencies.iter().collect();
        if before != current.iter().collect::<BTreeSet<_>>() {
            log::debug!("{id} now depends on {current:?}");
            record.dependencies = current;
            self.changed = true;
        }
    }

    fn finish<P>(&mut self, completion: Completion, progress: &mut P)
    where
        P: ProgressCallback + ?Sized,
    {
        let Completion {
            job,
            result,
            previous_deleted,
        } = completion;

        match result {
            Ok((outputs, result)) => {
                let dependencies = self.current_dependencies(job.idx);
                self.state.record(
                    job.id,
                    RecordedResource {
                        kind: job.kind,
                        inputs: job.inputs,
                        outputs: outputs.clone(),
                        dependencies,
                    },
                );
                self.changed = true;
                self.graph.complete(job.idx, outputs);
                self.settle(job.idx, result, progress);
            }
            Err(source) => {
                if previous_deleted {
                    self.state.remove(job.id.as_str());
                    self.changed = true;
                }
                self.fail(job.idx, source, progress);
            }
        }
    }

    fn fail<P>(&mut self, idx: usize, source: BoxError, progress: &mut P)
    where
        P: ProgressCallback + ?Sized,
    {
        let id = self.graph.node_id(idx).clone();
        self.graph.fail(idx);
        self.failed = true;
        let result = failure(&mut self.errors, &id, source);
        self.settle(idx, result, progress);
    }

    fn skip<P>(&mut self, idx: usize, reason: &str, progress: &mut P)
    where
        P: ProgressCallback + ?Sized,
    {
        log::debug!("Skipping {}: {reason}", self.graph.node_id(idx));
        self.graph.skip(idx);
        self.settle(
            idx,
            ApplyResult::Skipped {
                reason: reason.to_string(),
            },
            progress,
        );
    }

    /// Record the node's final result and release its dependents
    fn settle<P>(&mut self, idx: usize, result: ApplyResult, progress: &mut P)
    where
        P: ProgressCallback + ?Sized,
    {
        progress.on_resource_complete(self.graph.node_id(idx), &result);
        self.results[idx] = Some(result);
        for &dependent in &self.dependents[idx] {
            self.remaining[dependent] -= 1;
            if self.remaining[dependent] == 0 {
                self.ready.insert(dependent);
            }
        }
    }
}

impl Job {
    fn action(&self) -> Action {
        match self.operation {
            Operation::Create => Action::Create,
            Operation::Update(_) => Action::Update { changes: Vec::new() },
            Operation::Replace(_) => Action::Replace { changes: Vec::new() },
        }
    }
}

impl Operation {
    fn verb(&self) -> &'static str {
        match self {
            Self::Create => "Creating",
            Self::Update(_) => "Updating",
            Self::Replace(_) => "Replacing",
        }
    }
}

fn run_job(provider: &dyn Provider, job: Job) -> Completion {
    let mut previous_deleted = false;
    let result = match &job.operation {
        Operation::Create => contain(|| provider.create(&job.kind, &job.id, &job.inputs))
            .map(|outputs| (outputs, ApplyResult::Created)),
        Operation::Update(previous) => contain(|| provider.update(&job.kind, &job.id, &job.inputs, previous))
            .map(|outputs| (outputs, ApplyResult::Modified)),
        Operation::Replace(previous) => contain(|| provider.delete(&previous.kind, &job.id, previous))
            .and_then(|()| {
                previous_deleted = true;
                contain(|| provider.create(&job.kind, &job.id, &job.inputs))
            })
            .map(|outputs| (outputs, ApplyResult::Modified)),
    };
    Completion {
        job,
        result,
        previous_deleted,
    }
}

/// Run a provider call, turning a panic into an error
fn contain<T>(call: impl FnOnce() -> anyhow::Result<T>) -> std::result::Result<T, BoxError> {
    match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(result) => result.map_err(Into::into),
        Err(payload) => Err(format!("provider panicked: {}", panic_message(payload.as_ref())).into()),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

fn failure(errors: &mut Vec<Error>, id: &ResourceId, source: BoxError) -> ApplyResult {
    let error = Error::ResourceApply {
        resource: id.clone(),
        source,
    };
    log::warn!("{error}");
    let result = ApplyResult::Failed {
        error: error.to_string(),
    };
    errors.push(error);
    result
}

fn is_referenced(state: &StackState, id: &ResourceId) -> bool {
    state
        .resources
        .iter()
        .any(|(other, record)| other != id && record.dependencies.contains(id))
}

/// Final results in topological order; a node never reached counts as skipped
fn results_in(order: &[usize], mut results: Vec<Option<ApplyResult>>) -> Vec<ApplyResult> {
    order
        .iter()
        .map(|&idx| {
            results[idx].take().unwrap_or_else(|| ApplyResult::Skipped {
                reason: DEPENDENCY_FAILED.to_string(),
            })
        })
        .collect()
}

fn declined(graph: &mut ResourceGraph, state: &StackState, order: &[usize], deletions: &[ResourceId]) -> ApplyReport {
    let mut report = ApplyReport::default();
    let skipped = || ApplyResult::Skipped {
        reason: DECLINED.to_string(),
    };
    for &idx in order {
        graph.skip(idx);
        report.push(ResourceOutcome {
            id: graph.node_id(idx).clone(),
            kind: graph.node_descriptor(idx).kind().clone(),
            state: Some(NodeState::Skipped),
            result: skipped(),
        });
    }
    for id in deletions {
        if let Some(record) = state.get(id.as_str()) {
            report.push(ResourceOutcome {
                id: id.clone(),
                kind: record.kind.clone(),
                state: None,
                result: skipped(),
            });
        }
    }
    report
}
