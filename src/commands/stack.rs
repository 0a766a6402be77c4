//! plan, apply and destroy

use anyhow::{Result, bail};
use compute::topology::instance_ids;
use compute::{ComputeBackend, ComputeProvider, default_backend, prepare};
use declarative::{
    ExecuteOptions, ResourceGraph, StateStore, apply as apply_graph, destroy as destroy_all, plan as plan_graph,
};

use crate::Context;
use crate::cli::{ApplyArgs, DestroyArgs};
use crate::commands::load_stack;
use crate::config::Stack;
use crate::progress::{ApplyProgress, PromptConfirm};
use crate::ui;

/// Output shown for every instance after an apply
const ADDRESS_OUTPUT: &str = "assignedIP";

/// Validate the topology, resolve configuration and declare the graph
fn declare(stack: &Stack) -> Result<ResourceGraph> {
    stack.topology().validate()?;
    let source = stack.source();
    let (config, graph) = prepare(&source, stack.namespace(), stack.topology())?;
    log::info!(
        "Stack '{}': zone {}, admin range {}",
        stack.name,
        config.zone,
        config.admin_cidr
    );
    Ok(graph)
}

fn provider(stack: &Stack) -> Result<ComputeProvider<compute::GcloudBackend>> {
    let backend = default_backend(stack.project())?;
    if !backend.is_available() {
        bail!("gcloud is installed but not usable; run 'gcloud auth login' first");
    }
    Ok(ComputeProvider::new(backend))
}

pub fn plan(ctx: &Context) -> Result<()> {
    let (stack, store) = load_stack(ctx)?;
    let graph = declare(&stack)?;
    let state = store.load()?;

    ui::header(&format!("Plan: {}", stack.name));
    let plan = plan_graph(&graph, &state)?;
    ui::print_plan(&plan);
    Ok(())
}

pub fn apply(ctx: &Context, args: &ApplyArgs) -> Result<()> {
    let (stack, store) = load_stack(ctx)?;
    let mut graph = declare(&stack)?;
    let state = store.load()?;

    ui::header(&format!("Apply: {}", stack.name));
    let plan = plan_graph(&graph, &state)?;
    if !ctx.quiet {
        ui::print_plan(&plan);
    }
    if !plan.has_changes() {
        let recorded = ui::collect_outputs(&ids(&stack), ADDRESS_OUTPUT, |id| {
            state.get(id).map(|r| &r.outputs)
        });
        ui::print_outputs(ADDRESS_OUTPUT, &recorded);
        return Ok(());
    }

    let provider = provider(&stack)?;
    let opts = ExecuteOptions {
        jobs: args.jobs,
        fail_fast: args.fail_fast,
    };
    let mut progress = ApplyProgress::new(ctx.quiet);
    let mut confirm = PromptConfirm::new(args.yes);
    let report = apply_graph(&mut graph, &provider, &store, &opts, &mut progress, &mut confirm)?;

    if confirm.declined() {
        ui::warn("Apply cancelled");
        return Ok(());
    }

    ui::print_report(&report);
    let addresses = ui::collect_outputs(&ids(&stack), ADDRESS_OUTPUT, |id| graph.outputs(id));
    ui::print_outputs(ADDRESS_OUTPUT, &addresses);

    if !report.is_success() {
        bail!("{} resource(s) failed to apply", report.summary.failed);
    }
    if ui::has_problems(&report) {
        ui::warn("Some resources were skipped");
    } else {
        ui::success("Apply complete!");
    }
    Ok(())
}

pub fn destroy(ctx: &Context, args: &DestroyArgs) -> Result<()> {
    let (stack, store) = load_stack(ctx)?;
    let state = store.load()?;

    ui::header(&format!("Destroy: {}", stack.name));
    if state.is_empty() {
        ui::success("Nothing recorded, nothing to destroy");
        return Ok(());
    }
    for (id, resource) in &state.resources {
        println!("  - {id} ({})", resource.kind);
    }
    println!();

    let provider = provider(&stack)?;
    let opts = ExecuteOptions::default();
    let mut progress = ApplyProgress::new(ctx.quiet);
    let mut confirm = PromptConfirm::new(args.yes);
    let report = destroy_all(&provider, &store, &opts, &mut progress, &mut confirm)?;

    if confirm.declined() {
        ui::warn("Destroy cancelled");
        return Ok(());
    }

    ui::print_report(&report);
    if !report.is_success() {
        bail!("{} resource(s) could not be deleted", report.summary.failed);
    }
    ui::success("Destroy complete!");
    Ok(())
}

fn ids(stack: &Stack) -> Vec<String> {
    instance_ids(stack.topology())
        .into_iter()
        .map(|id| id.as_str().to_string())
        .collect()
}

