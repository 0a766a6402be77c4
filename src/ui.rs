use colored::Colorize;
use declarative::{Action, ApplyReport, ApplyResult, Plan, PlannedStep, Properties, group_by_type};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

// ============================================================================
// Plans
// ============================================================================

fn step_line(step: &PlannedStep) -> String {
    let symbol = step.action.symbol();
    let marker = match step.action {
        Action::Create => symbol.green(),
        Action::Update { .. } => symbol.yellow(),
        Action::Replace { .. } => symbol.magenta(),
        Action::Delete => symbol.red(),
        Action::NoChange => symbol.normal(),
    };
    match step.action {
        Action::NoChange => format!("  {:>3} {} {}", marker, step.id, "(no changes)".dimmed()),
        _ => format!("  {:>3} {}", marker, step.id),
    }
}

/// Render a plan grouped by resource kind
pub fn render_plan(plan: &Plan) -> Vec<String> {
    let mut lines = Vec::new();
    for (kind, steps) in group_by_type(plan.steps()) {
        lines.push(kind.to_string().cyan().bold().to_string());
        for step in steps {
            lines.push(step_line(step));
            for change in step.action.changes() {
                lines.push(format!("        {}", change.to_string().dimmed()));
            }
        }
    }
    lines
}

pub fn print_plan(plan: &Plan) {
    for line in render_plan(plan) {
        println!("{line}");
    }
    println!();
    let summary = plan.summary();
    if summary.has_changes() {
        println!("{} {}", "Plan:".bold(), summary);
    } else {
        success("No changes. Infrastructure matches the configuration.");
    }
}

// ============================================================================
// Reports
// ============================================================================

/// Print the summary of an apply
pub fn print_report(report: &ApplyReport) {
    let summary = &report.summary;
    println!();
    println!("  {} {} created", "•".green(), summary.created);
    println!("  {} {} modified", "•".yellow(), summary.modified);
    println!("  {} {} removed", "•".red(), summary.removed);
    println!("  {} {} unchanged", "•".dimmed(), summary.no_change);
    if summary.skipped > 0 {
        println!("  {} {} skipped", "•".dimmed(), summary.skipped);
    }
    if summary.failed > 0 {
        println!("  {} {} failed", "•".red(), summary.failed);
    }

    if !report.errors.is_empty() {
        section("Errors");
        for err in &report.errors {
            error(&err.to_string());
        }
    }
}

/// Print `(id, value)` pairs of one output property
pub fn print_outputs(property: &str, entries: &[(String, String)]) {
    if entries.is_empty() {
        return;
    }
    section("Outputs");
    for (id, value) in entries {
        kv(&format!("{id}.{property}"), value);
    }
}

/// Collect `property` from the outputs of `ids`, skipping those without it
pub fn collect_outputs<'a>(
    ids: &[String],
    property: &str,
    lookup: impl Fn(&str) -> Option<&'a Properties>,
) -> Vec<(String, String)> {
    ids.iter()
        .filter_map(|id| {
            let value = lookup(id)?.get(property)?;
            Some((id.clone(), value.as_str().map_or_else(|| value.to_string(), str::to_string)))
        })
        .collect()
}

/// Whether any resource of the report failed or was skipped
pub fn has_problems(report: &ApplyReport) -> bool {
    report
        .outcomes
        .iter()
        .any(|o| matches!(o.result, ApplyResult::Failed { .. } | ApplyResult::Skipped { .. }))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::{
        ExecuteOptions, MemoryStateStore, Provider, RecordedResource, ResourceDescriptor, ResourceGraph,
        ResourceId, ResourceKind, StackState, Value, apply_simple, plan,
    };

    struct Echo;

    impl Provider for Echo {
        fn create(&self, _kind: &ResourceKind, name: &ResourceId, inputs: &Properties) -> anyhow::Result<Properties> {
            let mut outputs = inputs.clone();
            outputs.insert("id".into(), Value::from(format!("{name}-1")));
            outputs.insert("assignedIP".into(), Value::from(format!("10.0.0.{}", name.as_str().len())));
            Ok(outputs)
        }

        fn update(
            &self,
            kind: &ResourceKind,
            name: &ResourceId,
            inputs: &Properties,
            _previous: &RecordedResource,
        ) -> anyhow::Result<Properties> {
            self.create(kind, name, inputs)
        }

        fn delete(&self, _kind: &ResourceKind, _name: &ResourceId, _previous: &RecordedResource) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn graph() -> ResourceGraph {
        let mut graph = ResourceGraph::new();
        let net = graph
            .register(ResourceDescriptor::new("gcp:compute:Network", "net"))
            .unwrap();
        graph
            .register(ResourceDescriptor::new("gcp:compute:Instance", "master").with_input("network", net.output("id")))
            .unwrap();
        graph
    }

    #[test]
    fn test_render_plan_groups_by_kind() {
        colored::control::set_override(false);
        let plan = plan(&graph(), &StackState::new()).unwrap();
        let lines = render_plan(&plan);
        assert_eq!(lines[0], "gcp:compute:Instance");
        assert_eq!(lines[1], "    + master");
        assert!(lines.contains(&"gcp:compute:Network".to_string()));
    }

    #[test]
    fn test_collect_outputs_skips_missing() {
        let mut graph = graph();
        let store = MemoryStateStore::new();
        let report = apply_simple(&mut graph, &Echo, &store, &ExecuteOptions::default()).unwrap();
        assert!(!has_problems(&report));
        assert_eq!(
            graph.outputs("master").unwrap()["assignedIP"],
            Value::from("10.0.0.6")
        );
        let ids = ["master".to_string(), "net".to_string(), "missing".to_string()];
        let entries = collect_outputs(&ids, "assignedIP", |id| graph.outputs(id));
        assert_eq!(
            entries,
            vec![
                ("master".to_string(), "10.0.0.6".to_string()),
                ("net".to_string(), "10.0.0.3".to_string()),
            ]
        );
    }
}
