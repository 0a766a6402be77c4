use anyhow::Result;
use compute::DeploymentConfig;
use declarative::ConfigResolver;

use crate::Context;
use crate::cli::ConfigCommand;
use crate::config::{ENV_PREFIX, Stack};
use crate::{paths, ui};

pub fn run(ctx: &Context, cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show => show(ctx),
        ConfigCommand::Path => {
            println!("{}", paths::stack_file(ctx.stack.as_deref())?.display());
            Ok(())
        }
    }
}

fn show(ctx: &Context) -> Result<()> {
    let stack = Stack::load(ctx.stack.as_deref())?;
    let source = stack.source();
    let resolver = ConfigResolver::with_namespace(&source, stack.namespace());

    ui::header(&format!("Configuration: {}", stack.name));
    ui::kv("Stack file", &stack.path.display().to_string());
    ui::kv("State file", &paths::state_file(&stack.name)?.display().to_string());
    if let Some(project) = stack.project() {
        ui::kv("Project", &project);
    }
    if !stack.namespace().is_empty() {
        ui::kv("Namespace", stack.namespace());
    }

    // Look up every key so all missing ones are listed, not only the first
    for key in [
        DeploymentConfig::IP_CIDR,
        DeploymentConfig::ZONE,
        DeploymentConfig::SSH_PUBKEY_PATH,
    ] {
        let _ = resolver.require(key);
    }
    let _ = resolver.optional(DeploymentConfig::SSH_USER, "");

    ui::section("Values");
    let mut missing = 0;
    for entry in resolver.entries() {
        match (&entry.value, entry.required) {
            (Some(value), _) => ui::kv(&entry.key, value),
            (None, true) => {
                missing += 1;
                ui::kv(&entry.key, "missing (required)");
            }
            (None, false) => ui::kv(&entry.key, "(default)"),
        }
    }

    println!();
    if missing > 0 {
        ui::warn(&format!("{missing} required value(s) missing"));
        ui::dim(&format!(
            "Set them under [config] in the stack file or as {ENV_PREFIX}_<KEY> environment variables"
        ));
        return Ok(());
    }

    match DeploymentConfig::resolve(&ConfigResolver::with_namespace(&source, stack.namespace())) {
        Ok(_) => ui::success("Configuration is complete"),
        Err(e) => ui::error(&e.to_string()),
    }
    Ok(())
}
