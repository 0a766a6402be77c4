use anyhow::{Result, bail};
use colored::Colorize;
use declarative::StateStore;

use crate::Context;
use crate::cli::StateCommand;
use crate::commands::load_stack;
use crate::state::FileStateStore;
use crate::ui;

pub fn run(ctx: &Context, cmd: StateCommand) -> Result<()> {
    let (stack, store) = load_stack(ctx)?;
    match cmd {
        StateCommand::Show { json } => show(&stack.name, &store, json),
        StateCommand::List => list(&store),
        StateCommand::Path => {
            println!("{}", store.path().display());
            Ok(())
        }
        StateCommand::Forget { id } => forget(&store, &id),
    }
}

fn show(stack: &str, store: &FileStateStore, json: bool) -> Result<()> {
    let Some(file) = store.read()? else {
        if json {
            println!("{}", serde_json::to_string_pretty(&declarative::StackState::new())?);
        } else {
            ui::info(&format!("No state recorded for stack '{stack}'"));
        }
        return Ok(());
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&file)?);
        return Ok(());
    }

    ui::header(&format!("State: {stack}"));
    ui::kv("File", &store.path().display().to_string());
    ui::kv("Serial", &file.serial.to_string());
    if let Some(updated) = file.updated_at {
        ui::kv("Updated", &updated.format("%Y-%m-%d %H:%M:%S UTC").to_string());
    }

    for (id, resource) in &file.resources {
        ui::section(&format!("{id} ({})", resource.kind));
        if !resource.dependencies.is_empty() {
            let deps: Vec<&str> = resource.dependencies.iter().map(|d| d.as_str()).collect();
            ui::kv("depends on", &deps.join(", "));
        }
        for (key, value) in &resource.outputs {
            ui::kv(key, &value.to_string());
        }
    }
    Ok(())
}

fn list(store: &FileStateStore) -> Result<()> {
    let state = store.load()?;
    for (id, resource) in &state.resources {
        println!("{id}\t{}", resource.kind.to_string().dimmed());
    }
    Ok(())
}

fn forget(store: &FileStateStore, id: &str) -> Result<()> {
    let mut state = store.load()?;
    if state.remove(id).is_none() {
        bail!("'{id}' is not recorded in {}", store.path().display());
    }
    state.serial += 1;
    store.save(&state)?;
    ui::success(&format!("Forgot {id}; the resource itself was not deleted"));
    Ok(())
}
