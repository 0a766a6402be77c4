//! Terminal progress and confirmation for applies.

use anyhow::Result;
use colored::Colorize;
use declarative::{Action, ApplyResult, ConfirmCallback, ProgressCallback, ResourceId, ResourceKind};
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};

const TEMPLATE: &str = "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}";

/// Progress bar over the resources of an apply, one line per finished resource
pub struct ApplyProgress {
    bar: Option<ProgressBar>,
    quiet: bool,
}

impl ApplyProgress {
    pub fn new(quiet: bool) -> Self {
        Self { bar: None, quiet }
    }

    fn println(&self, line: String) {
        if self.quiet {
            return;
        }
        match &self.bar {
            Some(bar) => bar.println(line),
            None => println!("{line}"),
        }
    }
}

/// One line describing how a resource finished
pub fn result_line(id: &ResourceId, result: &ApplyResult) -> Option<String> {
    match result {
        ApplyResult::NoChange => None,
        ApplyResult::Created => Some(format!("  {} {id} created", "+".green())),
        ApplyResult::Modified => Some(format!("  {} {id} modified", "~".yellow())),
        ApplyResult::Removed => Some(format!("  {} {id} removed", "-".red())),
        ApplyResult::Failed { error } => Some(format!("  {} {id} failed: {error}", "✗".red())),
        ApplyResult::Skipped { reason } => {
            Some(format!("  {} {id} skipped ({reason})", "○".dimmed()))
        }
    }
}

impl ProgressCallback for ApplyProgress {
    fn on_apply_start(&mut self, count: usize) {
        if self.quiet {
            return;
        }
        let bar = ProgressBar::new(count as u64);
        match ProgressStyle::default_bar().template(TEMPLATE) {
            Ok(style) => bar.set_style(style.progress_chars("=>-")),
            Err(e) => log::debug!("Progress template rejected: {e}"),
        }
        self.bar = Some(bar);
    }

    fn on_resource_start(&mut self, id: &ResourceId, kind: &ResourceKind, action: &Action) {
        log::info!("{} {kind} {id}", action.symbol());
        if let Some(bar) = &self.bar {
            bar.set_message(id.to_string());
        }
    }

    fn on_resource_complete(&mut self, id: &ResourceId, result: &ApplyResult) {
        if let Some(line) = result_line(id, result) {
            self.println(line);
        }
        if let Some(bar) = &self.bar {
            bar.inc(1);
        }
    }

    fn on_apply_complete(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

/// Interactive yes/no prompt, answered automatically with `--yes`
pub struct PromptConfirm {
    assume_yes: bool,
    declined: bool,
}

impl PromptConfirm {
    pub fn new(assume_yes: bool) -> Self {
        Self {
            assume_yes,
            declined: false,
        }
    }

    /// Whether the user answered no
    pub fn declined(&self) -> bool {
        self.declined
    }
}

impl ConfirmCallback for PromptConfirm {
    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        if self.assume_yes {
            return Ok(true);
        }
        let confirmed = Confirm::new().with_prompt(prompt).default(false).interact()?;
        self.declined = !confirmed;
        Ok(confirmed)
    }
}
