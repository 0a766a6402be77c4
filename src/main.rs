mod cli;
mod commands;
mod config;
mod paths;
mod progress;
mod state;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;
use std::path::PathBuf;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    /// Stack file from `--stack` or `UMAMI_STACK`
    pub stack: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        stack: cli.stack,
    };
    log::trace!("verbosity {}", ctx.verbose);

    match cli.command {
        Command::Plan => commands::stack::plan(&ctx),
        Command::Apply(args) => commands::stack::apply(&ctx, &args),
        Command::Destroy(args) => commands::stack::destroy(&ctx, &args),
        Command::State(cmd) => commands::state::run(&ctx, cmd),
        Command::Config(cmd) => commands::config::run(&ctx, cmd),
        Command::Completions { shell } => {
            generate(shell, &mut Cli::command(), "umami", &mut io::stdout());
            Ok(())
        }
    }
}
