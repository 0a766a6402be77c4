use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "umami")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Provision a two-node Kubernetes practice cluster on Google Compute Engine", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Stack file (default: <config dir>/stack.toml)
    #[arg(short, long, global = true, env = "UMAMI_STACK")]
    pub stack: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show what an apply would change
    Plan,

    /// Create or update the cluster resources
    Apply(ApplyArgs),

    /// Delete every resource recorded for the stack
    Destroy(DestroyArgs),

    /// Inspect recorded state
    #[command(subcommand)]
    State(StateCommand),

    /// Inspect stack configuration
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Apply / Destroy
// ============================================================================

#[derive(Parser)]
pub struct ApplyArgs {
    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Number of resources provisioned in parallel
    #[arg(short, long, default_value = "4")]
    pub jobs: usize,

    /// Stop starting new resources after the first failure
    #[arg(long)]
    pub fail_fast: bool,
}

#[derive(Parser)]
pub struct DestroyArgs {
    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

// ============================================================================
// State Commands
// ============================================================================

#[derive(Subcommand)]
pub enum StateCommand {
    /// Show recorded resources with their inputs and outputs
    Show {
        /// Print the raw state as JSON
        #[arg(long)]
        json: bool,
    },

    /// List recorded resource ids
    List,

    /// Print the state file path
    Path,

    /// Drop a resource from state without deleting it
    Forget {
        /// Resource id
        id: String,
    },
}

// ============================================================================
// Config Commands
// ============================================================================

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show resolved configuration values and where required ones are missing
    Show,

    /// Print the stack file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_apply_flags() {
        let cli = Cli::try_parse_from(["umami", "-vv", "apply", "--yes", "--jobs", "2", "--fail-fast"]).unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Apply(args) => {
                assert!(args.yes);
                assert_eq!(args.jobs, 2);
                assert!(args.fail_fast);
            }
            _ => panic!("expected apply"),
        }
    }

    #[test]
    fn test_state_forget() {
        let cli = Cli::try_parse_from(["umami", "--stack", "dev.toml", "state", "forget", "worker"]).unwrap();
        assert_eq!(cli.stack, Some(PathBuf::from("dev.toml")));
        assert!(matches!(cli.command, Command::State(StateCommand::Forget { id }) if id == "worker"));
    }
}
