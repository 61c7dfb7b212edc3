use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "scriptdeploy")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(
    about = "Deploy a set of files and reconcile them with an audit/apply script",
    long_about = None
)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show what a cycle would change, without changing anything
    Inspect(InspectArgs),

    /// Inspect, then write files and run the script in apply mode
    Apply(ApplyArgs),

    /// Load and validate a deployment configuration
    Validate(ConfigArg),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct ConfigArg {
    /// Deployment configuration (TOML or JSON)
    #[arg(short, long, env = "SCRIPTDEPLOY_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Args)]
pub struct DisplayArgs {
    /// Show a unified diff for modified files
    #[arg(long)]
    pub show_diff: bool,

    /// Keep a copy of the audit sandbox for debugging
    #[arg(long)]
    pub keep_sandbox: bool,
}

#[derive(Args)]
pub struct InspectArgs {
    #[command(flatten)]
    pub config: ConfigArg,

    #[command(flatten)]
    pub display: DisplayArgs,

    /// Print the inspection result as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub config: ConfigArg,

    #[command(flatten)]
    pub display: DisplayArgs,

    /// Dry run - inspect and decide, never commit
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
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
    fn test_parse_apply_flags() {
        let cli = Cli::parse_from([
            "scriptdeploy",
            "-vv",
            "apply",
            "--config",
            "/etc/deploy.toml",
            "--dry-run",
            "--show-diff",
        ]);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Apply(args) => {
                assert!(args.dry_run);
                assert!(!args.yes);
                assert!(args.display.show_diff);
                assert_eq!(args.config.config, Some(PathBuf::from("/etc/deploy.toml")));
            }
            _ => panic!("expected apply"),
        }
    }

    #[test]
    fn test_parse_inspect_json() {
        let cli = Cli::parse_from(["scriptdeploy", "inspect", "--json", "--keep-sandbox"]);
        match cli.command {
            Command::Inspect(args) => {
                assert!(args.json);
                assert!(args.display.keep_sandbox);
            }
            _ => panic!("expected inspect"),
        }
    }
}
