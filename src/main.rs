mod cli;
mod commands;
mod config;
mod deployer;
mod deployment;
mod engine;
mod error;
mod paths;
mod privilege;
mod progress;
mod resource;
mod rewrite;
mod runner;
mod sandbox;
#[cfg(test)]
mod test_support;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
}

fn main() {
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
    };

    if let Err(err) = run(&ctx, cli.command) {
        commands::report_error(&err);
        std::process::exit(1);
    }
}

fn run(ctx: &Context, command: Command) -> Result<()> {
    match command {
        Command::Inspect(args) => commands::reconcile::inspect(ctx, args),
        Command::Apply(args) => commands::reconcile::apply(ctx, args),
        Command::Validate(args) => commands::reconcile::validate(ctx, args),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "scriptdeploy", &mut io::stdout());
            Ok(())
        }
    }
}
