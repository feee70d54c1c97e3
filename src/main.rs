mod commands;

use crate::commands::{Cli, Commands, RunFailed};
use clap::Parser;
use std::process;
use tracing_subscriber::EnvFilter;

/// Entry point for the hsnap CLI application.
/// Parses command-line arguments and dispatches to the appropriate command handler.
fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_env("HSNAP_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let result = commands::config_path(cli.config).and_then(|path| {
        match cli.commands.unwrap_or(Commands::Run) {
            Commands::Run => commands::run(&path, cli.dry_run),
            Commands::List => commands::list(&path),
            Commands::Config { init } => commands::config(&path, init),
        }
    });

    if let Err(e) = result {
        // A failed run has already been logged by the orchestrator.
        if e.downcast_ref::<RunFailed>().is_none() {
            eprintln!("{e:#}");
        }
        process::exit(1);
    }
}
