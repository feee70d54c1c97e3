//! Command-line interface definition for hsnap.
//!
//! Running without a subcommand takes a snapshot, which is what schedulers
//! such as cron or launchd invoke.

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use hsnap::config::{self, Config};
use hsnap::snapshot;
use hsnap::{BackupOrchestrator, SnapshotError};
use std::path::{Path, PathBuf};
use tokio::runtime::Builder;

/// Command-line interface definition for hsnap.
#[derive(Parser)]
#[command(version, about, long_about = None)]
pub(crate) struct Cli {
    /// Configuration file path.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
    /// Perform a dry run (no changes).
    #[arg(short = 'n', long, global = true)]
    pub dry_run: bool,
    /// Subcommand to execute. Defaults to `run`.
    #[command(subcommand)]
    pub commands: Option<Commands>,
}

/// Supported hsnap commands.
#[derive(Subcommand, Debug)]
pub(crate) enum Commands {
    /// Take a snapshot.
    Run,
    /// List finalized snapshots, oldest first.
    List,
    /// Display the path of the configuration file.
    Config {
        /// Write a default configuration file if none exists.
        #[arg(short, long)]
        init: bool,
    },
}

/// Resolves the configuration path from `--config` or the platform default.
pub(crate) fn config_path(arg: Option<PathBuf>) -> Result<PathBuf> {
    arg.or_else(config::config_file)
        .ok_or_else(|| anyhow!("Couldn't determine the configuration directory, use --config"))
}

fn load(path: &Path, dry_run: bool) -> Result<Config> {
    let mut config = Config::load(path).context("Failed to load config")?;
    if dry_run {
        config.dry_run = true;
    }
    Ok(config)
}

/// Takes one snapshot.
///
/// # Errors
/// Returns an error if the configuration cannot be loaded or the run fails.
/// The run itself has already logged the failure.
pub(crate) fn run(path: &Path, dry_run: bool) -> Result<()> {
    let config = load(path, dry_run)?;
    let rt = Builder::new_multi_thread().enable_all().build()?;
    let report = rt
        .block_on(async move {
            let mut orchestrator = BackupOrchestrator::new(config);
            orchestrator.run().await
        })
        .map_err(RunFailed)?;

    if !report.warnings.is_empty() {
        eprintln!("Completed with {} warning(s)", report.warnings.len());
    }
    Ok(())
}

/// Marks an error the orchestrator has already reported.
#[derive(Debug)]
pub(crate) struct RunFailed(pub SnapshotError);

impl std::fmt::Display for RunFailed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Backup failed: {}", self.0)
    }
}

impl std::error::Error for RunFailed {}

/// Prints finalized snapshots, marking the one `latest` points to.
pub(crate) fn list(path: &Path) -> Result<()> {
    let config = load(path, false)?;
    let destination = config.destination_path();
    let latest = snapshot::read_latest(&destination);
    let names = snapshot::list_snapshots(&destination)
        .with_context(|| format!("Cannot read destination {}", destination.display()))?;
    if names.is_empty() {
        println!("No snapshots in {}", destination.display());
        return Ok(());
    }
    for name in names {
        if latest.as_deref() == Some(name.as_str()) {
            println!("{name} (latest)");
        } else {
            println!("{name}");
        }
    }
    Ok(())
}

/// Prints the configuration file path, optionally creating a default one.
/// When the file loads, the effective lock and log paths are shown too.
pub(crate) fn config(path: &Path, init: bool) -> Result<()> {
    if init {
        config::write_default(path)
            .with_context(|| format!("Cannot create config file {}", path.display()))?;
        println!("Created config file: {}", path.display());
        return Ok(());
    }
    println!("config file: {}", path.display());
    if let Ok(config) = Config::load(path) {
        println!("lock: {}", config.lock_path().display());
        println!("log: {}", config.log_path().display());
    }
    Ok(())
}
