//! The snapshot run lifecycle.
//!
//! A run moves strictly forward through [`RunState`]. Each step either
//! advances or ends the run; nothing is retried. Cancellation (SIGINT or
//! SIGTERM) is observed between steps and inside the transfer, and the lock
//! is released exactly once however the run ends.

use crate::args::ArgumentBuilder;
use crate::binary::{BinaryResolver, Platform};
use crate::config::Config;
use crate::disk::{DiskCheck, check_disk_space};
use crate::error::{Result, SnapshotError, Warning};
use crate::lock::LockGuard;
use crate::logger::RunLogger;
use crate::path_util::validate_paths;
use crate::probe::{HostProbe, SystemProbe};
use crate::process::ProcessSupervisor;
use crate::signal;
use crate::snapshot::{self, SnapshotPaths};
use chrono::Utc;
use std::mem;
use std::io;
use std::path::{self, Path, PathBuf};
use std::sync::Arc;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Validating,
    PathsChecked,
    SpaceChecked,
    Locked,
    LoggingOpen,
    BinaryResolved,
    Transferring,
    Verified,
    Finalized,
    Published,
    Pruned,
    Completed,
    Interrupted,
    Failed,
}

/// Summary of a successful run.
#[derive(Debug)]
pub struct RunReport {
    pub token: String,
    /// Finalized snapshot path (not created in dry-run).
    pub snapshot: PathBuf,
    pub binary: PathBuf,
    /// Snapshot `latest` pointed to before the run.
    pub last_snapshot: Option<String>,
    /// rsync arguments, in order.
    pub args: Vec<String>,
    pub transferred_gb: f64,
    /// Snapshots removed by retention.
    pub pruned: Vec<String>,
    pub warnings: Vec<Warning>,
    pub dry_run: bool,
}

pub struct BackupOrchestrator {
    config: Config,
    probe: Arc<dyn HostProbe>,
    resolver: BinaryResolver,
    supervisor: ProcessSupervisor,
    platform: Platform,
    logger: RunLogger,
    cancel: CancellationToken,
    token: String,
    state: RunState,
    lock: Option<LockGuard>,
    warnings: Vec<Warning>,
}

impl BackupOrchestrator {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            probe: Arc::new(SystemProbe),
            resolver: BinaryResolver::default(),
            supervisor: ProcessSupervisor::default(),
            platform: Platform::current(),
            logger: RunLogger::new(),
            cancel: CancellationToken::new(),
            token: snapshot::token_at(Utc::now()),
            state: RunState::Validating,
            lock: None,
            warnings: vec![],
        }
    }

    pub fn with_probe(mut self, probe: impl HostProbe + 'static) -> Self {
        self.probe = Arc::new(probe);
        self
    }

    pub fn with_resolver(mut self, resolver: BinaryResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_supervisor(mut self, supervisor: ProcessSupervisor) -> Self {
        self.supervisor = supervisor;
        self
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_logger(mut self, logger: RunLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Overrides the snapshot token, which defaults to the current UTC time.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = token.into();
        self
    }

    /// Token that interrupts the run when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Executes one run.
    ///
    /// Must be called inside a Tokio runtime with signal handling enabled.
    /// The signal listener is installed once the configuration is valid.
    pub async fn run(&mut self) -> Result<RunReport> {
        let result = match self.config.validate() {
            Ok(()) => {
                let listener = signal::spawn_listener(self.cancel.clone());
                let result = self.execute().await;
                listener.abort();
                result
            }
            Err(e) => Err(e),
        };

        match &result {
            Ok(_) => self.advance(RunState::Completed),
            Err(SnapshotError::Interrupted) => {
                self.state = RunState::Interrupted;
                self.logger.error("Backup interrupted by signal");
            }
            Err(e) => {
                self.state = RunState::Failed;
                self.logger.error(format_args!("Backup failed: {e}"));
            }
        }

        if let Some(mut lock) = self.lock.take() {
            lock.release();
        }
        self.logger.close();
        result
    }

    async fn execute(&mut self) -> Result<RunReport> {
        self.checkpoint()?;

        let source = PathBuf::from(&self.config.source);
        let destination = self.config.destination_path();
        let probe = Arc::clone(&self.probe);
        let (src, dst) = (source.clone(), destination.clone());
        task::spawn_blocking(move || validate_paths(&src, &dst, probe.as_ref())).await??;
        self.advance(RunState::PathsChecked);
        self.checkpoint()?;

        let threshold = self.config.cleanup_at_percent;
        let probe = Arc::clone(&self.probe);
        let dst = self.config.destination.clone();
        let disk = task::spawn_blocking(move || check_disk_space(&dst, threshold, probe.as_ref()));
        match disk.await?? {
            DiskCheck::Usage(usage) => self
                .logger
                .log(format_args!("Disk usage: {usage}% (threshold: {threshold}%)")),
            DiskCheck::Skipped => self.logger.log("Remote destination, skipping disk check"),
        }
        self.advance(RunState::SpaceChecked);
        self.checkpoint()?;

        self.lock = Some(LockGuard::acquire(&self.config.lock_path())?);
        self.advance(RunState::Locked);

        if let Some(warning) = self.logger.open(&self.config.log_path())? {
            self.warn(warning);
        }
        self.advance(RunState::LoggingOpen);
        self.logger.log(format_args!("Starting backup: {}", self.token));
        self.checkpoint()?;

        let resolver = self.resolver.clone();
        let force_system = self.config.force_system_rsync;
        let pinned = self.config.rsync_bin.clone();
        let binary =
            task::spawn_blocking(move || resolver.resolve(force_system, pinned.as_deref())).await??;
        if binary.forced {
            self.logger
                .log("Using system rsync (forced by force_system_rsync = true)");
        }
        self.logger
            .log(format_args!("Using rsync: {}", binary.path.display()));
        match &binary.version {
            Some(version) => self
                .logger
                .log(format_args!("Detected rsync version: {version}")),
            None => self.logger.log("Could not detect rsync version"),
        }
        self.advance(RunState::BinaryResolved);

        let paths = SnapshotPaths::new(&destination, &self.token);
        let last_snapshot = snapshot::read_latest(&destination);
        self.logger.log(format_args!(
            "Last backup: {}",
            last_snapshot.as_deref().unwrap_or("(none)")
        ));
        let previous = last_snapshot
            .as_deref()
            .map(|name| absolute(&destination.join(name)));

        let builder = ArgumentBuilder::new(
            &self.config,
            &paths.in_progress,
            binary.version.clone(),
            self.platform,
            previous,
        );
        let sync_args = builder.build();
        self.logger.log(format_args!(
            "SRC={} DST={}",
            self.config.source, self.config.destination
        ));
        if builder.is_remote() {
            self.logger
                .log("SSH transfer detected - added compression and SSH options");
        }
        match sync_args.link_dest() {
            Some(prev) => self.logger.log(format_args!("Using link-dest: {prev}")),
            None => self.logger.log("No previous backup found for hard linking"),
        }
        for warning in sync_args.warnings {
            self.warn(warning);
        }
        if self.config.dry_run {
            self.logger.log("DRY RUN MODE - no changes will be made");
        }
        let args = sync_args.args;
        self.logger.log(format_args!(
            "Running rsync: {} {}",
            binary.path.display(),
            args.join(" ")
        ));
        self.checkpoint()?;

        self.advance(RunState::Transferring);
        let transfer = self.supervisor.run(&binary.path, &args, &self.cancel).await?;
        self.logger.log(format_args!(
            "Data transferred: {:.2} GB",
            transfer.transferred_gb
        ));
        self.checkpoint()?;

        let items = snapshot::verify(&paths.in_progress, self.config.dry_run)?;
        if !self.config.dry_run {
            self.logger
                .log(format_args!("Backup verification: {items} items in backup"));
        }
        self.advance(RunState::Verified);
        self.checkpoint()?;

        snapshot::finalize(&paths, self.config.dry_run)?;
        self.advance(RunState::Finalized);

        let mut pruned = vec![];
        if self.config.dry_run {
            self.logger
                .log("Dry run: snapshot not finalized, latest link and retention untouched");
        } else {
            self.logger
                .log(format_args!("Backup finalized: {}", self.token));

            if let Err(warning) = snapshot::republish_latest(&paths.latest, &self.token) {
                self.warn(warning);
            }
            self.advance(RunState::Published);

            pruned = self.prune(&destination).await;
            self.advance(RunState::Pruned);
        }

        self.logger.log("Backup completed successfully");
        Ok(RunReport {
            token: self.token.clone(),
            snapshot: paths.finalized,
            binary: binary.path,
            last_snapshot,
            args,
            transferred_gb: transfer.transferred_gb,
            pruned,
            warnings: mem::take(&mut self.warnings),
            dry_run: self.config.dry_run,
        })
    }

    async fn prune(&mut self, destination: &Path) -> Vec<String> {
        let root = destination.to_path_buf();
        let keep = self.config.keep;
        let outcome = task::spawn_blocking(move || snapshot::prune(&root, keep))
            .await
            .unwrap_or_else(|e| Err(io::Error::other(e)));
        match outcome {
            Ok(outcome) => {
                for name in &outcome.removed {
                    self.logger.log(format_args!("Removed old backup: {name}"));
                }
                for warning in outcome.warnings {
                    self.warn(warning);
                }
                outcome.removed
            }
            Err(source) => {
                self.warn(Warning::Prune {
                    path: destination.to_path_buf(),
                    source,
                });
                vec![]
            }
        }
    }

    fn warn(&mut self, warning: Warning) {
        self.logger.warning(&warning);
        self.warnings.push(warning);
    }

    fn advance(&mut self, next: RunState) {
        debug!(from = ?self.state, to = ?next, "run state");
        self.state = next;
    }

    fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(SnapshotError::Interrupted);
        }
        Ok(())
    }
}

fn absolute(path: &Path) -> PathBuf {
    path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
