//! Error and warning types for a snapshot run.
//!
//! Fatal conditions abort the run and are reported as [`SnapshotError`].
//! Conditions that happen after the snapshot is durable, or that only
//! degrade housekeeping, are collected as [`Warning`]s instead.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors, in roughly the order the lifecycle can raise them.
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error(
        "backup already running (lock: {}). If not, remove the lock directory manually",
        .0.display()
    )]
    AlreadyRunning(PathBuf),

    #[error("failed to create lock {}: {source}", path.display())]
    LockIo { path: PathBuf, source: io::Error },

    #[error("failed to create destination {}: {source}", path.display())]
    DestinationCreate { path: PathBuf, source: io::Error },

    #[error("source does not exist: {}", .0.display())]
    SourceMissing(PathBuf),

    #[error("path {} is not accessible or mounted", .0.display())]
    PathNotMounted(PathBuf),

    #[error("disk usage {usage}% exceeds cleanup threshold {threshold}%")]
    DiskThresholdExceeded { usage: u8, threshold: u8 },

    #[error("failed to check disk space: {0}")]
    DiskCheckParse(String),

    #[error("failed to open log file {}: {source}", path.display())]
    LogOpen { path: PathBuf, source: io::Error },

    #[error("no rsync binary found (looked in {0})")]
    BinaryNotFound(String),

    #[error(
        "{} is too old ({version}) and lacks proper macOS support. \
         Please install a newer rsync, e.g. `brew install rsync`",
        path.display()
    )]
    IncompatibleBinary { path: PathBuf, version: String },

    #[error("failed to start {}: {source}", path.display())]
    ProcessSpawn { path: PathBuf, source: io::Error },

    #[error("rsync exited with {}", exit_label(.0))]
    ProcessExecution(Option<i32>),

    #[error("backup directory not created: {}", .0.display())]
    SnapshotMissing(PathBuf),

    #[error("backup directory is empty: {}", .0.display())]
    SnapshotEmpty(PathBuf),

    #[error("failed to read backup directory {}: {source}", path.display())]
    SnapshotRead { path: PathBuf, source: io::Error },

    #[error("failed to rename {} to {}: {source}", from.display(), to.display())]
    FinalizeRename {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("backup interrupted by signal")]
    Interrupted,
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

/// Non-fatal conditions. The run still succeeds when only these occur.
#[derive(Error, Debug)]
pub enum Warning {
    /// An old snapshot could not be removed.
    #[error("failed to remove {}: {source}", path.display())]
    Prune { path: PathBuf, source: io::Error },

    /// The `latest` pointer could not be rewritten.
    #[error("failed to update latest link {}: {source}", path.display())]
    Publish { path: PathBuf, source: io::Error },

    /// The run log could not be rotated.
    #[error("failed to rotate log {}: {source}", path.display())]
    Rotate { path: PathBuf, source: io::Error },

    /// An exclusion list is configured but does not exist.
    #[error("exclude list not found at {}, continuing without excludes", .0.display())]
    ExcludeListMissing(PathBuf),

    /// rsync is too old for the platform-specific flags, which were left out.
    #[error("old rsync version {0}, limited macOS support")]
    OldBinaryFeatures(String),
}

pub type Result<T> = std::result::Result<T, SnapshotError>;
