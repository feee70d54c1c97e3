//! On-disk snapshot layout.
//!
//! ```text
//! <destination>/<token>             finalized snapshot
//! <destination>/<token>_INCOMPLETE  snapshot being written
//! <destination>/latest              symlink to the newest finalized token
//! ```
//!
//! Retention sorts tokens as strings. That is only chronological because
//! tokens are fixed-width, zero-padded and always in UTC (see
//! [`SNAPSHOT_FORMAT`]); changing the format means revisiting [`prune`].

use crate::constants::{INCOMPLETE_SUFFIX, LATEST_NAME, SNAPSHOT_FORMAT};
use crate::error::{Result, SnapshotError, Warning};
use chrono::{DateTime, Utc};
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Snapshot token for `time`, e.g. `UTC_2026-10-18_09.30.00`.
pub fn token_at(time: DateTime<Utc>) -> String {
    time.format(SNAPSHOT_FORMAT).to_string()
}

/// True for names that can be a finalized snapshot.
pub fn is_finalized_name(name: &str) -> bool {
    name != LATEST_NAME && !name.ends_with(INCOMPLETE_SUFFIX)
}

/// Paths used by one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotPaths {
    pub token: String,
    pub root: PathBuf,
    /// Where rsync writes: `<root>/<token>_INCOMPLETE`.
    pub in_progress: PathBuf,
    /// Permanent name: `<root>/<token>`.
    pub finalized: PathBuf,
    /// `<root>/latest`.
    pub latest: PathBuf,
}

impl SnapshotPaths {
    pub fn new(root: &Path, token: &str) -> Self {
        Self {
            token: token.to_string(),
            root: root.to_path_buf(),
            in_progress: root.join(format!("{token}{INCOMPLETE_SUFFIX}")),
            finalized: root.join(token),
            latest: root.join(LATEST_NAME),
        }
    }
}

/// Name of the snapshot `latest` points to, if it resolves to a finalized
/// snapshot directory.
pub fn read_latest(root: &Path) -> Option<String> {
    let target = fs::read_link(root.join(LATEST_NAME)).ok()?;
    let name = target.file_name()?.to_string_lossy().into_owned();
    if !is_finalized_name(&name) || !root.join(&name).is_dir() {
        debug!(%name, "latest link does not resolve to a finalized snapshot");
        return None;
    }
    Some(name)
}

/// Finalized snapshot names under `root`, oldest first.
pub fn list_snapshots(root: &Path) -> io::Result<Vec<String>> {
    let mut names = vec![];
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        // file_type does not follow symlinks, so `latest` never counts as a dir.
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_finalized_name(&name) {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// Checks that rsync actually produced something. Always passes in dry-run.
///
/// Returns the number of top-level entries.
pub fn verify(in_progress: &Path, dry_run: bool) -> Result<usize> {
    if dry_run {
        return Ok(0);
    }
    if !in_progress.exists() {
        return Err(SnapshotError::SnapshotMissing(in_progress.to_path_buf()));
    }
    let count = fs::read_dir(in_progress)
        .map_err(|source| SnapshotError::SnapshotRead {
            path: in_progress.to_path_buf(),
            source,
        })?
        .count();
    if count == 0 {
        return Err(SnapshotError::SnapshotEmpty(in_progress.to_path_buf()));
    }
    Ok(count)
}

/// Renames the in-progress snapshot to its permanent name. No-op in dry-run.
pub fn finalize(paths: &SnapshotPaths, dry_run: bool) -> Result<()> {
    if dry_run {
        return Ok(());
    }
    if paths.finalized.exists() {
        return Err(SnapshotError::FinalizeRename {
            from: paths.in_progress.clone(),
            to: paths.finalized.clone(),
            source: io::Error::new(ErrorKind::AlreadyExists, "snapshot already exists"),
        });
    }
    fs::rename(&paths.in_progress, &paths.finalized).map_err(|source| {
        SnapshotError::FinalizeRename {
            from: paths.in_progress.clone(),
            to: paths.finalized.clone(),
            source,
        }
    })
}

/// Points `latest` at `token`. The link is relative so the destination tree
/// can be moved or mounted elsewhere.
pub fn republish_latest(latest: &Path, token: &str) -> std::result::Result<(), Warning> {
    let warn = |source| Warning::Publish {
        path: latest.to_path_buf(),
        source,
    };
    match fs::remove_file(latest) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(warn(e)),
    }
    symlink_dir(Path::new(token), latest).map_err(warn)
}

#[cfg(unix)]
fn symlink_dir(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink_dir(target: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_dir(target, link)
}

/// Outcome of a retention pass.
#[derive(Debug, Default)]
pub struct PruneOutcome {
    pub removed: Vec<String>,
    pub warnings: Vec<Warning>,
}

/// Deletes the oldest finalized snapshots so that at most `keep` remain.
///
/// In-progress snapshots and `latest` are never touched. A snapshot that
/// cannot be removed becomes a warning and the pass carries on.
pub fn prune(root: &Path, keep: usize) -> io::Result<PruneOutcome> {
    let names = list_snapshots(root)?;
    let mut outcome = PruneOutcome::default();
    let excess = names.len().saturating_sub(keep);

    for name in names.into_iter().take(excess) {
        let path = root.join(&name);
        match fs::remove_dir_all(&path) {
            Ok(()) => outcome.removed.push(name),
            Err(source) => outcome.warnings.push(Warning::Prune { path, source }),
        }
    }
    Ok(outcome)
}
