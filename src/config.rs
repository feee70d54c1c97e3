//! Run configuration.
//!
//! The configuration is a TOML document. It is loaded once, validated, and
//! then treated as read-only for the rest of the run; the resolved rsync
//! path lives on the run itself, not here.

use crate::constants::{CONFIG_NAME, LOCK_PATH, LOG_NAME, PKG_NAME};
use crate::error::{Result, SnapshotError};
use crate::path_util::is_remote;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::{fs, io};

/// Lowest accepted `cleanup_at_percent`.
pub const MIN_THRESHOLD: u8 = 50;
/// Highest accepted `cleanup_at_percent`.
pub const MAX_THRESHOLD: u8 = 95;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Directory whose contents are snapshotted. May be `user@host:path`.
    pub source: String,
    /// Local directory holding the snapshots. Snapshots are verified, renamed
    /// and pruned in place, so this cannot be a `user@host:path` location.
    pub destination: String,
    /// Number of finalized snapshots to retain.
    pub keep: usize,
    /// Abort when the destination filesystem is at least this full.
    pub cleanup_at_percent: u8,
    /// rsync `--exclude-from` file.
    pub exclude_list: Option<PathBuf>,
    /// Persistent run log. Defaults to `<destination>/backup.log`.
    pub log_file: Option<PathBuf>,
    /// Lock directory. Defaults to `/tmp/hsnapRunningLock`.
    pub lock_file: Option<PathBuf>,
    pub dry_run: bool,
    /// Always use the system rsync without checking its version.
    pub force_system_rsync: bool,
    pub show_progress: bool,
    /// Use this rsync instead of probing the well-known locations.
    pub rsync_bin: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: String::new(),
            destination: String::new(),
            keep: 30,
            cleanup_at_percent: MAX_THRESHOLD,
            exclude_list: None,
            log_file: None,
            lock_file: None,
            dry_run: false,
            force_system_rsync: false,
            show_progress: true,
            rsync_bin: None,
        }
    }
}

impl Config {
    /// Reads and parses the configuration file at `path`.
    ///
    /// # Errors
    /// Returns [`SnapshotError::ConfigInvalid`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let toml_str = fs::read_to_string(path).map_err(|e| {
            SnapshotError::ConfigInvalid(format!("cannot read {}: {e}", path.display()))
        })?;
        toml::from_str(&toml_str).map_err(|e| {
            SnapshotError::ConfigInvalid(format!("cannot parse {}: {e}", path.display()))
        })
    }

    /// Checks the invariants every run depends on. Must pass before anything
    /// on disk is touched.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(SnapshotError::ConfigInvalid(msg.into()));
        if self.source.trim().is_empty() {
            return invalid("source path cannot be empty");
        }
        if self.destination.trim().is_empty() {
            return invalid("destination path cannot be empty");
        }
        if is_remote(&self.destination) {
            return invalid("destination must be a local path, not user@host:path");
        }
        if self.keep < 1 {
            return invalid("keep must be at least 1");
        }
        if !(MIN_THRESHOLD..=MAX_THRESHOLD).contains(&self.cleanup_at_percent) {
            return Err(SnapshotError::ConfigInvalid(format!(
                "cleanup_at_percent must be between {MIN_THRESHOLD}-{MAX_THRESHOLD}"
            )));
        }
        Ok(())
    }

    pub fn destination_path(&self) -> PathBuf {
        PathBuf::from(&self.destination)
    }

    pub fn log_path(&self) -> PathBuf {
        self.log_file
            .clone()
            .unwrap_or_else(|| self.destination_path().join(LOG_NAME))
    }

    pub fn lock_path(&self) -> PathBuf {
        self.lock_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(LOCK_PATH))
    }
}

/// Returns the absolute path to the default configuration file.
pub fn config_file() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join(CONFIG_NAME))
}

/// Returns the configuration directory for the application, platform-specific.
#[cfg(not(target_os = "macos"))]
fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(PKG_NAME))
}

/// Returns the configuration directory for the application, platform-specific.
#[cfg(target_os = "macos")]
fn config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|dir| dir.join(".config").join(PKG_NAME))
}

const DEFAULT_DOCUMENT: &str = r#"# hsnap configuration

# Directory to snapshot. `user@host:/path` selects rsync over ssh.
source = ""
# Local directory that holds the snapshots and the `latest` link.
destination = ""
# Number of finalized snapshots to keep.
keep = 30
# Refuse to run when the destination filesystem is this full (50-95).
cleanup_at_percent = 95
# exclude_list = "/path/to/.backup-exclude.list"
# log_file = "/path/to/backup.log"
# lock_file = "/tmp/hsnapRunningLock"
dry_run = false
force_system_rsync = false
show_progress = true
# rsync_bin = "/opt/homebrew/bin/rsync"
"#;

/// Writes a commented default configuration to `path`, creating the parent
/// directory if needed. An existing file is never overwritten.
pub fn write_default(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    let mut writer = io::BufWriter::new(file);
    writer.write_all(DEFAULT_DOCUMENT.as_bytes())?;
    writer.flush()?;
    Ok(())
}
