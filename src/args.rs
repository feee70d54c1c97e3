//! rsync argument assembly.
//!
//! [`ArgumentBuilder::build`] is pure: filesystem facts (does the previous
//! snapshot exist, does the exclusion file exist) are gathered up front by
//! [`ArgumentBuilder::new`], so the same inputs always give the same vector.

use crate::binary::{Platform, is_old_version};
use crate::config::Config;
use crate::constants::{RSYNC_BASE_ARGS, RSYNC_MACOS_ARGS, RSYNC_REMOTE_ARGS};
use crate::error::Warning;
use crate::path_util::is_remote;
use std::path::{Path, PathBuf};

/// State of the configured exclusion list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExcludeList {
    NotConfigured,
    Present(PathBuf),
    Missing(PathBuf),
}

impl ExcludeList {
    pub fn probe(path: Option<&Path>) -> Self {
        match path {
            None => ExcludeList::NotConfigured,
            Some(path) if path.exists() => ExcludeList::Present(path.to_path_buf()),
            Some(path) => ExcludeList::Missing(path.to_path_buf()),
        }
    }
}

/// Assembled invocation plus anything worth warning about.
#[derive(Debug)]
pub struct SyncArgs {
    pub args: Vec<String>,
    pub warnings: Vec<Warning>,
}

impl SyncArgs {
    /// The `--link-dest` target, if one was used.
    pub fn link_dest(&self) -> Option<&str> {
        self.args.iter().find_map(|a| a.strip_prefix("--link-dest="))
    }
}

#[derive(Debug, Clone)]
pub struct ArgumentBuilder {
    pub source: String,
    pub destination: String,
    pub snapshot_dir: PathBuf,
    pub show_progress: bool,
    pub dry_run: bool,
    pub version: Option<String>,
    pub platform: Platform,
    pub link_dest: Option<PathBuf>,
    pub exclude: ExcludeList,
}

impl ArgumentBuilder {
    /// Collects the inputs for one run. `previous` is the absolute path of the
    /// last finalized snapshot; it is only used if it is a directory.
    pub fn new(
        config: &Config,
        snapshot_dir: &Path,
        version: Option<String>,
        platform: Platform,
        previous: Option<PathBuf>,
    ) -> Self {
        Self {
            source: config.source.clone(),
            destination: config.destination.clone(),
            snapshot_dir: snapshot_dir.to_path_buf(),
            show_progress: config.show_progress,
            dry_run: config.dry_run,
            version,
            platform,
            link_dest: previous.filter(|p| p.is_dir()),
            exclude: ExcludeList::probe(config.exclude_list.as_deref()),
        }
    }

    pub fn is_remote(&self) -> bool {
        is_remote(&self.source) || is_remote(&self.destination)
    }

    pub fn build(&self) -> SyncArgs {
        let mut args: Vec<String> = RSYNC_BASE_ARGS.iter().map(|s| s.to_string()).collect();
        let mut warnings = vec![];

        if self.is_remote() {
            args.extend(RSYNC_REMOTE_ARGS.iter().map(|s| s.to_string()));
        }

        if self.show_progress {
            args.push("--progress".into());
        }

        if let (Some(version), Platform::MacOs) = (&self.version, self.platform) {
            if is_old_version(version) {
                warnings.push(Warning::OldBinaryFeatures(version.clone()));
            } else {
                args.extend(RSYNC_MACOS_ARGS.iter().map(|s| s.to_string()));
            }
        }

        if let Some(prev) = &self.link_dest {
            args.push(format!("--link-dest={}", prev.display()));
        }

        match &self.exclude {
            ExcludeList::Present(path) => args.push(format!("--exclude-from={}", path.display())),
            ExcludeList::Missing(path) => warnings.push(Warning::ExcludeListMissing(path.clone())),
            ExcludeList::NotConfigured => {}
        }

        if self.dry_run {
            args.push("--dry-run".into());
        }

        args.push(with_trailing_separator(&self.source));
        args.push(self.snapshot_dir.display().to_string());

        SyncArgs { args, warnings }
    }
}

/// `src/` makes rsync copy the contents of `src` rather than `src` itself.
fn with_trailing_separator(source: &str) -> String {
    if source.ends_with('/') {
        source.to_string()
    } else {
        format!("{source}/")
    }
}
