//! Locating rsync and working out what it can do.

use crate::constants::{MIN_RSYNC_VERSION, RSYNC_CANDIDATES, SYSTEM_RSYNC};
use crate::error::{Result, SnapshotError};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::LazyLock;
use tracing::debug;

static VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+\.\d+\.\d+").expect("valid version pattern"));

/// Host platform, as far as rsync flags are concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// Needs `-E --fileflags` and a modern rsync to keep file metadata.
    MacOs,
    Other,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Platform::MacOs
        } else {
            Platform::Other
        }
    }
}

/// A `major.minor.patch` rsync version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RsyncVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl RsyncVersion {
    /// Parses the first dotted numeric triple in `text`.
    pub fn find(text: &str) -> Option<Self> {
        let found = VERSION_RE.find(text)?.as_str();
        let mut parts = found.split('.').map(|p| p.parse::<u32>().ok());
        Some(Self {
            major: parts.next()??,
            minor: parts.next()??,
            patch: parts.next()??,
        })
    }

    pub fn is_too_old(&self) -> bool {
        let (major, minor, patch) = MIN_RSYNC_VERSION;
        *self
            < RsyncVersion {
                major,
                minor,
                patch,
            }
    }
}

/// Version string reported by `binary --version`, if any could be found.
///
/// `None` means the capability is unknown and callers must assume the minimum.
pub fn get_version(binary: &Path) -> Option<String> {
    let output = Command::new(binary).arg("--version").output().ok()?;
    let text = String::from_utf8_lossy(&output.stdout);
    let version = VERSION_RE.find(&text).map(|m| m.as_str().to_string());
    debug!(binary = %binary.display(), ?version, "rsync version probe");
    version
}

/// True unless `version` parses into three integers at or above the minimum.
pub fn is_old_version(version: &str) -> bool {
    RsyncVersion::find(version).is_none_or(|v| v.is_too_old())
}

/// The rsync selected for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedBinary {
    pub path: PathBuf,
    /// Reported version, `None` when it could not be determined.
    pub version: Option<String>,
    /// Chosen because `force_system_rsync` was set.
    pub forced: bool,
}

/// Picks the rsync binary for a run.
#[derive(Debug, Clone)]
pub struct BinaryResolver {
    candidates: Vec<PathBuf>,
    system: PathBuf,
    platform: Platform,
}

impl Default for BinaryResolver {
    fn default() -> Self {
        Self {
            candidates: RSYNC_CANDIDATES.iter().map(PathBuf::from).collect(),
            system: PathBuf::from(SYSTEM_RSYNC),
            platform: Platform::current(),
        }
    }
}

impl BinaryResolver {
    pub fn new(candidates: Vec<PathBuf>, system: PathBuf, platform: Platform) -> Self {
        Self {
            candidates,
            system,
            platform,
        }
    }

    /// Resolves the binary to run.
    ///
    /// With `force_system` set the system rsync is used unconditionally. An
    /// explicit `pinned` path must exist. Otherwise the first existing
    /// candidate wins. On macOS the system rsync is rejected when it is older
    /// than the supported minimum, or when its version cannot be read.
    ///
    /// # Errors
    /// * [`SnapshotError::BinaryNotFound`] when nothing usable exists.
    /// * [`SnapshotError::IncompatibleBinary`] when the system rsync is too old.
    pub fn resolve(&self, force_system: bool, pinned: Option<&Path>) -> Result<ResolvedBinary> {
        if force_system {
            return Ok(ResolvedBinary {
                version: get_version(&self.system),
                path: self.system.clone(),
                forced: true,
            });
        }

        let path = match pinned {
            Some(path) if path.exists() => path.to_path_buf(),
            Some(path) => return Err(SnapshotError::BinaryNotFound(path.display().to_string())),
            None => self
                .candidates
                .iter()
                .find(|p| p.exists())
                .cloned()
                .ok_or_else(|| SnapshotError::BinaryNotFound(self.searched()))?,
        };

        let version = get_version(&path);
        if path == self.system && self.platform == Platform::MacOs {
            let too_old = version.as_deref().is_none_or(is_old_version);
            if too_old {
                return Err(SnapshotError::IncompatibleBinary {
                    path,
                    version: version.unwrap_or_else(|| "unknown".into()),
                });
            }
        }

        Ok(ResolvedBinary {
            path,
            version,
            forced: false,
        })
    }

    fn searched(&self) -> String {
        self.candidates
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_version_find() {
        let text = "rsync  version 3.2.7  protocol version 31\nCopyright (C) 1996-2022";
        assert_eq!(
            RsyncVersion::find(text),
            Some(RsyncVersion {
                major: 3,
                minor: 2,
                patch: 7
            })
        );
        assert_eq!(RsyncVersion::find("openrsync: protocol version 29"), None);
    }

    #[test]
    fn test_is_old_version() {
        assert!(is_old_version("2.6.9"));
        assert!(is_old_version("3.1.3"));
        assert!(!is_old_version("3.2.0"));
        assert!(!is_old_version("3.4.1"));
        assert!(!is_old_version("10.0.0"));
        assert!(is_old_version(""));
        assert!(is_old_version("3.2"));
    }

    #[test]
    fn test_resolve_not_found() {
        let dir = tempdir().unwrap();
        let resolver = BinaryResolver::new(
            vec![dir.path().join("a"), dir.path().join("b")],
            dir.path().join("b"),
            Platform::Other,
        );
        let err = resolver.resolve(false, None).unwrap_err();
        assert!(matches!(err, SnapshotError::BinaryNotFound(ref s) if s.contains("/a")));
    }

    #[test]
    fn test_resolve_first_existing_candidate() {
        let dir = tempdir().unwrap();
        let second = dir.path().join("second");
        std::fs::write(&second, b"").unwrap();
        let third = dir.path().join("third");
        std::fs::write(&third, b"").unwrap();
        let resolver = BinaryResolver::new(
            vec![dir.path().join("first"), second.clone(), third.clone()],
            third,
            Platform::MacOs,
        );
        let resolved = resolver.resolve(false, None).unwrap();
        assert_eq!(resolved.path, second);
        assert!(!resolved.forced);
    }

    #[test]
    fn test_resolve_forced_system() {
        let dir = tempdir().unwrap();
        let system = dir.path().join("rsync");
        let resolver = BinaryResolver::new(vec![], system.clone(), Platform::MacOs);
        let resolved = resolver.resolve(true, None).unwrap();
        assert_eq!(resolved.path, system);
        assert!(resolved.forced);
        assert_eq!(resolved.version, None);
    }

    #[test]
    fn test_resolve_pinned() {
        let dir = tempdir().unwrap();
        let pinned = dir.path().join("my-rsync");
        let resolver =
            BinaryResolver::new(vec![], PathBuf::from("/usr/bin/rsync"), Platform::Other);
        assert!(matches!(
            resolver.resolve(false, Some(&pinned)),
            Err(SnapshotError::BinaryNotFound(_))
        ));

        std::fs::write(&pinned, b"").unwrap();
        assert_eq!(resolver.resolve(false, Some(&pinned)).unwrap().path, pinned);
    }
}
