//! Host filesystem probes.
//!
//! Disk usage and mount reachability are answered by `df`. The probe is a
//! trait so a run can be driven against a fake host.

use std::io;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::debug;

pub trait HostProbe: Send + Sync {
    /// Returns the raw usage report for the filesystem holding `path`.
    fn usage_report(&self, path: &Path) -> io::Result<String>;

    /// Returns true if `path` resolves through a mounted filesystem.
    fn is_mounted(&self, path: &Path) -> bool;
}

/// Probe backed by the host's `df`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProbe;

impl HostProbe for SystemProbe {
    fn usage_report(&self, path: &Path) -> io::Result<String> {
        let output = Command::new("df").arg("-h").arg(path).output()?;
        if !output.status.success() {
            return Err(io::Error::other(format!(
                "df exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn is_mounted(&self, path: &Path) -> bool {
        let status = Command::new("df")
            .arg(path)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        debug!(path = %path.display(), ?status, "mount probe");
        matches!(status, Ok(status) if status.success())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_system_probe_on_tempdir() {
        let dir = tempdir().unwrap();
        let probe = SystemProbe;
        assert!(probe.is_mounted(dir.path()));
        let report = probe.usage_report(dir.path()).unwrap();
        assert!(report.lines().count() >= 2);
    }

    #[test]
    fn test_system_probe_missing_path() {
        let probe = SystemProbe;
        assert!(!probe.is_mounted(Path::new("/definitely/not/here/hsnap")));
    }
}
