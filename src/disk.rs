use crate::error::{Result, SnapshotError};
use crate::path_util::is_remote;
use crate::probe::HostProbe;
use std::path::Path;
use tracing::debug;

/// Outcome of a disk space check that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskCheck {
    /// Remote destination, nothing was measured.
    Skipped,
    /// Percentage of the destination filesystem in use.
    Usage(u8),
}

/// Refuses to start when the destination filesystem is too full.
///
/// Remote destinations (see [`is_remote`]) are not measured.
///
/// # Errors
/// * [`SnapshotError::DiskThresholdExceeded`] when usage is at or above `threshold`.
/// * [`SnapshotError::DiskCheckParse`] when the probe fails or its report is malformed.
pub fn check_disk_space(
    destination: &str,
    threshold: u8,
    probe: &dyn HostProbe,
) -> Result<DiskCheck> {
    if is_remote(destination) {
        return Ok(DiskCheck::Skipped);
    }

    let report = probe
        .usage_report(Path::new(destination))
        .map_err(|e| SnapshotError::DiskCheckParse(e.to_string()))?;
    debug!(%report, "disk usage report");

    let usage = parse_usage(&report)?;
    if usage >= threshold {
        return Err(SnapshotError::DiskThresholdExceeded { usage, threshold });
    }
    Ok(DiskCheck::Usage(usage))
}

/// Extracts the use percentage from a `df` report: the fifth field of the
/// second line, e.g. `83%`.
pub fn parse_usage(report: &str) -> Result<u8> {
    let line = report
        .lines()
        .nth(1)
        .ok_or_else(|| SnapshotError::DiskCheckParse("unexpected df output".into()))?;
    let field = line
        .split_whitespace()
        .nth(4)
        .ok_or_else(|| SnapshotError::DiskCheckParse("unexpected df output format".into()))?;
    field
        .strip_suffix('%')
        .and_then(|pct| pct.parse::<u8>().ok())
        .ok_or_else(|| {
            SnapshotError::DiskCheckParse(format!("failed to parse disk usage '{field}'"))
        })
}
