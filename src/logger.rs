//! Persistent run log.
//!
//! Every line goes to stdout and, once the log is open, to the log file,
//! prefixed with the local time. The log keeps growing across runs until it
//! holds [`ROTATE_AFTER_RUNS`] runs, then only the last
//! [`ROTATE_KEEP_LINES`] lines are kept.

use crate::constants::{ROTATE_AFTER_RUNS, ROTATE_KEEP_LINES, RUN_START_MARKER};
use crate::error::{Result, SnapshotError, Warning};
use chrono::Local;
use std::fmt::Display;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Default)]
pub struct RunLogger {
    file: Option<File>,
    path: Option<PathBuf>,
    quiet: bool,
}

impl RunLogger {
    /// A logger that only writes to stdout until [`RunLogger::open`] is called.
    pub fn new() -> Self {
        Self::default()
    }

    /// Suppresses console output; the log file is still written.
    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }

    /// Rotates the log if needed, opens it for appending and writes the run
    /// separator. The parent directory is created if missing.
    ///
    /// A failed rotation is returned as a warning; failing to open the file is fatal.
    pub fn open(&mut self, path: &Path) -> Result<Option<Warning>> {
        let open_err = |source| SnapshotError::LogOpen {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(open_err)?;
        }

        let (rotated, warning) = match rotate_if_needed(path) {
            Ok(runs) => (runs, None),
            Err(source) => (
                None,
                Some(Warning::Rotate {
                    path: path.to_path_buf(),
                    source,
                }),
            ),
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(open_err)?;
        writeln!(file, "\n{}", "=".repeat(80)).map_err(open_err)?;
        self.file = Some(file);
        self.path = Some(path.to_path_buf());

        if let Some(runs) = rotated {
            self.log(format_args!(
                "Log cleaned up (was {runs} jobs, kept last {ROTATE_KEEP_LINES} lines)"
            ));
        }
        Ok(warning)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Writes one timestamped line.
    pub fn log(&mut self, message: impl Display) {
        let line = format!("{} {message}\n", Local::now().format("%Y-%m-%d %H:%M:%S"));
        if !self.quiet {
            print!("{line}");
        }
        self.write_file(&line);
    }

    fn write_file(&mut self, line: &str) {
        if let Some(file) = self.file.as_mut() {
            if let Err(e) = file.write_all(line.as_bytes()) {
                warn!(error = %e, "failed to write run log");
            }
        }
    }

    pub fn warning(&mut self, warning: &Warning) {
        self.log(format_args!("Warning: {warning}"));
    }

    /// Like [`RunLogger::log`], but the console copy goes to stderr.
    pub fn error(&mut self, message: impl Display) {
        let line = format!("{} {message}\n", Local::now().format("%Y-%m-%d %H:%M:%S"));
        eprint!("{line}");
        self.write_file(&line);
    }

    /// Flushes and closes the log file.
    pub fn close(&mut self) {
        if let Some(mut file) = self.file.take() {
            let _ = file.flush();
        }
    }
}

/// Counts recorded runs in the log at `path` and, once the threshold is
/// reached, rewrites it with only the trailing lines. The rewrite goes through
/// a temporary file and a rename so readers never see a truncated log.
///
/// Returns the number of runs found when the log was rotated.
pub fn rotate_if_needed(path: &Path) -> io::Result<Option<usize>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    let runs = content
        .lines()
        .filter(|line| line.contains(RUN_START_MARKER))
        .count();
    if runs < ROTATE_AFTER_RUNS {
        return Ok(None);
    }

    let lines: Vec<&str> = content.lines().collect();
    let start = lines.len().saturating_sub(ROTATE_KEEP_LINES);
    let mut kept = lines[start..].join("\n");
    kept.push('\n');

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, kept)?;
    fs::rename(&tmp, path)?;
    Ok(Some(runs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_runs(path: &Path, runs: usize, lines_per_run: usize) {
        let mut content = String::new();
        for run in 0..runs {
            content.push_str(&format!("2026-10-18 12:00:00 {RUN_START_MARKER} T{run}\n"));
            for line in 0..lines_per_run {
                content.push_str(&format!("2026-10-18 12:00:01 run {run} line {line}\n"));
            }
        }
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_log_writes_to_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("logs").join("backup.log");
        let mut logger = RunLogger::new().quiet();
        logger.log("before open");
        assert!(logger.open(&path).unwrap().is_none());
        logger.log(format_args!("{RUN_START_MARKER} T1"));
        logger.close();

        let content = fs::read_to_string(&path).unwrap();
        assert!(!content.contains("before open"));
        assert!(content.contains(&"=".repeat(80)));
        let line = content.lines().last().unwrap();
        assert!(line.ends_with("Starting backup: T1"));
        // "YYYY-MM-DD HH:MM:SS " prefix
        assert_eq!(line.as_bytes()[4], b'-');
        assert_eq!(line.as_bytes()[19], b' ');
        assert_eq!(logger.path(), Some(path.as_path()));
    }

    #[test]
    fn test_open_appends() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("backup.log");
        fs::write(&path, "old line\n").unwrap();
        let mut logger = RunLogger::new().quiet();
        logger.open(&path).unwrap();
        logger.log("new line");
        logger.close();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("old line\n"));
        assert!(content.contains("new line"));
    }

    #[test]
    fn test_rotate_below_threshold() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("backup.log");
        assert_eq!(rotate_if_needed(&path).unwrap(), None);

        write_runs(&path, ROTATE_AFTER_RUNS - 1, 40);
        let before = fs::read_to_string(&path).unwrap();
        assert_eq!(rotate_if_needed(&path).unwrap(), None);
        assert_eq!(fs::read_to_string(&path).unwrap(), before);
    }

    #[test]
    fn test_rotate_keeps_tail() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("backup.log");
        write_runs(&path, ROTATE_AFTER_RUNS, 40);

        assert_eq!(rotate_if_needed(&path).unwrap(), Some(ROTATE_AFTER_RUNS));
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), ROTATE_KEEP_LINES);
        assert!(content.ends_with("run 29 line 39\n"));
        assert!(!dir.path().join("backup.log.tmp").exists());
    }

    #[test]
    fn test_open_rotates_before_appending() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("backup.log");
        write_runs(&path, ROTATE_AFTER_RUNS + 5, 40);

        let mut logger = RunLogger::new().quiet();
        assert!(logger.open(&path).unwrap().is_none());
        logger.log("after rotation");
        logger.close();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("Log cleaned up (was 35 jobs"));
        assert!(content.trim_end().ends_with("after rotation"));
        assert!(content.lines().count() < ROTATE_KEEP_LINES + 5);
    }

    #[test]
    fn test_blocked_rotation_is_warning() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("backup.log");
        write_runs(&path, ROTATE_AFTER_RUNS, 40);
        fs::create_dir(dir.path().join("backup.log.tmp")).unwrap();
        let before = fs::read_to_string(&path).unwrap();

        let mut logger = RunLogger::new().quiet();
        let warning = logger.open(&path).unwrap();
        assert!(matches!(warning, Some(Warning::Rotate { .. })));
        logger.log("still logging");
        logger.close();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with(&before));
        assert!(!content.contains("Log cleaned up"));
        assert!(content.trim_end().ends_with("still logging"));
    }

    #[cfg(unix)]
    #[test]
    fn test_log_path_is_directory() {
        let dir = tempdir().unwrap();
        // A directory where the log should be: reading fails, so does opening.
        let path = dir.path().join("backup.log");
        fs::create_dir(&path).unwrap();
        assert!(rotate_if_needed(&path).is_err());
        let mut logger = RunLogger::new().quiet();
        assert!(matches!(logger.open(&path), Err(SnapshotError::LogOpen { .. })));
    }
}
