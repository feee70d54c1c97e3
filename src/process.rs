//! Running rsync.
//!
//! stdout and stderr are each drained by their own task, copied to the
//! console as they arrive and kept in memory for the statistics scan. Both
//! pipes must be drained while the child runs, otherwise a chatty rsync
//! blocks on a full pipe and never exits.

use crate::error::{Result, SnapshotError};
use regex::Regex;
use std::io;
use std::path::Path;
use std::process::Stdio;
use std::sync::LazyLock;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Byte count phrasings across rsync releases, most specific first.
static TRANSFER_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"Total transferred file size: ([0-9,]+) bytes",
        r"sent ([0-9,]+) bytes",
        r"total size is ([0-9,]+)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid transfer pattern"))
    .collect()
});

/// What a successful transfer produced.
#[derive(Debug, Clone, Default)]
pub struct TransferReport {
    /// Everything rsync wrote, stdout followed by stderr.
    pub output: String,
    pub transferred_gb: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct ProcessSupervisor {
    /// Copy rsync's output to the console while it runs.
    pub echo: bool,
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        Self { echo: true }
    }
}

impl ProcessSupervisor {
    /// Runs `binary` with `args` and waits for it to exit.
    ///
    /// If `cancel` fires first the child is killed and reaped, and the call
    /// returns [`SnapshotError::Interrupted`]. No retries are attempted.
    ///
    /// # Errors
    /// * [`SnapshotError::ProcessSpawn`] if the child cannot be started.
    /// * [`SnapshotError::ProcessExecution`] on a non-zero exit.
    pub async fn run(
        &self,
        binary: &Path,
        args: &[String],
        cancel: &CancellationToken,
    ) -> Result<TransferReport> {
        let spawn_err = |source| SnapshotError::ProcessSpawn {
            path: binary.to_path_buf(),
            source,
        };

        let mut child = Command::new(binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_err)?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| spawn_err(io::Error::other("stdout not captured")))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| spawn_err(io::Error::other("stderr not captured")))?;

        let out_task = tokio::spawn(tee(stdout, self.console(tokio::io::stdout())));
        let err_task = tokio::spawn(tee(stderr, self.console(tokio::io::stderr())));

        let status = tokio::select! {
            status = child.wait() => status.map_err(spawn_err)?,
            _ = cancel.cancelled() => {
                warn!(binary = %binary.display(), "cancelling rsync");
                if let Err(e) = child.start_kill() {
                    debug!(error = %e, "kill failed, child already gone");
                }
                let _ = child.wait().await;
                collect(out_task).await;
                collect(err_task).await;
                return Err(SnapshotError::Interrupted);
            }
        };

        let mut output = collect(out_task).await;
        output.push_str(&collect(err_task).await);

        if !status.success() {
            return Err(SnapshotError::ProcessExecution(status.code()));
        }

        Ok(TransferReport {
            transferred_gb: parse_transferred_gb(&output),
            output,
        })
    }

    fn console<W>(&self, writer: W) -> Box<dyn AsyncWrite + Send + Unpin>
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        if self.echo {
            Box::new(writer)
        } else {
            Box::new(tokio::io::sink())
        }
    }
}

/// Copies `reader` to `console` until end of stream, returning everything read.
/// Console write failures are ignored so capture always completes.
async fn tee<R, W>(mut reader: R, mut console: W) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut captured = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        captured.extend_from_slice(&chunk[..n]);
        if console.write_all(&chunk[..n]).await.is_ok() {
            let _ = console.flush().await;
        }
    }
    Ok(captured)
}

async fn collect(task: JoinHandle<io::Result<Vec<u8>>>) -> String {
    match task.await {
        Ok(Ok(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
        Ok(Err(e)) => {
            debug!(error = %e, "output stream failed");
            String::new()
        }
        Err(e) => {
            debug!(error = %e, "output task failed");
            String::new()
        }
    }
}

/// Finds the transferred byte count in rsync's output and converts it to GiB.
/// Returns 0 when no known phrasing matches.
pub fn parse_transferred_gb(output: &str) -> f64 {
    TRANSFER_PATTERNS
        .iter()
        .find_map(|re| {
            let digits = re.captures(output)?.get(1)?.as_str().replace(',', "");
            digits.parse::<u64>().ok()
        })
        .map_or(0.0, |bytes| bytes as f64 / GIB)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_total_transferred() {
        let text = "Number of files: 12\n\
                    Total transferred file size: 1,073,741,824 bytes\n\
                    sent 99 bytes";
        assert_eq!(format!("{:.2}", parse_transferred_gb(text)), "1.00");
    }

    #[test]
    fn test_parse_fallback_patterns() {
        let sent = "sent 536,870,912 bytes  received 35 bytes  total size is 9";
        assert!((parse_transferred_gb(sent) - 0.5).abs() < f64::EPSILON);

        let total = "total size is 2147483648  speedup is 1.00";
        assert!((parse_transferred_gb(total) - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_parse_no_match() {
        assert_eq!(parse_transferred_gb(""), 0.0);
        assert_eq!(parse_transferred_gb("rsync: connection unexpectedly closed"), 0.0);
    }

    #[tokio::test]
    async fn test_tee_captures_everything() {
        let data = b"line one\nline two\n".repeat(2000);
        let captured = tee(&data[..], tokio::io::sink()).await.unwrap();
        assert_eq!(captured, data);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_success_and_stats() {
        let supervisor = ProcessSupervisor { echo: false };
        let args = vec![
            "-c".to_string(),
            "echo 'Total transferred file size: 1,073,741,824 bytes'; echo oops >&2".to_string(),
        ];
        let report = supervisor
            .run(Path::new("/bin/sh"), &args, &CancellationToken::new())
            .await
            .unwrap();
        assert!(report.output.contains("oops"));
        assert_eq!(format!("{:.2}", report.transferred_gb), "1.00");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_nonzero_exit() {
        let supervisor = ProcessSupervisor { echo: false };
        let args = vec!["-c".to_string(), "exit 23".to_string()];
        let res = supervisor
            .run(Path::new("/bin/sh"), &args, &CancellationToken::new())
            .await;
        assert!(matches!(res, Err(SnapshotError::ProcessExecution(Some(23)))));
    }

    #[tokio::test]
    async fn test_run_missing_binary() {
        let supervisor = ProcessSupervisor { echo: false };
        let res = supervisor
            .run(Path::new("/no/such/rsync"), &[], &CancellationToken::new())
            .await;
        assert!(matches!(res, Err(SnapshotError::ProcessSpawn { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_cancelled_kills_child() {
        let supervisor = ProcessSupervisor { echo: false };
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            trigger.cancel();
        });
        let args = vec!["-c".to_string(), "exec sleep 30".to_string()];
        let started = std::time::Instant::now();
        let res = supervisor.run(Path::new("/bin/sh"), &args, &cancel).await;
        assert!(matches!(res, Err(SnapshotError::Interrupted)));
        assert!(started.elapsed() < std::time::Duration::from_secs(10));
    }
}
