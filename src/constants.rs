/// Package name.
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
/// Default configuration file name.
pub const CONFIG_NAME: &str = "config.toml";
/// Lock directory used when none is configured. Fixed rather than derived
/// from `$TMPDIR`, which differs between launchd/cron and a login shell.
pub const LOCK_PATH: &str = "/tmp/hsnapRunningLock";
/// Name of the log file created under the destination when none is configured.
pub const LOG_NAME: &str = "backup.log";

/// Suffix carried by a snapshot that rsync is still populating.
pub const INCOMPLETE_SUFFIX: &str = "_INCOMPLETE";
/// Name of the symlink that points at the newest finalized snapshot.
pub const LATEST_NAME: &str = "latest";
/// `chrono` format of the snapshot token. Fixed width and zero padded.
pub const SNAPSHOT_FORMAT: &str = "UTC_%Y-%m-%d_%H.%M.%S";

/// rsync shipped with the operating system.
pub const SYSTEM_RSYNC: &str = "/usr/bin/rsync";
/// Install locations probed in order: Homebrew (Apple Silicon), Homebrew (Intel) / local, system.
pub const RSYNC_CANDIDATES: [&str; 3] = [
    "/opt/homebrew/bin/rsync",
    "/usr/local/bin/rsync",
    SYSTEM_RSYNC,
];
/// Oldest rsync with full macOS metadata support.
pub const MIN_RSYNC_VERSION: (u32, u32, u32) = (3, 2, 0);

/// Log rotation triggers once this many runs are recorded.
pub const ROTATE_AFTER_RUNS: usize = 30;
/// Lines kept when the log is rotated.
pub const ROTATE_KEEP_LINES: usize = 500;
/// Marker written at the start of every run, counted by rotation.
pub const RUN_START_MARKER: &str = "Starting backup:";

/// Flags passed on every invocation.
pub const RSYNC_BASE_ARGS: [&str; 10] = [
    "-a",                // archive mode
    "-U",                // preserve access times
    "--numeric-ids",     // keep uid/gid numbers
    "-H",                // preserve hard links
    "-A",                // preserve ACLs
    "--partial",         // keep partially transferred files
    "--itemize-changes", // per-file change summary
    "--delete",          // remove extraneous destination files
    "--delete-excluded", // remove excluded destination files
    "--stats",           // transfer statistics
];

/// Flags added when either side is a `user@host:path` location.
pub const RSYNC_REMOTE_ARGS: [&str; 4] = [
    "-z",
    "--compress-level=6",
    "-e",
    "ssh -o StrictHostKeyChecking=no -o UserKnownHostsFile=/dev/null",
];

/// Flags added on macOS when rsync is recent enough to understand them.
pub const RSYNC_MACOS_ARGS: [&str; 2] = [
    "-E",          // preserve executability
    "--fileflags", // preserve BSD file flags
];
