use crate::error::{Result, SnapshotError};
use crate::probe::HostProbe;
use std::fs;
use std::path::Path;

/// Returns true if `path` looks like rsync's `user@host:path` remote syntax.
///
/// This is a heuristic: the path merely has to contain both `@` and `:`, so a
/// local path such as `/mnt/a@b:c` is misclassified as remote.
pub fn is_remote(path: &str) -> bool {
    path.contains('@') && path.contains(':')
}

/// Makes sure both ends of the transfer are usable.
///
/// Creates the destination tree if it is missing, then checks that the source
/// exists and that both paths are reachable through a mounted filesystem.
/// Remote ends cannot be inspected locally and are left to rsync.
///
/// # Errors
/// * [`SnapshotError::DestinationCreate`] if the destination cannot be created.
/// * [`SnapshotError::SourceMissing`] if the source does not exist.
/// * [`SnapshotError::PathNotMounted`] if either path fails the mount probe.
pub fn validate_paths(source: &Path, destination: &Path, probe: &dyn HostProbe) -> Result<()> {
    let local = |path: &Path| !is_remote(&path.to_string_lossy());

    if local(destination) {
        fs::create_dir_all(destination).map_err(|source| SnapshotError::DestinationCreate {
            path: destination.to_path_buf(),
            source,
        })?;
    }

    if local(source) && fs::metadata(source).is_err() {
        return Err(SnapshotError::SourceMissing(source.to_path_buf()));
    }

    for path in [source, destination].into_iter().filter(|p| local(*p)) {
        if !probe.is_mounted(path) {
            return Err(SnapshotError::PathNotMounted(path.to_path_buf()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use tempfile::tempdir;

    struct Mounted(bool);

    impl HostProbe for Mounted {
        fn usage_report(&self, _: &Path) -> io::Result<String> {
            Ok(String::new())
        }

        fn is_mounted(&self, _: &Path) -> bool {
            self.0
        }
    }

    #[test]
    fn test_is_remote() {
        assert!(is_remote("backup@nas:/volume1/snapshots"));
        assert!(!is_remote("/Volumes/backup-0/backups"));
        assert!(!is_remote("nas:/volume1"));
        assert!(!is_remote("/home/me@work"));
        // known false positive
        assert!(is_remote("/mnt/odd@name:dir"));
    }

    #[test]
    fn test_validate_creates_destination() {
        let src = tempdir().unwrap();
        let root = tempdir().unwrap();
        let dest = root.path().join("a").join("b");

        validate_paths(src.path(), &dest, &Mounted(true)).unwrap();
        assert!(dest.is_dir());
    }

    #[test]
    fn test_validate_missing_source() {
        let root = tempdir().unwrap();
        let src = root.path().join("no_such_src");
        let res = validate_paths(&src, root.path(), &Mounted(true));
        assert!(matches!(res, Err(SnapshotError::SourceMissing(p)) if p == src));
    }

    #[test]
    fn test_validate_not_mounted() {
        let src = tempdir().unwrap();
        let dest = tempdir().unwrap();
        let res = validate_paths(src.path(), dest.path(), &Mounted(false));
        assert!(matches!(res, Err(SnapshotError::PathNotMounted(p)) if p == src.path()));
    }

    #[test]
    fn test_validate_skips_remote_source() {
        let dest = tempdir().unwrap();
        let src = Path::new("backup@nas:/volume1/data");
        assert!(validate_paths(src, dest.path(), &Mounted(true)).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_validate_destination_create_error() {
        let root = tempdir().unwrap();
        let blocker = root.path().join("file");
        fs::write(&blocker, b"x").unwrap();
        let dest = blocker.join("dest");
        let res = validate_paths(root.path(), &dest, &Mounted(true));
        assert!(matches!(res, Err(SnapshotError::DestinationCreate { .. })));
    }
}
