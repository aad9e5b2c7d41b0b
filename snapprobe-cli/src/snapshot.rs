//! Snapshot Manager
//!
//! Produces the one disposable, read-only copy of the data file that every
//! probe runs against. The original file is only ever read.
//!
//! A [`Snapshot`] owns its temporary directory: dropping it (or calling
//! [`Snapshot::release`]) restores write permission, deletes the copy and
//! removes the directory. Release failures are logged, never raised.

use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Fixed file name of the copy inside its temporary directory
pub const SNAPSHOT_FILE_NAME: &str = "test_things.sqlite";

const TEMP_DIR_PREFIX: &str = "things3_test_";
const READ_ONLY_MODE: u32 = 0o444;
const WRITABLE_MODE: u32 = 0o644;

/// Why a snapshot could not be acquired
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The resolved source file does not exist
    #[error("Source data file not found: {}", .0.display())]
    SourceMissing(PathBuf),

    /// The temporary directory could not be created
    #[error("Failed to create temporary directory: {0}")]
    TempDir(#[source] io::Error),

    /// Copying the source into the temporary directory failed
    #[error("Failed to copy {} to {}: {source}", from.display(), to.display())]
    Copy {
        /// Source file
        from: PathBuf,
        /// Destination inside the temporary directory
        to: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// The copy could not be made read-only
    #[error("Failed to mark {} read-only: {source}", path.display())]
    Permissions {
        /// The copy
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },
}

/// The file a run copies from. Fixed once resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSource {
    /// The live data file
    Live(PathBuf),
    /// The newest file under the backup root
    Backup(PathBuf),
}

impl DataSource {
    /// File to copy
    pub fn path(&self) -> &Path {
        match self {
            DataSource::Live(path) | DataSource::Backup(path) => path,
        }
    }

    /// Whether this is a backup rather than the live file
    pub fn is_backup(&self) -> bool {
        matches!(self, DataSource::Backup(_))
    }
}

/// Most recently modified `<backup_dir>/*/<backup_file>`, if any.
pub fn latest_backup(backup_dir: &Path, backup_file: &str) -> Option<PathBuf> {
    let entries = fs::read_dir(backup_dir).ok()?;
    entries
        .filter_map(Result::ok)
        .map(|entry| entry.path().join(backup_file))
        .filter_map(|candidate| {
            let metadata = fs::metadata(&candidate).ok()?;
            if !metadata.is_file() {
                return None;
            }
            Some((metadata.modified().ok()?, candidate))
        })
        .max_by_key(|(modified, _)| *modified)
        .map(|(_, path)| path)
}

/// Pick the file to copy.
///
/// Asking for a backup when none exists falls back to the live file; the
/// returned warning says so.
pub fn resolve_source(
    live: &Path,
    backup_dir: &Path,
    backup_file: &str,
    use_backup: bool,
) -> (DataSource, Option<String>) {
    if !use_backup {
        return (DataSource::Live(live.to_path_buf()), None);
    }
    match latest_backup(backup_dir, backup_file) {
        Some(backup) => {
            info!("Using backup database: {}", backup.display());
            (DataSource::Backup(backup), None)
        }
        None => {
            let warning = format!(
                "No backup found under {}, using live database",
                backup_dir.display()
            );
            warn!("{}", warning);
            (DataSource::Live(live.to_path_buf()), Some(warning))
        }
    }
}

/// Disposable read-only copy of a [`DataSource`]
#[derive(Debug)]
pub struct Snapshot {
    dir: Option<TempDir>,
    path: PathBuf,
    source: DataSource,
}

impl Snapshot {
    /// Copy `source` into a fresh directory under the system temp dir.
    pub fn acquire(source: &DataSource) -> Result<Self, SnapshotError> {
        Self::acquire_in(source, &std::env::temp_dir())
    }

    /// Copy `source` into a fresh directory under `parent`.
    ///
    /// On any failure the partially built directory is removed before the
    /// error is returned.
    pub fn acquire_in(source: &DataSource, parent: &Path) -> Result<Self, SnapshotError> {
        let from = source.path();
        if !from.is_file() {
            return Err(SnapshotError::SourceMissing(from.to_path_buf()));
        }

        let dir = tempfile::Builder::new()
            .prefix(TEMP_DIR_PREFIX)
            .tempdir_in(parent)
            .map_err(SnapshotError::TempDir)?;
        let path = dir.path().join(SNAPSHOT_FILE_NAME);

        fs::copy(from, &path).map_err(|source| SnapshotError::Copy {
            from: from.to_path_buf(),
            to: path.clone(),
            source,
        })?;
        if let Err(e) = preserve_modified(from, &path) {
            warn!("Could not preserve modification time on snapshot: {}", e);
        }

        set_mode(&path, READ_ONLY_MODE).map_err(|source| SnapshotError::Permissions {
            path: path.clone(),
            source,
        })?;

        info!("✓ Test database created: {}", path.display());
        Ok(Self {
            dir: Some(dir),
            path,
            source: source.clone(),
        })
    }

    /// Path of the read-only copy
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Containing temporary directory, `None` once released
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_ref().map(TempDir::path)
    }

    /// Where the copy came from
    pub fn source(&self) -> &DataSource {
        &self.source
    }

    /// Whether [`release`](Self::release) has already run
    pub fn is_released(&self) -> bool {
        self.dir.is_none()
    }

    /// Restore write permission, delete the copy and remove its directory.
    ///
    /// Idempotent. Problems are logged as warnings and never returned, so a
    /// cleanup hiccup cannot change the verdict of the run.
    pub fn release(&mut self) {
        let Some(dir) = self.dir.take() else {
            debug!("Snapshot already released");
            return;
        };

        if self.path.exists() {
            if let Err(e) = set_mode(&self.path, WRITABLE_MODE) {
                warn!("Cleanup warning: cannot restore permissions on {}: {}", self.path.display(), e);
            }
            if let Err(e) = fs::remove_file(&self.path) {
                warn!("Cleanup warning: cannot remove {}: {}", self.path.display(), e);
            }
        }

        let dir_path = dir.path().to_path_buf();
        // close() also sweeps sidecar files the reader may have left behind.
        match dir.close() {
            Ok(()) => info!("✓ Test database cleaned up"),
            Err(e) => warn!("Cleanup warning: cannot remove {}: {}", dir_path.display(), e),
        }
    }
}

impl Drop for Snapshot {
    fn drop(&mut self) {
        self.release();
    }
}

fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(mode);
    fs::set_permissions(path, perms)
}

fn preserve_modified(from: &Path, to: &Path) -> io::Result<()> {
    let modified = fs::metadata(from)?.modified()?;
    fs::File::options().write(true).open(to)?.set_modified(modified)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::{Duration, SystemTime};

    fn write_file(path: &Path, contents: &[u8]) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn set_mtime(path: &Path, time: SystemTime) {
        fs::File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(time)
            .unwrap();
    }

    fn is_root() -> bool {
        unsafe { libc::geteuid() == 0 }
    }

    #[test]
    fn acquire_copies_and_locks() {
        let scratch = tempfile::tempdir().unwrap();
        let source_path = scratch.path().join("main.sqlite");
        write_file(&source_path, b"irreplaceable");
        let source = DataSource::Live(source_path.clone());

        let snapshot = Snapshot::acquire_in(&source, scratch.path()).unwrap();
        assert_eq!(fs::read(snapshot.path()).unwrap(), b"irreplaceable");
        assert!(snapshot.path().ends_with(SNAPSHOT_FILE_NAME));

        let dir_name = snapshot.dir().unwrap().file_name().unwrap().to_string_lossy();
        assert!(dir_name.starts_with(TEMP_DIR_PREFIX));

        let perms = fs::metadata(snapshot.path()).unwrap().permissions();
        assert_eq!(perms.mode() & 0o777, READ_ONLY_MODE);
        assert!(perms.readonly());

        let source_mtime = fs::metadata(&source_path).unwrap().modified().unwrap();
        let copy_mtime = fs::metadata(snapshot.path()).unwrap().modified().unwrap();
        assert_eq!(source_mtime, copy_mtime);
    }

    #[test]
    fn writes_to_the_copy_are_refused() {
        if is_root() {
            // Mode bits do not bind root; the permission assertions above still apply.
            return;
        }
        let scratch = tempfile::tempdir().unwrap();
        let source_path = scratch.path().join("main.sqlite");
        write_file(&source_path, b"data");
        let snapshot = Snapshot::acquire_in(&DataSource::Live(source_path), scratch.path()).unwrap();

        let err = fs::File::options()
            .append(true)
            .open(snapshot.path())
            .and_then(|mut f| f.write_all(b"mutation"))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
    }

    #[test]
    fn release_removes_everything_and_is_idempotent() {
        let scratch = tempfile::tempdir().unwrap();
        let source_path = scratch.path().join("main.sqlite");
        write_file(&source_path, b"data");
        let mut snapshot =
            Snapshot::acquire_in(&DataSource::Live(source_path.clone()), scratch.path()).unwrap();
        let dir = snapshot.dir().unwrap().to_path_buf();
        let copy = snapshot.path().to_path_buf();

        snapshot.release();
        assert!(!copy.exists());
        assert!(!dir.exists());
        assert!(snapshot.is_released());

        snapshot.release();
        assert!(source_path.exists());
    }

    #[test]
    fn drop_releases() {
        let scratch = tempfile::tempdir().unwrap();
        let source_path = scratch.path().join("main.sqlite");
        write_file(&source_path, b"data");
        let dir = {
            let snapshot =
                Snapshot::acquire_in(&DataSource::Live(source_path), scratch.path()).unwrap();
            snapshot.dir().unwrap().to_path_buf()
        };
        assert!(!dir.exists());
    }

    #[test]
    fn missing_source_leaves_nothing_behind() {
        let scratch = tempfile::tempdir().unwrap();
        let parent = scratch.path().join("tmp");
        fs::create_dir(&parent).unwrap();
        let source = DataSource::Live(scratch.path().join("absent.sqlite"));

        let err = Snapshot::acquire_in(&source, &parent).unwrap_err();
        assert!(matches!(err, SnapshotError::SourceMissing(_)));
        assert_eq!(fs::read_dir(&parent).unwrap().count(), 0);
    }

    #[test]
    fn latest_backup_picks_most_recent() {
        let scratch = tempfile::tempdir().unwrap();
        let root = scratch.path().join("Backups");
        let older = root.join("2026-01-01").join("main.sqlite");
        let newer = root.join("2026-02-01").join("main.sqlite");
        write_file(&older, b"old");
        write_file(&newer, b"new");
        write_file(&root.join("stray.txt"), b"not a backup");
        fs::create_dir_all(root.join("empty")).unwrap();

        let now = SystemTime::now();
        set_mtime(&older, now - Duration::from_secs(3600));
        set_mtime(&newer, now - Duration::from_secs(60));
        assert_eq!(latest_backup(&root, "main.sqlite"), Some(newer.clone()));

        set_mtime(&older, now);
        assert_eq!(latest_backup(&root, "main.sqlite"), Some(older));
    }

    #[test]
    fn backup_request_without_backups_falls_back_to_live() {
        let scratch = tempfile::tempdir().unwrap();
        let live = scratch.path().join("main.sqlite");
        let root = scratch.path().join("Backups");
        fs::create_dir(&root).unwrap();

        let (source, warning) = resolve_source(&live, &root, "main.sqlite", true);
        assert_eq!(source, DataSource::Live(live.clone()));
        assert!(warning.unwrap().contains("No backup found"));

        let (source, warning) = resolve_source(&live, &root.join("missing"), "main.sqlite", true);
        assert!(!source.is_backup());
        assert!(warning.is_some());
    }

    #[test]
    fn live_source_needs_no_backup_lookup() {
        let live = PathBuf::from("/data/main.sqlite");
        let (source, warning) = resolve_source(&live, Path::new("/nowhere"), "main.sqlite", false);
        assert_eq!(source.path(), live.as_path());
        assert!(warning.is_none());
    }
}
