//! The workspace abstraction: how the tracker sees the filesystem.
//!
//! A workspace mediates every filesystem interaction the tracker performs,
//! so an embedding build system can supply deltas (only changed files) or
//! force a full rebuild. [`FilesystemWorkspace`] is the plain direct-disk
//! implementation used by standalone builds.

use std::path::{Path, PathBuf};

use crate::error::TrackerError;
use crate::filestate::FileState;

/// How the workspace reports changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Full walks, statuses computed from recorded fingerprints.
    Normal,
    /// Walks report only changed resources; unreported files are unchanged.
    Delta,
    /// Full rebuild forced; everything present reports as modified.
    Escalated,
    /// Change detection suppressed; statuses taken at face value.
    Suppressed,
}

/// The change status of one resource relative to the previous build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    New,
    Modified,
    Unmodified,
    Removed,
}

/// One resource reported by a workspace walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkEntry {
    pub path: PathBuf,
    pub status: Status,
}

/// Filesystem access as seen by the build tracker.
pub trait Workspace {
    /// The change-reporting mode this workspace operates in.
    fn mode(&self) -> Mode;

    /// Enumerate regular files under `basedir`.
    ///
    /// In delta mode only changed resources are reported; callers reconcile
    /// unreported-but-tracked resources against prior state themselves.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be read.
    fn walk(&self, basedir: &Path) -> Result<Vec<WalkEntry>, TrackerError>;

    /// The live status of a resource relative to a recorded fingerprint.
    fn resource_status(&self, recorded: &FileState) -> Status;

    fn is_present(&self, path: &Path) -> bool;

    fn is_regular_file(&self, path: &Path) -> bool;

    fn is_directory(&self, path: &Path) -> bool;

    /// Delete a file. Deleting an absent file is not an error.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be removed.
    fn delete_file(&self, path: &Path) -> Result<(), TrackerError>;

    /// Write a file with crash-safe write-then-rename semantics.
    ///
    /// # Errors
    /// Returns an error if the content cannot be written.
    fn write_file(&self, path: &Path, content: &[u8]) -> Result<(), TrackerError>;
}

/// Wrap a workspace so it forces a full rebuild. Already-escalated
/// workspaces are returned unchanged.
pub fn escalate(workspace: Box<dyn Workspace>) -> Box<dyn Workspace> {
    if workspace.mode() == Mode::Escalated {
        workspace
    } else {
        Box::new(Escalated { inner: workspace })
    }
}

/// A workspace reading the local filesystem directly, in normal mode.
#[derive(Debug, Default)]
pub struct FilesystemWorkspace;

impl FilesystemWorkspace {
    pub fn new() -> Self {
        Self
    }
}

impl Workspace for FilesystemWorkspace {
    fn mode(&self) -> Mode {
        Mode::Normal
    }

    fn walk(&self, basedir: &Path) -> Result<Vec<WalkEntry>, TrackerError> {
        let mut entries = Vec::new();
        walk_into(basedir, &mut entries)?;
        Ok(entries)
    }

    fn resource_status(&self, recorded: &FileState) -> Status {
        recorded.status_on_disk()
    }

    fn is_present(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_regular_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn is_directory(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn delete_file(&self, path: &Path) -> Result<(), TrackerError> {
        trestle_util::fs::remove_file_if_exists(path).map_err(TrackerError::from)
    }

    fn write_file(&self, path: &Path, content: &[u8]) -> Result<(), TrackerError> {
        trestle_util::fs::write_atomic(path, content).map_err(TrackerError::from)
    }
}

/// A full walk has no prior state to diff against, so every file reports
/// as new; the tracker computes real statuses from its own records.
fn walk_into(dir: &Path, entries: &mut Vec<WalkEntry>) -> Result<(), TrackerError> {
    let read = std::fs::read_dir(dir).map_err(|source| TrackerError::Io {
        path: dir.display().to_string(),
        source,
    })?;
    for entry in read {
        let entry = entry.map_err(|source| TrackerError::Io {
            path: dir.display().to_string(),
            source,
        })?;
        let path = entry.path();
        if path.is_dir() {
            walk_into(&path, entries)?;
        } else if path.is_file() {
            entries.push(WalkEntry {
                path,
                status: Status::New,
            });
        }
    }
    Ok(())
}

/// Forces full-rebuild semantics over a wrapped workspace: everything
/// present is modified, everything absent is removed.
struct Escalated {
    inner: Box<dyn Workspace>,
}

impl Workspace for Escalated {
    fn mode(&self) -> Mode {
        Mode::Escalated
    }

    fn walk(&self, basedir: &Path) -> Result<Vec<WalkEntry>, TrackerError> {
        self.inner.walk(basedir)
    }

    fn resource_status(&self, recorded: &FileState) -> Status {
        if self.inner.is_regular_file(&recorded.path) {
            Status::Modified
        } else {
            Status::Removed
        }
    }

    fn is_present(&self, path: &Path) -> bool {
        self.inner.is_present(path)
    }

    fn is_regular_file(&self, path: &Path) -> bool {
        self.inner.is_regular_file(path)
    }

    fn is_directory(&self, path: &Path) -> bool {
        self.inner.is_directory(path)
    }

    fn delete_file(&self, path: &Path) -> Result<(), TrackerError> {
        self.inner.delete_file(path)
    }

    fn write_file(&self, path: &Path, content: &[u8]) -> Result<(), TrackerError> {
        self.inner.write_file(path, content)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn walk_collects_nested_files() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("a.txt"), b"a").unwrap();
        fs::create_dir(tmp.path().join("sub")).unwrap();
        fs::write(tmp.path().join("sub").join("b.txt"), b"b").unwrap();

        let ws = FilesystemWorkspace::new();
        let mut paths: Vec<_> = ws
            .walk(tmp.path())
            .unwrap()
            .into_iter()
            .map(|e| e.path)
            .collect();
        paths.sort();
        assert_eq!(
            paths,
            vec![tmp.path().join("a.txt"), tmp.path().join("sub").join("b.txt")]
        );
    }

    #[test]
    fn walk_missing_dir_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let ws = FilesystemWorkspace::new();
        assert!(ws.walk(&tmp.path().join("nope")).is_err());
    }

    #[test]
    fn resource_status_tracks_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("a.txt");
        fs::write(&file, b"v1").unwrap();
        let recorded = FileState::read(&file);

        let ws = FilesystemWorkspace::new();
        assert_eq!(ws.resource_status(&recorded), Status::Unmodified);

        fs::write(&file, b"longer content").unwrap();
        assert_eq!(ws.resource_status(&recorded), Status::Modified);

        fs::remove_file(&file).unwrap();
        assert_eq!(ws.resource_status(&recorded), Status::Removed);
    }

    #[test]
    fn escalated_reports_present_files_modified() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("a.txt");
        fs::write(&file, b"v1").unwrap();
        let recorded = FileState::read(&file);

        let ws = escalate(Box::new(FilesystemWorkspace::new()));
        assert_eq!(ws.mode(), Mode::Escalated);
        // the file is byte-identical to its fingerprint, yet reports modified
        assert_eq!(ws.resource_status(&recorded), Status::Modified);
    }

    #[test]
    fn escalating_twice_is_idempotent() {
        let ws = escalate(escalate(Box::new(FilesystemWorkspace::new())));
        assert_eq!(ws.mode(), Mode::Escalated);
    }

    #[test]
    fn delete_file_tolerates_absent() {
        let tmp = tempfile::tempdir().unwrap();
        let ws = FilesystemWorkspace::new();
        ws.delete_file(&tmp.path().join("missing")).unwrap();
    }

    #[test]
    fn write_file_is_crash_safe_shape() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("out.json");
        let ws = FilesystemWorkspace::new();
        ws.write_file(&dest, b"data").unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"data");
        assert!(!dest.with_extension("tmp").exists());
    }
}
